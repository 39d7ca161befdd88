//! Terminal output through crossterm.

use std::io::{self, Write};

use anyhow::{Context, Result};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Color, Colors, Print, ResetColor, SetBackgroundColor, SetColors, SetForegroundColor},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, SetSize},
};

use crate::frame::{Frame, SOLID_BLOCK};
use crate::palette::ConsoleColor;
use crate::quantize::{VIDEO_BACKGROUND, VIDEO_FOREGROUND};
use crate::resolution::RenderResolution;
use crate::scheduler::FrameSink;

/// Rows assumed when the terminal size cannot be queried.
pub const FALLBACK_ROWS: u32 = 24;

pub fn console_color(color: ConsoleColor) -> Color {
    match color {
        ConsoleColor::Black => Color::Black,
        ConsoleColor::DarkBlue => Color::DarkBlue,
        ConsoleColor::DarkGreen => Color::DarkGreen,
        ConsoleColor::DarkCyan => Color::DarkCyan,
        ConsoleColor::DarkRed => Color::DarkRed,
        ConsoleColor::DarkMagenta => Color::DarkMagenta,
        ConsoleColor::DarkYellow => Color::DarkYellow,
        ConsoleColor::Gray => Color::Grey,
        ConsoleColor::DarkGray => Color::DarkGrey,
        ConsoleColor::Blue => Color::Blue,
        ConsoleColor::Green => Color::Green,
        ConsoleColor::Cyan => Color::Cyan,
        ConsoleColor::Red => Color::Red,
        ConsoleColor::Magenta => Color::Magenta,
        ConsoleColor::Yellow => Color::Yellow,
        ConsoleColor::White => Color::White,
    }
}

/// Current terminal height in rows.
pub fn terminal_rows() -> u32 {
    match terminal::size() {
        Ok((_, rows)) if rows > 0 => u32::from(rows),
        Ok(_) => FALLBACK_ROWS,
        Err(e) => {
            tracing::warn!("query terminal size: {e}; assuming {FALLBACK_ROWS} rows");
            FALLBACK_ROWS
        }
    }
}

/// Draws frames to any writer with ANSI sequences.
pub struct TerminalSink<W: Write> {
    out: W,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn draw_glyphs(&mut self, rows: &[String]) -> io::Result<()> {
        queue!(
            self.out,
            SetColors(Colors::new(
                console_color(VIDEO_FOREGROUND),
                console_color(VIDEO_BACKGROUND)
            ))
        )?;
        for (y, row) in rows.iter().enumerate() {
            queue!(self.out, MoveTo(0, row_index(y)), Print(row))?;
        }
        Ok(())
    }

    fn draw_colored(&mut self, frame: &Frame) -> io::Result<()> {
        let mut run = String::new();
        for y in 0..frame.height() {
            let Some(cells) = frame.color_row(y) else {
                break;
            };
            queue!(
                self.out,
                MoveTo(0, row_index(y as usize)),
                SetBackgroundColor(console_color(ConsoleColor::White))
            )?;
            for chunk in cells.chunk_by(|a, b| a == b) {
                run.clear();
                run.extend(std::iter::repeat_n(SOLID_BLOCK, chunk.len()));
                queue!(
                    self.out,
                    SetForegroundColor(console_color(chunk[0])),
                    Print(&run)
                )?;
            }
        }
        Ok(())
    }
}

fn row_index(y: usize) -> u16 {
    u16::try_from(y).unwrap_or(u16::MAX)
}

impl<W: Write> FrameSink for TerminalSink<W> {
    fn prepare(&mut self) -> io::Result<()> {
        queue!(self.out, Hide, Clear(ClearType::All))?;
        self.out.flush()
    }

    fn draw(&mut self, frame: &Frame) -> io::Result<()> {
        match frame {
            Frame::Glyphs { rows } => self.draw_glyphs(rows)?,
            Frame::Colored { .. } => self.draw_colored(frame)?,
        }
        queue!(self.out, ResetColor)?;
        self.out.flush()
    }
}

/// Alternate-screen session on stdout; restores the terminal when dropped.
pub struct TerminalSession {
    original_size: Option<(u16, u16)>,
}

impl TerminalSession {
    /// Switch to the alternate screen and, if `resize` is set, fit the window to
    /// `resolution`. `font_size` is only a hint: terminals do not let programs set
    /// it, so it is logged for the user.
    pub fn enter(resolution: RenderResolution, font_size: u16, resize: bool) -> Result<Self> {
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;

        let mut session = Self { original_size: None };
        if resize {
            session.original_size = resize_window(resolution);
        }
        tracing::info!(
            font_size,
            width = resolution.width,
            height = resolution.height,
            "set the terminal font size to {font_size} for best results"
        );
        Ok(session)
    }
}

/// Resize the window to one column and two rows more than the grid. Returns the
/// previous size when the resize succeeded.
fn resize_window(resolution: RenderResolution) -> Option<(u16, u16)> {
    let previous = terminal::size().ok();
    let columns = clamp_u16(resolution.width.saturating_add(1));
    let rows = clamp_u16(resolution.height.saturating_add(2));
    match execute!(io::stdout(), SetSize(columns, rows)) {
        Ok(()) => previous,
        Err(e) => {
            tracing::warn!("resize terminal to {columns}x{rows}: {e}");
            None
        }
    }
}

fn clamp_u16(v: u32) -> u16 {
    u16::try_from(v).unwrap_or(u16::MAX)
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        if let Some((columns, rows)) = self.original_size {
            execute!(stdout, SetSize(columns, rows)).ok();
        }
        execute!(stdout, ResetColor, Show, LeaveAlternateScreen).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(frame: &Frame) -> String {
        let mut sink = TerminalSink::new(Vec::new());
        sink.draw(frame).unwrap();
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn glyph_rows_start_at_the_origin() {
        let out = rendered(&Frame::Glyphs {
            rows: vec!["█▓".to_string(), ". ".to_string()],
        });
        let first = out.find("\x1b[1;1H").unwrap();
        let second = out.find("\x1b[2;1H").unwrap();
        assert!(first < out.find("█▓").unwrap());
        assert!(second < out.find(". ").unwrap());
        assert!(out.ends_with("\x1b[0m"));
    }

    #[test]
    fn colored_rows_group_runs_of_one_color() {
        let frame = Frame::Colored {
            width: 4,
            height: 2,
            cells: vec![
                ConsoleColor::Red,
                ConsoleColor::Red,
                ConsoleColor::Blue,
                ConsoleColor::Red,
                ConsoleColor::Black,
                ConsoleColor::Black,
                ConsoleColor::Black,
                ConsoleColor::Black,
            ],
        };
        let out = rendered(&frame);
        assert_eq!(out.matches(SOLID_BLOCK).count(), 8);
        assert_eq!(out.matches("\x1b[38;").count(), 4);
        assert!(out.contains("████"));
        assert!(out.contains("\x1b[2;1H"));
    }

    #[test]
    fn gray_shades_map_to_terminal_greys() {
        assert_eq!(console_color(ConsoleColor::Gray), Color::Grey);
        assert_eq!(console_color(ConsoleColor::DarkGray), Color::DarkGrey);
        assert_eq!(console_color(ConsoleColor::DarkYellow), Color::DarkYellow);
    }

    #[test]
    fn prepare_hides_cursor_and_clears() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.prepare().unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert!(out.contains("\x1b[?25l"));
        assert!(out.contains("\x1b[2J"));
    }
}
