//! Glyph-grid sizing.
//!
//! A terminal cell is roughly twice as tall as it is wide, so one text row stands
//! for two vertical source pixels. Heights are planned in pixel rows and halved at
//! the end.

use serde::Serialize;

/// Rows of window chrome kept free below the grid.
pub const TERMINAL_MARGIN_ROWS: u32 = 2;

/// Target grid size in glyph cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RenderResolution {
    pub width: u32,
    pub height: u32,
}

/// Fit a `original_width` x `original_height` source into the terminal.
///
/// `desired_height` is in source pixel rows; it is capped to what
/// `terminal_max_rows` can show once the margin is reserved. Both dimensions of
/// the result are at least one cell. Zero-sized sources must be rejected by the
/// caller.
pub fn plan(
    original_width: u32,
    original_height: u32,
    desired_height: u32,
    terminal_max_rows: u32,
) -> RenderResolution {
    let aspect = original_width as f64 / original_height.max(1) as f64;
    let capped = desired_height.min(
        terminal_max_rows
            .saturating_sub(TERMINAL_MARGIN_ROWS)
            .saturating_mul(2),
    );
    let width = (capped as f64 * aspect).round() as u32;

    RenderResolution {
        width: width.max(1),
        height: (capped / 2).max(1),
    }
}
