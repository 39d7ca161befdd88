//! Rendered frames.

use crate::bitmap::BitmapView;
use crate::palette::{self, ConsoleColor, Rgb};
use crate::quantize;

/// Glyph drawn for every cell of a colored frame.
pub const SOLID_BLOCK: char = '█';

/// One fully rendered grid, immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Ramp glyphs drawn with the fixed video colors; one `String` per row.
    Glyphs { rows: Vec<String> },
    /// Palette colors drawn as solid blocks; row-major.
    Colored {
        width: u32,
        height: u32,
        cells: Vec<ConsoleColor>,
    },
}

impl Frame {
    /// Quantize a grid to ramp glyphs. `pixel(x, y)` is sampled once per cell.
    pub fn glyphs_from_fn(width: u32, height: u32, pixel: impl Fn(u32, u32) -> Rgb) -> Self {
        let rows = (0..height)
            .map(|y| (0..width).map(|x| quantize::glyph_for(pixel(x, y))).collect())
            .collect();
        Frame::Glyphs { rows }
    }

    pub fn glyphs_from_bitmap(bitmap: &BitmapView<'_>) -> Self {
        Self::glyphs_from_fn(bitmap.width(), bitmap.height(), |x, y| bitmap.pixel(x, y))
    }

    /// Quantize a grid to the nearest palette colors.
    pub fn colored_from_fn(width: u32, height: u32, pixel: impl Fn(u32, u32) -> Rgb) -> Self {
        let mut cells = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                cells.push(palette::nearest(pixel(x, y)));
            }
        }
        Frame::Colored {
            width,
            height,
            cells,
        }
    }

    /// Grid height in rows.
    pub fn height(&self) -> u32 {
        match self {
            Frame::Glyphs { rows } => rows.len() as u32,
            Frame::Colored { height, .. } => *height,
        }
    }

    /// Row `y` of a colored frame.
    pub fn color_row(&self, y: u32) -> Option<&[ConsoleColor]> {
        match self {
            Frame::Colored { width, cells, .. } => {
                let start = y as usize * *width as usize;
                cells.get(start..start + *width as usize)
            }
            Frame::Glyphs { .. } => None,
        }
    }
}
