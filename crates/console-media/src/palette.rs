//! The 16-color terminal palette and nearest-color matching for still images.

use serde::Serialize;

/// 8-bit RGB triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Sum of absolute per-channel differences.
    pub fn manhattan(self, other: Rgb) -> u32 {
        self.r.abs_diff(other.r) as u32
            + self.g.abs_diff(other.g) as u32
            + self.b.abs_diff(other.b) as u32
    }
}

/// Symbolic colors a classic 16-color terminal can draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ConsoleColor {
    Black,
    DarkBlue,
    DarkGreen,
    DarkCyan,
    DarkRed,
    DarkMagenta,
    DarkYellow,
    Gray,
    DarkGray,
    Blue,
    Green,
    Cyan,
    Red,
    Magenta,
    Yellow,
    White,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaletteEntry {
    pub color: ConsoleColor,
    pub rgb: Rgb,
}

const fn entry(color: ConsoleColor, r: u8, g: u8, b: u8) -> PaletteEntry {
    PaletteEntry {
        color,
        rgb: Rgb::new(r, g, b),
    }
}

/// Matching order matters: on equal distance the earlier entry wins.
pub const PALETTE: [PaletteEntry; 16] = [
    entry(ConsoleColor::Black, 0, 0, 0),
    entry(ConsoleColor::DarkBlue, 0, 0, 139),
    entry(ConsoleColor::DarkGreen, 0, 100, 0),
    entry(ConsoleColor::DarkCyan, 0, 139, 139),
    entry(ConsoleColor::DarkRed, 139, 0, 0),
    entry(ConsoleColor::DarkMagenta, 139, 0, 139),
    entry(ConsoleColor::DarkYellow, 184, 134, 11),
    entry(ConsoleColor::Gray, 128, 128, 128),
    entry(ConsoleColor::DarkGray, 169, 169, 169),
    entry(ConsoleColor::Blue, 0, 0, 255),
    entry(ConsoleColor::Green, 0, 255, 0),
    entry(ConsoleColor::Cyan, 0, 255, 255),
    entry(ConsoleColor::Red, 255, 0, 0),
    entry(ConsoleColor::Magenta, 255, 0, 255),
    entry(ConsoleColor::Yellow, 255, 255, 0),
    entry(ConsoleColor::White, 255, 255, 255),
];

/// Closest palette color to `pixel` by channel-difference distance.
pub fn nearest(pixel: Rgb) -> ConsoleColor {
    nearest_in(&PALETTE, pixel)
}

/// Scan `palette` in order, replacing the best match only on a strictly smaller
/// distance. An empty palette yields white.
pub fn nearest_in(palette: &[PaletteEntry], pixel: Rgb) -> ConsoleColor {
    let mut best = ConsoleColor::White;
    let mut best_distance = u32::MAX;
    for entry in palette {
        let distance = entry.rgb.manhattan(pixel);
        if distance < best_distance {
            best_distance = distance;
            best = entry.color;
        }
    }
    best
}
