//! Luminance-to-glyph mapping used for motion video.
//!
//! Video frames are drawn black-on-white; only glyph density varies per cell.

use crate::palette::{ConsoleColor, Rgb};

/// Glyphs ordered from darkest/densest to lightest/sparsest.
pub const GLYPH_RAMP: [char; 13] = [
    '█', '▓', '@', '8', '#', 'x', '+', 'o', '=', ':', '-', '.', ' ',
];

pub const VIDEO_FOREGROUND: ConsoleColor = ConsoleColor::Black;
pub const VIDEO_BACKGROUND: ConsoleColor = ConsoleColor::White;

/// BT.2020 luma, truncated to an integer level and clamped to `0..=255`.
pub fn luma(pixel: Rgb) -> u8 {
    let y = 0.2627 * pixel.r as f64 + 0.6780 * pixel.g as f64 + 0.0593 * pixel.b as f64;
    y.clamp(0.0, 255.0) as u8
}

/// Ramp position for a luma level, rounding half away from zero.
pub fn ramp_index(level: u8) -> usize {
    let steps = (GLYPH_RAMP.len() - 1) as f64;
    (level as f64 / 255.0 * steps).round() as usize
}

pub fn glyph_for(pixel: Rgb) -> char {
    GLYPH_RAMP[ramp_index(luma(pixel))]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extremes_hit_both_ends_of_the_ramp() {
        assert_eq!(glyph_for(Rgb::new(0, 0, 0)), '█');
        assert_eq!(glyph_for(Rgb::new(255, 255, 255)), ' ');
    }

    #[test]
    fn luma_weights_green_heaviest() {
        assert!(luma(Rgb::new(255, 255, 255)) >= 254);
        assert_eq!(luma(Rgb::new(255, 0, 0)), 66);
        assert_eq!(luma(Rgb::new(0, 255, 0)), 172);
        assert_eq!(luma(Rgb::new(0, 0, 255)), 15);
    }

    #[test]
    fn midpoint_rounds_away_from_zero() {
        // 255 / 24 = 10.625: levels up to 10 stay on glyph 0, 11 moves to glyph 1
        assert_eq!(ramp_index(10), 0);
        assert_eq!(ramp_index(11), 1);
        assert_eq!(ramp_index(128), 6);
        assert_eq!(ramp_index(255), 12);
    }

    #[test]
    fn ramp_index_is_monotonic_in_each_channel() {
        let bases = [(0u8, 0u8, 0u8), (10, 200, 30), (128, 128, 128), (250, 3, 99)];
        for (r, g, b) in bases {
            let base = Rgb::new(r, g, b);
            let mut prev = ramp_index(luma(base));
            for step in 1..=255u16 {
                let grown = Rgb::new(
                    r.saturating_add(step as u8),
                    g.saturating_add((step / 2) as u8),
                    b.saturating_add((step / 3) as u8),
                );
                let idx = ramp_index(luma(grown));
                assert!(idx >= prev, "{grown:?} went from {prev} to {idx}");
                prev = idx;
            }
        }
    }

    #[test]
    fn every_level_maps_inside_the_ramp() {
        for level in 0..=255u8 {
            assert!(ramp_index(level) < GLYPH_RAMP.len());
        }
    }
}
