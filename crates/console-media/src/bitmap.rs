//! Uncompressed 24-bit BMP units as emitted by the video transcoder.
//!
//! Each unit is a 54-byte file+info header followed by BGR rows padded to a
//! 4-byte stride. Rows are stored bottom-up unless the header height is negative.

use crate::palette::Rgb;
use crate::resolution::RenderResolution;

/// BITMAPFILEHEADER (14) + BITMAPINFOHEADER (40).
pub const HEADER_SIZE: usize = 54;

/// Bytes per pixel row, padded to a multiple of four.
pub fn row_stride(width: u32) -> usize {
    (width as usize * 3).div_ceil(4) * 4
}

/// Exact size of one frame unit at `resolution`.
pub fn bytes_per_frame(resolution: RenderResolution) -> usize {
    HEADER_SIZE + row_stride(resolution.width) * resolution.height as usize
}

/// Borrowed view over one parsed BMP unit.
#[derive(Debug)]
pub struct BitmapView<'a> {
    width: u32,
    height: u32,
    top_down: bool,
    stride: usize,
    pixels: &'a [u8],
}

impl<'a> BitmapView<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_SIZE {
            return Err(format!("unit is {} bytes, header needs {HEADER_SIZE}", bytes.len()));
        }
        if &bytes[0..2] != b"BM" {
            return Err("missing BM signature".to_string());
        }

        let data_offset = read_u32(bytes, 10) as usize;
        let raw_width = read_i32(bytes, 18);
        let raw_height = read_i32(bytes, 22);
        let bits_per_pixel = read_u16(bytes, 28);
        let compression = read_u32(bytes, 30);

        if bits_per_pixel != 24 {
            return Err(format!("unsupported bit depth {bits_per_pixel}"));
        }
        if compression != 0 {
            return Err(format!("unsupported compression {compression}"));
        }
        if raw_width <= 0 || raw_height == 0 {
            return Err(format!("invalid geometry {raw_width}x{raw_height}"));
        }

        let width = raw_width as u32;
        let height = raw_height.unsigned_abs();
        let stride = row_stride(width);
        let needed = stride * height as usize;
        let pixels = bytes
            .get(data_offset..)
            .filter(|p| p.len() >= needed)
            .ok_or_else(|| format!("pixel data shorter than {needed} bytes"))?;

        Ok(Self {
            width,
            height,
            top_down: raw_height < 0,
            stride,
            pixels: &pixels[..needed],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel at column `x` of visual row `y` (row 0 is the top of the picture).
    pub fn pixel(&self, x: u32, y: u32) -> Rgb {
        let row = if self.top_down {
            y as usize
        } else {
            (self.height - 1 - y) as usize
        };
        let at = row * self.stride + x as usize * 3;
        Rgb::new(self.pixels[at + 2], self.pixels[at + 1], self.pixels[at])
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    read_u32(bytes, at) as i32
}

/// Encode `pixels` (row-major, top row first) as a bottom-up 24-bit BMP.
#[cfg(test)]
pub(crate) fn encode(width: u32, height: u32, pixels: &[Rgb]) -> Vec<u8> {
    let stride = row_stride(width);
    let image_size = stride * height as usize;
    let mut out = Vec::with_capacity(HEADER_SIZE + image_size);

    out.extend_from_slice(b"BM");
    out.extend_from_slice(&((HEADER_SIZE + image_size) as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&(width as i32).to_le_bytes());
    out.extend_from_slice(&(height as i32).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&24u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(image_size as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 16]);

    for y in (0..height).rev() {
        let start = out.len();
        for x in 0..width {
            let p = pixels[(y * width + x) as usize];
            out.extend_from_slice(&[p.b, p.g, p.r]);
        }
        out.resize(start + stride, 0);
    }
    out
}
