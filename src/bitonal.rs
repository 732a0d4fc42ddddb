//! One-bit quantization of rendered pages.

use crate::canvas::RasterCanvas;
use crate::error::{RenderError, Result};
use rayon::prelude::*;
use std::borrow::Cow;

/// Channel-sum threshold (out of 765) above which a pixel is white.
pub const DEFAULT_THRESHOLD: u16 = 500;

/// Byte layout of a pixel buffer handed to [`quantize_pixels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// Straight-alpha RGBA, 4 bytes per pixel.
    Rgba8,
    Rgb8,
    Gray8,
    /// Packed 1 bit per pixel, MSB first, rows padded to whole bytes.
    Bilevel,
}

/// 1 bit per pixel, most significant bit first; a set bit is white.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitonalBuffer {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl BitonalBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let stride = stride_for(width);
        Self {
            width,
            height,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row: `ceil(width / 8)`.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Packed bytes of row `y`, or `None` past the last row.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        self.data.get(start..start + self.stride)
    }

    /// Rows from top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.height).filter_map(move |y| self.row(y))
    }

    /// True when the pixel is white. Out-of-range pixels read as black.
    pub fn is_white(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let byte = self.data[y as usize * self.stride + (x / 8) as usize];
        byte & (0x80 >> (x % 8)) != 0
    }
}

pub fn stride_for(width: u32) -> usize {
    (width as usize).div_ceil(8)
}

/// Quantizes a painted canvas.
pub fn quantize(canvas: &RasterCanvas, threshold: u16) -> BitonalBuffer {
    let rgba = canvas.to_rgba();
    pack_rgba(&rgba, canvas.width(), canvas.height(), threshold)
}

/// Quantizes a raw pixel buffer in any supported layout. Bilevel input is
/// expanded to black and white first, so re-quantizing a quantized buffer
/// reproduces it.
pub fn quantize_pixels(
    pixels: &[u8],
    width: u32,
    height: u32,
    layout: PixelLayout,
    threshold: u16,
) -> Result<BitonalBuffer> {
    let expected = match layout {
        PixelLayout::Rgba8 => width as usize * height as usize * 4,
        PixelLayout::Rgb8 => width as usize * height as usize * 3,
        PixelLayout::Gray8 => width as usize * height as usize,
        PixelLayout::Bilevel => stride_for(width) * height as usize,
    };
    if pixels.len() != expected {
        return Err(RenderError::InvalidConfiguration(format!(
            "{layout:?} buffer for {width}x{height} must be {expected} bytes, got {}",
            pixels.len()
        )));
    }
    let rgba = normalize_rgba(pixels, width, layout);
    Ok(pack_rgba(&rgba, width, height, threshold))
}

fn normalize_rgba(pixels: &[u8], width: u32, layout: PixelLayout) -> Cow<'_, [u8]> {
    match layout {
        PixelLayout::Rgba8 => Cow::Borrowed(pixels),
        PixelLayout::Rgb8 => Cow::Owned(
            pixels
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect(),
        ),
        PixelLayout::Gray8 => Cow::Owned(pixels.iter().flat_map(|&v| [v, v, v, 255]).collect()),
        PixelLayout::Bilevel => {
            let stride = stride_for(width);
            let mut out = Vec::with_capacity(pixels.len() / stride.max(1) * width as usize * 4);
            for row in pixels.chunks_exact(stride.max(1)) {
                for x in 0..width as usize {
                    let v = if row[x / 8] & (0x80 >> (x % 8)) != 0 { 255 } else { 0 };
                    out.extend_from_slice(&[v, v, v, 255]);
                }
            }
            Cow::Owned(out)
        }
    }
}

fn pack_rgba(rgba: &[u8], width: u32, height: u32, threshold: u16) -> BitonalBuffer {
    let mut out = BitonalBuffer::new(width, height);
    if out.stride == 0 || height == 0 {
        return out;
    }
    let src_stride = width as usize * 4;
    let threshold = threshold as u32;
    out.data
        .par_chunks_mut(out.stride)
        .zip(rgba.par_chunks(src_stride))
        .for_each(|(dst, src)| {
            for (x, px) in src.chunks_exact(4).enumerate() {
                let sum = px[0] as u32 + px[1] as u32 + px[2] as u32;
                if sum > threshold {
                    dst[x / 8] |= 0x80 >> (x % 8);
                }
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, PageSize, Resolution};

    #[test]
    fn white_page_is_all_ones_with_zero_padding() {
        // 0.05in at 200dpi = 10px wide: stride 2, last byte keeps 2 bits.
        let canvas = RasterCanvas::new(
            PageSize::from_inches(0.05, 0.02),
            Resolution::uniform(200.0),
            Color::WHITE,
        )
        .unwrap();
        let bits = quantize(&canvas, DEFAULT_THRESHOLD);
        assert_eq!(bits.width(), 10);
        assert_eq!(bits.stride(), 2);
        assert_eq!(bits.data().len(), bits.stride() * bits.height() as usize);
        for row in bits.rows() {
            assert_eq!(row, &[0xFF, 0xC0]);
        }
        assert_eq!(bits.rows().count(), bits.height() as usize);
    }

    #[test]
    fn rows_past_the_end_are_none() {
        let buf = BitonalBuffer::new(9, 3);
        assert_eq!(buf.row(2), Some(&[0u8, 0][..]));
        assert_eq!(buf.row(3), None);
        assert_eq!(buf.row(u32::MAX), None);

        let empty = BitonalBuffer::new(0, 2);
        assert_eq!(empty.row(1), Some(&[][..]));
        assert_eq!(empty.rows().count(), 2);
    }

    #[test]
    fn stride_is_width_rounded_up_to_bytes() {
        for (width, stride) in [(0, 0), (1, 1), (7, 1), (8, 1), (9, 2), (1700, 213)] {
            assert_eq!(stride_for(width), stride);
            let buf = BitonalBuffer::new(width, 3);
            assert_eq!(buf.data().len(), stride * 3);
        }
    }

    #[test]
    fn threshold_is_strictly_greater() {
        let pixels = [167u8, 167, 166, 255, 167, 167, 167, 255];
        let bits = quantize_pixels(&pixels, 2, 1, PixelLayout::Rgba8, 500).unwrap();
        // 500 is not above the threshold, 501 is.
        assert!(!bits.is_white(0, 0));
        assert!(bits.is_white(1, 0));
    }

    #[test]
    fn pixels_pack_msb_first() {
        let mut gray = vec![0u8; 9];
        gray[0] = 255;
        gray[7] = 255;
        gray[8] = 255;
        let bits = quantize_pixels(&gray, 9, 1, PixelLayout::Gray8, 500).unwrap();
        assert_eq!(bits.data(), &[0b1000_0001, 0b1000_0000]);
    }

    #[test]
    fn rgb_and_rgba_agree() {
        let rgb: Vec<u8> = (0..30u8).map(|v| v.wrapping_mul(37)).collect();
        let rgba: Vec<u8> = rgb.chunks(3).flat_map(|p| [p[0], p[1], p[2], 255]).collect();
        let a = quantize_pixels(&rgb, 5, 2, PixelLayout::Rgb8, 300).unwrap();
        let b = quantize_pixels(&rgba, 5, 2, PixelLayout::Rgba8, 300).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn requantizing_is_idempotent() {
        let gray: Vec<u8> = (0..13 * 5).map(|i| ((i * 53) % 256) as u8).collect();
        let once = quantize_pixels(&gray, 13, 5, PixelLayout::Gray8, DEFAULT_THRESHOLD).unwrap();
        let twice =
            quantize_pixels(once.data(), 13, 5, PixelLayout::Bilevel, DEFAULT_THRESHOLD).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn wrong_buffer_length_is_rejected() {
        let err = quantize_pixels(&[0u8; 5], 2, 1, PixelLayout::Rgba8, 500);
        assert!(matches!(err, Err(RenderError::InvalidConfiguration(_))));
    }
}
