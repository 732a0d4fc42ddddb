//! Decoding of embedded images into premultiplied pixmaps, keyed by
//! content hash so repeated images on a report decode once.

use crate::error::{RenderError, Result};
use crate::page::ImageSource;
use crate::placement::ImageMetrics;
use crate::types::Resolution;
use log::debug;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tiny_skia::Pixmap;

/// Resolution assumed for images that do not record one.
pub const DEFAULT_IMAGE_DPI: f32 = 96.0;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug)]
pub struct DecodedImage {
    pub pixmap: Pixmap,
    pub resolution: Resolution,
}

impl DecodedImage {
    pub fn metrics(&self) -> ImageMetrics {
        ImageMetrics {
            width: self.pixmap.width(),
            height: self.pixmap.height(),
            resolution: self.resolution,
        }
    }
}

#[derive(Default)]
pub struct ImageCache {
    entries: Mutex<HashMap<[u8; 32], Arc<DecodedImage>>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_or_decode(&self, source: &ImageSource) -> Result<Arc<DecodedImage>> {
        let key = content_key(&source.data);
        if let Ok(entries) = self.entries.lock() {
            if let Some(hit) = entries.get(&key) {
                return Ok(hit.clone());
            }
        }
        let decoded = Arc::new(decode_image(source)?);
        debug!(
            "decoded image {}x{} at {}x{} dpi",
            decoded.pixmap.width(),
            decoded.pixmap.height(),
            decoded.resolution.x,
            decoded.resolution.y
        );
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, decoded.clone());
        }
        Ok(decoded)
    }
}

fn content_key(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

pub fn decode_image(source: &ImageSource) -> Result<DecodedImage> {
    let data = &source.data[..];
    let format = match source.mime.as_deref() {
        Some(mime) if mime.contains("png") => Some(image::ImageFormat::Png),
        Some(mime) if mime.contains("jpeg") || mime.contains("jpg") => {
            Some(image::ImageFormat::Jpeg)
        }
        _ => image::guess_format(data).ok(),
    };
    let decoded = match format {
        Some(fmt) => image::load_from_memory_with_format(data, fmt),
        None => image::load_from_memory(data),
    }
    .map_err(|e| RenderError::ImageDecode(e.to_string()))?;

    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| RenderError::ImageDecode(format!("empty image {width}x{height}")))?;
    for (src, dst) in rgba
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let a = src[3];
        dst[0] = premul_u8(src[0], a);
        dst[1] = premul_u8(src[1], a);
        dst[2] = premul_u8(src[2], a);
        dst[3] = a;
    }
    let resolution = native_resolution(data)
        .unwrap_or_else(|| Resolution::uniform(DEFAULT_IMAGE_DPI));
    Ok(DecodedImage { pixmap, resolution })
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

/// Resolution recorded in a PNG `pHYs` chunk or a JPEG JFIF header.
pub fn native_resolution(data: &[u8]) -> Option<Resolution> {
    if data.starts_with(PNG_SIGNATURE) {
        png_resolution(data)
    } else if data.starts_with(&[0xFF, 0xD8]) {
        jfif_resolution(data)
    } else {
        None
    }
}

fn png_resolution(data: &[u8]) -> Option<Resolution> {
    let mut pos = PNG_SIGNATURE.len();
    while pos + 8 <= data.len() {
        let len = u32::from_be_bytes(data[pos..pos + 4].try_into().ok()?) as usize;
        let kind = &data[pos + 4..pos + 8];
        let body = data.get(pos + 8..pos + 8 + len)?;
        match kind {
            b"pHYs" if len >= 9 => {
                // Unit 1 is pixels per metre; unit 0 only gives an aspect ratio.
                if body[8] != 1 {
                    return None;
                }
                let x = u32::from_be_bytes(body[0..4].try_into().ok()?);
                let y = u32::from_be_bytes(body[4..8].try_into().ok()?);
                return dpi(x as f32 * 0.0254, y as f32 * 0.0254);
            }
            b"IDAT" | b"IEND" => return None,
            _ => {}
        }
        pos += 12 + len;
    }
    None
}

fn jfif_resolution(data: &[u8]) -> Option<Resolution> {
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let body = data.get(pos + 4..pos + 2 + len)?;
        if marker == 0xE0 && body.starts_with(b"JFIF\0") && body.len() >= 12 {
            let units = body[7];
            let x = u16::from_be_bytes([body[8], body[9]]) as f32;
            let y = u16::from_be_bytes([body[10], body[11]]) as f32;
            return match units {
                1 => dpi(x, y),
                2 => dpi(x * 2.54, y * 2.54),
                _ => None,
            };
        }
        // Frame data follows SOS; anything recorded later is irrelevant.
        if marker == 0xDA {
            return None;
        }
        pos += 2 + len;
    }
    None
}

fn dpi(x: f32, y: f32) -> Option<Resolution> {
    let round = |v: f32| (v * 100.0).round() / 100.0;
    let resolution = Resolution::new(round(x), round(y));
    resolution.is_valid().then_some(resolution)
}
