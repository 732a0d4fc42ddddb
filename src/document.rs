//! Multi-page TIFF assembly.
//!
//! Layout: the 8-byte header, then for every frame its strip followed by its
//! IFD. An IFD's "next" pointer is only known once the following frame's
//! strip size is known, so each IFD is held back until the next
//! [`RasterDocument::append`] or [`RasterDocument::finalize`]. The sink
//! therefore only needs [`Write`], never `Seek`.

use crate::bitonal::{BitonalBuffer, quantize};
use crate::canvas::RasterCanvas;
use crate::error::{RenderError, Result};
use crate::types::Resolution;
use crate::{ccitt, lzw};
use log::{debug, info};
use std::io::Write;

const TAG_NEW_SUBFILE_TYPE: u16 = 254;
const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_X_RESOLUTION: u16 = 282;
const TAG_Y_RESOLUTION: u16 = 283;
const TAG_PLANAR_CONFIGURATION: u16 = 284;
const TAG_RESOLUTION_UNIT: u16 = 296;
const TAG_PAGE_NUMBER: u16 = 297;
const TAG_SOFTWARE: u16 = 305;
const TAG_EXTRA_SAMPLES: u16 = 338;

/// NewSubfileType bit marking one page of a multi-page document.
const SUBFILE_PAGE: u32 = 2;
const PHOTOMETRIC_WHITE_IS_ZERO: u16 = 0;
const PHOTOMETRIC_BLACK_IS_ZERO: u16 = 1;
const PHOTOMETRIC_RGB: u16 = 2;
const RESOLUTION_UNIT_INCH: u16 = 2;
const EXTRA_SAMPLE_UNASSOCIATED_ALPHA: u16 = 2;

/// Whether pages are kept in color or reduced to one bit per pixel. Fixed
/// for a whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    #[default]
    Color,
    Bitonal,
}

/// Strip compression scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    /// TIFF LZW; lossless, for either mode.
    Lzw,
    /// CCITT Modified Huffman run lengths; bitonal only.
    CcittRle,
}

impl Compression {
    pub fn default_for(mode: ColorMode) -> Self {
        match mode {
            ColorMode::Color => Compression::Lzw,
            ColorMode::Bitonal => Compression::CcittRle,
        }
    }

    pub fn supports(self, mode: ColorMode) -> bool {
        !(self == Compression::CcittRle && mode == ColorMode::Color)
    }

    fn tag_value(self) -> u16 {
        match self {
            Compression::None => 1,
            Compression::CcittRle => 2,
            Compression::Lzw => 5,
        }
    }
}

/// Document-wide encoding parameters.
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    pub mode: ColorMode,
    pub compression: Compression,
    pub resolution: Resolution,
    pub software: Option<String>,
}

impl DocumentOptions {
    pub fn new(mode: ColorMode, resolution: Resolution) -> Self {
        Self {
            mode,
            compression: Compression::default_for(mode),
            resolution,
            software: None,
        }
    }
}

/// Interleaved 8-bit RGB or RGBA pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorRaster {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl ColorRaster {
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        if !(channels == 3 || channels == 4) {
            return Err(RenderError::InvalidConfiguration(format!(
                "color frames need 3 or 4 channels, got {channels}"
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected || width == 0 || height == 0 {
            return Err(RenderError::InvalidConfiguration(format!(
                "{width}x{height}x{channels} frame needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// RGB copy of the canvas, or RGBA with background-keyed pixels made
    /// fully transparent when `transparent_background` is set.
    pub fn from_canvas(canvas: &RasterCanvas, transparent_background: bool) -> Self {
        let rgba = canvas.to_rgba();
        let key = canvas.background();
        let data = if transparent_background {
            let mut rgba = rgba;
            for px in rgba.chunks_exact_mut(4) {
                if px == [key.r, key.g, key.b, key.a] {
                    px[3] = 0;
                }
            }
            rgba
        } else {
            rgba.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect()
        };
        Self {
            width: canvas.width(),
            height: canvas.height(),
            channels: if transparent_background { 4 } else { 3 },
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// One page's final raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Color(ColorRaster),
    Bitonal(BitonalBuffer),
}

impl Frame {
    pub fn from_canvas(
        canvas: &RasterCanvas,
        mode: ColorMode,
        threshold: u16,
        transparent_background: bool,
    ) -> Self {
        match mode {
            ColorMode::Color => Frame::Color(ColorRaster::from_canvas(canvas, transparent_background)),
            ColorMode::Bitonal => Frame::Bitonal(quantize(canvas, threshold)),
        }
    }

    pub fn mode(&self) -> ColorMode {
        match self {
            Frame::Color(_) => ColorMode::Color,
            Frame::Bitonal(_) => ColorMode::Bitonal,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Frame::Color(raster) => raster.width(),
            Frame::Bitonal(bits) => bits.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Frame::Color(raster) => raster.height(),
            Frame::Bitonal(bits) => bits.height(),
        }
    }

    fn encode(&self, compression: Compression) -> Result<Vec<u8>> {
        match (self, compression) {
            (Frame::Color(raster), Compression::None) => Ok(raster.data().to_vec()),
            (Frame::Color(raster), Compression::Lzw) => Ok(lzw::encode(raster.data())),
            (Frame::Color(_), Compression::CcittRle) => Err(RenderError::UnsupportedCompression {
                compression,
                mode: ColorMode::Color,
            }),
            (Frame::Bitonal(bits), Compression::None) => Ok(bits.data().to_vec()),
            (Frame::Bitonal(bits), Compression::Lzw) => Ok(lzw::encode(bits.data())),
            (Frame::Bitonal(bits), Compression::CcittRle) => Ok(ccitt::encode(bits)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FieldType {
    Ascii = 2,
    Short = 3,
    Long = 4,
    Rational = 5,
}

#[derive(Debug, Clone)]
struct IfdEntry {
    tag: u16,
    field: FieldType,
    count: u32,
    value: Vec<u8>,
}

impl IfdEntry {
    fn shorts(tag: u16, values: &[u16]) -> Self {
        Self {
            tag,
            field: FieldType::Short,
            count: values.len() as u32,
            value: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn short(tag: u16, value: u16) -> Self {
        Self::shorts(tag, &[value])
    }

    fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            field: FieldType::Long,
            count: 1,
            value: value.to_le_bytes().to_vec(),
        }
    }

    fn rational(tag: u16, numerator: u32, denominator: u32) -> Self {
        let mut value = numerator.to_le_bytes().to_vec();
        value.extend_from_slice(&denominator.to_le_bytes());
        Self {
            tag,
            field: FieldType::Rational,
            count: 1,
            value,
        }
    }

    fn ascii(tag: u16, text: &str) -> Self {
        let mut value: Vec<u8> = text.bytes().filter(|b| b.is_ascii() && *b != 0).collect();
        value.push(0);
        Self {
            tag,
            field: FieldType::Ascii,
            count: value.len() as u32,
            value,
        }
    }

    fn is_inline(&self) -> bool {
        self.value.len() <= 4
    }
}

/// A frame's image file directory, entries sorted by tag.
#[derive(Debug, Clone)]
struct Ifd {
    entries: Vec<IfdEntry>,
}

impl Ifd {
    fn new(mut entries: Vec<IfdEntry>) -> Self {
        entries.sort_by_key(|e| e.tag);
        Self { entries }
    }

    fn directory_len(&self) -> u64 {
        2 + 12 * self.entries.len() as u64 + 4
    }

    /// Bytes the IFD occupies, including out-of-line values.
    fn len(&self) -> u64 {
        let extra: u64 = self
            .entries
            .iter()
            .filter(|e| !e.is_inline())
            .map(|e| padded_len(e.value.len() as u64))
            .sum();
        self.directory_len() + extra
    }

    fn encode(&self, at: u32, next: u32) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len() as usize);
        let mut extra = Vec::new();
        let extra_base = u64::from(at) + self.directory_len();
        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&entry.tag.to_le_bytes());
            out.extend_from_slice(&(entry.field as u16).to_le_bytes());
            out.extend_from_slice(&entry.count.to_le_bytes());
            if entry.is_inline() {
                let mut inline = [0u8; 4];
                inline[..entry.value.len()].copy_from_slice(&entry.value);
                out.extend_from_slice(&inline);
            } else {
                let offset = to_offset(extra_base + extra.len() as u64)?;
                out.extend_from_slice(&offset.to_le_bytes());
                extra.extend_from_slice(&entry.value);
                if extra.len() % 2 == 1 {
                    extra.push(0);
                }
            }
        }
        out.extend_from_slice(&next.to_le_bytes());
        out.extend_from_slice(&extra);
        Ok(out)
    }
}

fn padded_len(len: u64) -> u64 {
    len + (len & 1)
}

fn to_offset(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| RenderError::OffsetOverflow)
}

/// Rational with two decimal places of precision.
fn resolution_rational(dpi: f32) -> (u32, u32) {
    ((dpi as f64 * 100.0).round().max(1.0) as u32, 100)
}

fn frame_ifd(
    frame: &Frame,
    options: &DocumentOptions,
    index: usize,
    strip_offset: u32,
    strip_len: u32,
) -> Ifd {
    let (bits, photometric) = match frame {
        Frame::Color(raster) => (vec![8u16; raster.channels() as usize], PHOTOMETRIC_RGB),
        Frame::Bitonal(_) if options.compression == Compression::CcittRle => {
            (vec![1], PHOTOMETRIC_WHITE_IS_ZERO)
        }
        Frame::Bitonal(_) => (vec![1], PHOTOMETRIC_BLACK_IS_ZERO),
    };
    let (x_num, x_den) = resolution_rational(options.resolution.x);
    let (y_num, y_den) = resolution_rational(options.resolution.y);
    let mut entries = vec![
        IfdEntry::long(TAG_NEW_SUBFILE_TYPE, SUBFILE_PAGE),
        IfdEntry::long(TAG_IMAGE_WIDTH, frame.width()),
        IfdEntry::long(TAG_IMAGE_LENGTH, frame.height()),
        IfdEntry::shorts(TAG_BITS_PER_SAMPLE, &bits),
        IfdEntry::short(TAG_COMPRESSION, options.compression.tag_value()),
        IfdEntry::short(TAG_PHOTOMETRIC, photometric),
        IfdEntry::long(TAG_STRIP_OFFSETS, strip_offset),
        IfdEntry::short(TAG_SAMPLES_PER_PIXEL, bits.len() as u16),
        IfdEntry::long(TAG_ROWS_PER_STRIP, frame.height()),
        IfdEntry::long(TAG_STRIP_BYTE_COUNTS, strip_len),
        IfdEntry::rational(TAG_X_RESOLUTION, x_num, x_den),
        IfdEntry::rational(TAG_Y_RESOLUTION, y_num, y_den),
        IfdEntry::short(TAG_PLANAR_CONFIGURATION, 1),
        IfdEntry::short(TAG_RESOLUTION_UNIT, RESOLUTION_UNIT_INCH),
        IfdEntry::shorts(TAG_PAGE_NUMBER, &[index.min(u16::MAX as usize) as u16, 0]),
    ];
    if let Some(software) = options.software.as_deref() {
        entries.push(IfdEntry::ascii(TAG_SOFTWARE, software));
    }
    if bits.len() == 4 {
        entries.push(IfdEntry::short(TAG_EXTRA_SAMPLES, EXTRA_SAMPLE_UNASSOCIATED_ALPHA));
    }
    Ifd::new(entries)
}

/// A TIFF being streamed to `W`, one frame per page.
///
/// The document only exists once it has a first frame: [`open`](Self::open)
/// takes that frame, [`append`](Self::append) adds the rest in order and
/// [`finalize`](Self::finalize) writes the last directory and returns the
/// sink.
pub struct RasterDocument<W: Write> {
    sink: W,
    offset: u64,
    options: DocumentOptions,
    frames: usize,
    pending: Option<Ifd>,
}

impl<W: Write> RasterDocument<W> {
    pub fn open(mut sink: W, first: Frame, options: DocumentOptions) -> Result<Self> {
        if !options.compression.supports(options.mode) {
            return Err(RenderError::UnsupportedCompression {
                compression: options.compression,
                mode: options.mode,
            });
        }
        check_mode(&options, &first, 0)?;
        let strip = first.encode(options.compression)?;
        let first_ifd = to_offset(8 + padded_len(strip.len() as u64))?;

        let mut header = Vec::with_capacity(8);
        header.extend_from_slice(b"II*\0");
        header.extend_from_slice(&first_ifd.to_le_bytes());
        sink.write_all(&header)?;

        let mut document = Self {
            sink,
            offset: header.len() as u64,
            options,
            frames: 0,
            pending: None,
        };
        document.write_frame(&first, strip)?;
        Ok(document)
    }

    pub fn append(&mut self, frame: Frame) -> Result<()> {
        check_mode(&self.options, &frame, self.frames)?;
        let strip = frame.encode(self.options.compression)?;
        if let Some(pending) = self.pending.take() {
            let at = self.offset;
            let next = at + pending.len() + padded_len(strip.len() as u64);
            self.write_ifd(&pending, at, next)?;
        }
        self.write_frame(&frame, strip)
    }

    /// Writes the final directory, flushes and hands back the sink.
    pub fn finalize(mut self) -> Result<W> {
        if let Some(pending) = self.pending.take() {
            let at = self.offset;
            self.write_ifd(&pending, at, 0)?;
        }
        self.sink.flush()?;
        info!(
            "tiff finalized: {} frame(s), {} bytes, {:?}/{:?}",
            self.frames, self.offset, self.options.mode, self.options.compression
        );
        Ok(self.sink)
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    fn write_frame(&mut self, frame: &Frame, strip: Vec<u8>) -> Result<()> {
        let strip_offset = to_offset(self.offset)?;
        let strip_len = to_offset(strip.len() as u64)?;
        self.write_bytes(&strip)?;
        if strip.len() % 2 == 1 {
            self.write_bytes(&[0])?;
        }
        debug!(
            "frame {}: {}x{} strip {} bytes at {}",
            self.frames,
            frame.width(),
            frame.height(),
            strip_len,
            strip_offset
        );
        self.pending = Some(frame_ifd(frame, &self.options, self.frames, strip_offset, strip_len));
        self.frames += 1;
        Ok(())
    }

    fn write_ifd(&mut self, ifd: &Ifd, at: u64, next: u64) -> Result<()> {
        let bytes = ifd.encode(to_offset(at)?, to_offset(next)?)?;
        self.write_bytes(&bytes)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.sink.write_all(data)?;
        self.offset += data.len() as u64;
        Ok(())
    }
}

fn check_mode(options: &DocumentOptions, frame: &Frame, index: usize) -> Result<()> {
    if frame.mode() != options.mode {
        return Err(RenderError::FrameMismatch {
            index,
            expected: options.mode,
            found: frame.mode(),
        });
    }
    Ok(())
}
