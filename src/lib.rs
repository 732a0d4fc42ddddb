mod assets;
mod bitonal;
mod bits;
mod canvas;
pub mod ccitt;
mod document;
mod driver;
mod error;
mod font;
pub mod lzw;
mod markup;
mod page;
mod paint;
mod placement;
mod primitives;
mod style;
mod text;
mod types;

pub use assets::{DEFAULT_IMAGE_DPI, DecodedImage, ImageCache, decode_image, native_resolution};
pub use bitonal::{
    BitonalBuffer, DEFAULT_THRESHOLD, PixelLayout, quantize, quantize_pixels, stride_for,
};
pub use canvas::{ClipScope, RasterCanvas};
pub use document::{ColorMode, ColorRaster, Compression, DocumentOptions, Frame, RasterDocument};
pub use driver::{Region, RenderDriver, TiffSession};
pub use error::{RenderError, Result};
pub use font::{FontFace, FontRegistry, ResolvedFont};
pub use markup::SimpleMarkup;
pub use page::{
    CompositeItem, CurveItem, ImageItem, ImageSource, LayoutContext, LineItem, MarkupLayout, Page,
    PageItem, PieItem, PolygonItem, ShapeItem, TextItem,
};
pub use paint::{PaintContext, paint_items};
pub use placement::{ImageMetrics, ImageSizing, Placement, fit_proportional, place_image};
pub use primitives::{
    Alignment, DashKind, FillSpec, FontRequest, GradientDirection, StrokeSpec, TextFormat,
    content_rect, fill_for, font_request_for, gradient_direction, stroke_for, text_format_for,
};
pub use style::{
    BorderEdge, BorderStyle, Borders, FontStyle, FontWeight, GradientType, Padding, StyleInfo,
    TextAlign, TextDecoration, VerticalAlign, WritingMode,
};
pub use text::{line_height_pt, measure_text_pt};
pub use types::{Color, PageSize, Point, Rect, Resolution};

use futures::executor::block_on;
use log::debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Device resolution used when none is configured.
pub const DEFAULT_DPI: f32 = 200.0;
pub const DEFAULT_FONT_FAMILY: &str = "Arial";
const MAX_CHANNEL_SUM: u16 = 765;

/// Paints finished pages and writes them as one multi-page TIFF.
///
/// Configuration is fixed at [`build`](TiffRendererBuilder::build) time and
/// shared by every page of every render, so one renderer can serve many
/// documents (and many threads).
pub struct TiffRenderer {
    resolution: Resolution,
    mode: ColorMode,
    compression: Compression,
    threshold: u16,
    background: Color,
    transparent_background: bool,
    parallel: bool,
    font_registry: Arc<FontRegistry>,
    default_family: String,
    software: Option<String>,
    images: ImageCache,
}

#[derive(Clone)]
pub struct TiffRendererBuilder {
    resolution: Resolution,
    mode: ColorMode,
    compression: Option<Compression>,
    threshold: u16,
    background: Color,
    transparent_background: bool,
    parallel: bool,
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    font_bytes: Vec<(Vec<u8>, Option<String>)>,
    default_family: String,
    software: Option<String>,
}

impl TiffRenderer {
    pub fn builder() -> TiffRendererBuilder {
        TiffRendererBuilder::new()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn color_mode(&self) -> ColorMode {
        self.mode
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.font_registry
    }

    pub(crate) fn document_options(&self) -> DocumentOptions {
        DocumentOptions {
            mode: self.mode,
            compression: self.compression,
            resolution: self.resolution,
            software: self.software.clone(),
        }
    }

    /// Paints one page onto a fresh canvas.
    pub fn paint_page(&self, page: &Page) -> Result<RasterCanvas> {
        let t_page = Instant::now();
        let mut canvas = RasterCanvas::new(page.size, self.resolution, self.background)?;
        let ctx = PaintContext {
            fonts: &self.font_registry,
            default_family: &self.default_family,
            images: &self.images,
        };
        paint_items(&mut canvas, &page.items, &ctx)?;
        debug!(
            "painted page {}x{} px, {} item(s) in {:.2} ms",
            canvas.width(),
            canvas.height(),
            page.items.len(),
            t_page.elapsed().as_secs_f64() * 1000.0
        );
        Ok(canvas)
    }

    /// Paints one page and reduces it to the frame the document stores.
    pub fn render_frame(&self, page: &Page) -> Result<Frame> {
        let canvas = self.paint_page(page)?;
        Ok(Frame::from_canvas(
            &canvas,
            self.mode,
            self.threshold,
            self.transparent_background,
        ))
    }

    /// Frames for `pages`, in page order.
    pub(crate) fn paint_frames(&self, pages: &[Page]) -> Result<Vec<Frame>> {
        if self.parallel && pages.len() > 1 {
            use rayon::prelude::*;
            // Indexed collect keeps page order.
            return pages.par_iter().map(|page| self.render_frame(page)).collect();
        }
        pages.iter().map(|page| self.render_frame(page)).collect()
    }

    /// Renders `pages` into `sink` and returns the sink once the document is
    /// finalized.
    pub fn render_to_writer<W: Write + Send>(&self, pages: &[Page], sink: W) -> Result<W> {
        if pages.is_empty() {
            return Err(RenderError::EmptyDocument);
        }
        // Bounded batches keep at most one frame per worker in memory.
        let batch = if self.parallel {
            rayon::current_num_threads().max(1)
        } else {
            1
        };
        let mut session = TiffSession::new(self, sink);
        block_on(async {
            session.start().await?;
            session.region_start(Region::Body).await?;
            for chunk in pages.chunks(batch) {
                session.run_pages(chunk).await?;
            }
            session.region_end(Region::Body).await?;
            session.end().await
        })?;
        session.into_sink().ok_or(RenderError::EmptyDocument)
    }

    pub fn render_to_buffer(&self, pages: &[Page]) -> Result<Vec<u8>> {
        self.render_to_writer(pages, Vec::new())
    }

    pub fn render_to_file(&self, pages: &[Page], path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.render_to_writer(pages, std::io::BufWriter::new(file))?;
        Ok(())
    }
}

impl Default for TiffRendererBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TiffRendererBuilder {
    pub fn new() -> Self {
        Self {
            resolution: Resolution::uniform(DEFAULT_DPI),
            mode: ColorMode::Color,
            compression: None,
            threshold: DEFAULT_THRESHOLD,
            background: Color::WHITE,
            transparent_background: false,
            parallel: false,
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            font_bytes: Vec::new(),
            default_family: DEFAULT_FONT_FAMILY.to_string(),
            software: Some(concat!("pagetiff ", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }

    pub fn resolution(mut self, dpi_x: f32, dpi_y: f32) -> Self {
        self.resolution = Resolution::new(dpi_x, dpi_y);
        self
    }

    pub fn color_mode(mut self, mode: ColorMode) -> Self {
        self.mode = mode;
        self
    }

    /// Overrides the compression derived from the color mode.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Channel sum (0..=765) a pixel must exceed to stay white in bitonal
    /// output.
    pub fn bitonal_threshold(mut self, threshold: u16) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn background(mut self, color: Color) -> Self {
        self.background = color;
        self
    }

    pub fn transparent_background(mut self, enabled: bool) -> Self {
        self.transparent_background = enabled;
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    pub fn register_font_bytes(mut self, data: Vec<u8>, name: Option<&str>) -> Self {
        self.font_bytes.push((data, name.map(str::to_string)));
        self
    }

    pub fn default_font_family(mut self, family: impl Into<String>) -> Self {
        self.default_family = family.into();
        self
    }

    /// Value of the Software tag; `None` omits it.
    pub fn software(mut self, software: Option<String>) -> Self {
        self.software = software;
        self
    }

    pub fn build(self) -> Result<TiffRenderer> {
        if !self.resolution.is_valid() {
            return Err(RenderError::InvalidConfiguration(format!(
                "resolution must be positive and finite, got {}x{}",
                self.resolution.x, self.resolution.y
            )));
        }
        let compression = self
            .compression
            .unwrap_or_else(|| Compression::default_for(self.mode));
        if !compression.supports(self.mode) {
            return Err(RenderError::UnsupportedCompression {
                compression,
                mode: self.mode,
            });
        }
        if self.threshold > MAX_CHANNEL_SUM {
            return Err(RenderError::InvalidConfiguration(format!(
                "bitonal threshold must be at most {MAX_CHANNEL_SUM}, got {}",
                self.threshold
            )));
        }
        if self.transparent_background && self.mode == ColorMode::Bitonal {
            return Err(RenderError::InvalidConfiguration(
                "transparent_background requires color output".to_string(),
            ));
        }
        if self.default_family.trim().is_empty() {
            return Err(RenderError::InvalidConfiguration(
                "default font family must not be empty".to_string(),
            ));
        }

        let mut registry = FontRegistry::new();
        for dir in &self.font_dirs {
            registry.add_search_dir(dir.clone());
            registry.register_dir(dir)?;
        }
        for file in &self.font_files {
            registry.register_file(file)?;
        }
        for (data, name) in self.font_bytes {
            registry.register_bytes(data, name.as_deref())?;
        }

        Ok(TiffRenderer {
            resolution: self.resolution,
            mode: self.mode,
            compression,
            threshold: self.threshold,
            background: self.background,
            transparent_background: self.transparent_background,
            parallel: self.parallel,
            font_registry: Arc::new(registry),
            default_family: self.default_family,
            software: self.software,
            images: ImageCache::new(),
        })
    }
}
