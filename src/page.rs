use crate::error::Result;
use crate::font::FontRegistry;
use crate::placement::ImageSizing;
use crate::style::StyleInfo;
use crate::types::{PageSize, Point, Rect, Resolution};
use base64::Engine;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// One physical sheet: its paper size and the items laid out on it, in
/// paint order.
#[derive(Debug, Clone)]
pub struct Page {
    pub size: PageSize,
    pub items: Vec<PageItem>,
}

impl Page {
    pub fn new(size: PageSize) -> Self {
        Self {
            size,
            items: Vec::new(),
        }
    }

    pub fn with_items(size: PageSize, items: Vec<PageItem>) -> Self {
        Self { size, items }
    }

    pub fn push(&mut self, item: impl Into<PageItem>) {
        self.items.push(item.into());
    }
}

/// The closed set of drawable page items.
#[derive(Debug, Clone)]
pub enum PageItem {
    Text(TextItem),
    Image(ImageItem),
    Line(LineItem),
    Rectangle(ShapeItem),
    Ellipse(ShapeItem),
    Pie(PieItem),
    Polygon(PolygonItem),
    Curve(CurveItem),
    CompositeMarkup(CompositeItem),
}

impl PageItem {
    /// Bounding rectangle in points.
    pub fn bounds(&self) -> Rect {
        match self {
            PageItem::Text(item) => item.bounds,
            PageItem::Image(item) => item.bounds,
            PageItem::Line(item) => item.bounds(),
            PageItem::Rectangle(item) | PageItem::Ellipse(item) => item.bounds,
            PageItem::Pie(item) => item.bounds,
            PageItem::Polygon(item) => item.bounds,
            PageItem::Curve(item) => item.bounds,
            PageItem::CompositeMarkup(item) => item.bounds,
        }
    }

    pub fn style(&self) -> &StyleInfo {
        match self {
            PageItem::Text(item) => &item.style,
            PageItem::Image(item) => &item.style,
            PageItem::Line(item) => &item.style,
            PageItem::Rectangle(item) | PageItem::Ellipse(item) => &item.style,
            PageItem::Pie(item) => &item.style,
            PageItem::Polygon(item) => &item.style,
            PageItem::Curve(item) => &item.style,
            PageItem::CompositeMarkup(item) => &item.style,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            PageItem::Text(_) => "text",
            PageItem::Image(_) => "image",
            PageItem::Line(_) => "line",
            PageItem::Rectangle(_) => "rectangle",
            PageItem::Ellipse(_) => "ellipse",
            PageItem::Pie(_) => "pie",
            PageItem::Polygon(_) => "polygon",
            PageItem::Curve(_) => "curve",
            PageItem::CompositeMarkup(_) => "composite",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub bounds: Rect,
    pub style: StyleInfo,
    pub text: String,
    /// Draw from the item's top-left corner without wrapping or clipping.
    pub no_clip: bool,
}

impl TextItem {
    pub fn new(bounds: Rect, text: impl Into<String>, style: StyleInfo) -> Self {
        Self {
            bounds,
            style,
            text: text.into(),
            no_clip: false,
        }
    }
}

impl From<TextItem> for PageItem {
    fn from(value: TextItem) -> Self {
        PageItem::Text(value)
    }
}

/// Encoded image bytes (PNG or JPEG).
#[derive(Clone, PartialEq)]
pub struct ImageSource {
    pub data: Arc<[u8]>,
    pub mime: Option<String>,
}

impl ImageSource {
    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            mime: None,
        }
    }

    /// Parses a `data:<mime>;base64,<payload>` URI.
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (header, payload) = rest.split_once(',')?;
        let mut parts = header.split(';');
        let mime = parts
            .next()
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string());
        let is_base64 = parts.any(|p| p.eq_ignore_ascii_case("base64"));
        let data = if is_base64 {
            base64::engine::general_purpose::STANDARD
                .decode(payload.trim())
                .ok()?
        } else {
            payload.as_bytes().to_vec()
        };
        Some(Self {
            data: data.into(),
            mime,
        })
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSource")
            .field("bytes", &self.data.len())
            .field("mime", &self.mime)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    pub bounds: Rect,
    pub style: StyleInfo,
    pub source: ImageSource,
    pub sizing: ImageSizing,
    /// Overrides the resolution recorded in the image file.
    pub resolution: Option<Resolution>,
}

impl ImageItem {
    pub fn new(bounds: Rect, source: ImageSource, sizing: ImageSizing) -> Self {
        Self {
            bounds,
            style: StyleInfo::default(),
            source,
            sizing,
            resolution: None,
        }
    }
}

impl From<ImageItem> for PageItem {
    fn from(value: ImageItem) -> Self {
        PageItem::Image(value)
    }
}

/// Straight line stroked with the left border attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub start: Point,
    pub end: Point,
    pub style: StyleInfo,
}

impl LineItem {
    pub fn bounds(&self) -> Rect {
        let x = self.start.x.min(self.end.x);
        let y = self.start.y.min(self.end.y);
        Rect::new(
            x,
            y,
            (self.end.x - self.start.x).abs(),
            (self.end.y - self.start.y).abs(),
        )
    }
}

impl From<LineItem> for PageItem {
    fn from(value: LineItem) -> Self {
        PageItem::Line(value)
    }
}

/// Rectangle or ellipse; the variant decides the shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeItem {
    pub bounds: Rect,
    pub style: StyleInfo,
}

impl ShapeItem {
    pub fn new(bounds: Rect, style: StyleInfo) -> Self {
        Self { bounds, style }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PieItem {
    pub bounds: Rect,
    pub style: StyleInfo,
    /// Degrees, clockwise from the positive x axis.
    pub start_angle: f32,
    pub sweep_angle: f32,
}

impl From<PieItem> for PageItem {
    fn from(value: PieItem) -> Self {
        PageItem::Pie(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolygonItem {
    pub bounds: Rect,
    pub style: StyleInfo,
    pub points: Vec<Point>,
}

impl From<PolygonItem> for PageItem {
    fn from(value: PolygonItem) -> Self {
        PageItem::Polygon(value)
    }
}

/// Cardinal spline through `points`, starting at segment `offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveItem {
    pub bounds: Rect,
    pub style: StyleInfo,
    pub points: Vec<Point>,
    pub offset: usize,
    pub tension: f32,
}

impl From<CurveItem> for PageItem {
    fn from(value: CurveItem) -> Self {
        PageItem::Curve(value)
    }
}

/// What a markup layout may use while building its children.
pub struct LayoutContext<'a> {
    pub fonts: &'a FontRegistry,
    pub default_family: &'a str,
}

impl LayoutContext<'_> {
    /// Advance width of `text` in points for the given style.
    pub fn measure_text(&self, text: &str, style: &StyleInfo) -> f32 {
        crate::text::measure_text_pt(self.fonts, self.default_family, text, style)
    }

    /// Line height in points for the given style.
    pub fn line_height(&self, style: &StyleInfo) -> f32 {
        crate::text::line_height_pt(self.fonts, self.default_family, style)
    }
}

/// Expands a composite item's markup into absolutely positioned children.
pub trait MarkupLayout: Send + Sync {
    fn layout(
        &self,
        markup: &str,
        bounds: Rect,
        style: &StyleInfo,
        ctx: &LayoutContext<'_>,
    ) -> Result<Vec<PageItem>>;
}

impl<F> MarkupLayout for F
where
    F: Fn(&str, Rect, &StyleInfo, &LayoutContext<'_>) -> Result<Vec<PageItem>> + Send + Sync,
{
    fn layout(
        &self,
        markup: &str,
        bounds: Rect,
        style: &StyleInfo,
        ctx: &LayoutContext<'_>,
    ) -> Result<Vec<PageItem>> {
        self(markup, bounds, style, ctx)
    }
}

/// A sub-page whose children are computed on first paint and then reused.
#[derive(Clone)]
pub struct CompositeItem {
    pub bounds: Rect,
    pub style: StyleInfo,
    pub markup: String,
    layout: Arc<dyn MarkupLayout>,
    expanded: OnceLock<Vec<PageItem>>,
}

impl CompositeItem {
    pub fn new(
        bounds: Rect,
        style: StyleInfo,
        markup: impl Into<String>,
        layout: Arc<dyn MarkupLayout>,
    ) -> Self {
        Self {
            bounds,
            style,
            markup: markup.into(),
            layout,
            expanded: OnceLock::new(),
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded.get().is_some()
    }

    pub(crate) fn expand(&self, ctx: &LayoutContext<'_>) -> Result<&[PageItem]> {
        if let Some(items) = self.expanded.get() {
            return Ok(items);
        }
        let items = self
            .layout
            .layout(&self.markup, self.bounds, &self.style, ctx)?;
        Ok(self.expanded.get_or_init(move || items))
    }
}

impl fmt::Debug for CompositeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeItem")
            .field("bounds", &self.bounds)
            .field("markup", &self.markup)
            .field("expanded", &self.expanded.get().map(|v| v.len()))
            .finish()
    }
}

impl From<CompositeItem> for PageItem {
    fn from(value: CompositeItem) -> Self {
        PageItem::CompositeMarkup(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_base64_decodes_payload() {
        let source = ImageSource::from_data_uri("data:image/png;base64,SGVsbG8=").unwrap();
        assert_eq!(source.mime.as_deref(), Some("image/png"));
        assert_eq!(&*source.data, b"Hello");
    }

    #[test]
    fn data_uri_rejects_other_schemes() {
        assert!(ImageSource::from_data_uri("file:///tmp/a.png").is_none());
    }

    #[test]
    fn line_bounds_normalize_direction() {
        let line = LineItem {
            start: Point::new(50.0, 40.0),
            end: Point::new(10.0, 60.0),
            style: StyleInfo::default(),
        };
        assert_eq!(line.bounds(), Rect::new(10.0, 40.0, 40.0, 20.0));
    }

    #[test]
    fn composite_expands_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let layout = move |_: &str,
                           bounds: Rect,
                           style: &StyleInfo,
                           _: &LayoutContext<'_>|
              -> Result<Vec<PageItem>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![PageItem::Rectangle(ShapeItem::new(bounds, style.clone()))])
        };
        let item = CompositeItem::new(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            StyleInfo::default(),
            "<b>x</b>",
            Arc::new(layout),
        );
        let fonts = FontRegistry::new();
        let ctx = LayoutContext {
            fonts: &fonts,
            default_family: "Arial",
        };
        assert!(!item.is_expanded());
        assert_eq!(item.expand(&ctx).unwrap().len(), 1);
        assert_eq!(item.expand(&ctx).unwrap().len(), 1);
        assert!(item.is_expanded());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
