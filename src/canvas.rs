use crate::error::{RenderError, Result};
use crate::types::{Color, PageSize, Point, Rect, Resolution};
use std::ops::{Deref, DerefMut};
use tiny_skia::{
    FillRule, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint, PixmapRef, Stroke, Transform,
};

/// Per-page pixel buffer. The resolution is fixed when the canvas is
/// created and every point-to-pixel conversion for the page goes through it.
pub struct RasterCanvas {
    pixmap: Pixmap,
    resolution: Resolution,
    background: Color,
    clip: Option<Mask>,
}

impl RasterCanvas {
    /// Allocates a canvas for a page of `size` and fills it with
    /// `background`, which also serves as the page's transparency key.
    pub fn new(size: PageSize, resolution: Resolution, background: Color) -> Result<Self> {
        if !resolution.is_valid() {
            return Err(RenderError::InvalidConfiguration(format!(
                "resolution must be positive, got {}x{}",
                resolution.x, resolution.y
            )));
        }
        let width = hundredths_mm_to_px(size.width, resolution.x);
        let height = hundredths_mm_to_px(size.height, resolution.y);
        let invalid = || RenderError::InvalidRasterSize {
            width,
            height,
            dpi_x: resolution.x,
            dpi_y: resolution.y,
        };
        if width <= 0 || height <= 0 {
            return Err(invalid());
        }
        let w = u32::try_from(width).map_err(|_| invalid())?;
        let h = u32::try_from(height).map_err(|_| invalid())?;
        let mut pixmap = Pixmap::new(w, h).ok_or_else(invalid)?;
        pixmap.fill(background.to_skia());
        Ok(Self {
            pixmap,
            resolution,
            background,
            clip: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn background(&self) -> Color {
        self.background
    }

    pub fn pixels_x(&self, value: f32) -> f32 {
        value * self.resolution.x / 72.0
    }

    pub fn pixels_y(&self, value: f32) -> f32 {
        value * self.resolution.y / 72.0
    }

    pub fn pixel_point(&self, point: Point) -> Point {
        Point::new(self.pixels_x(point.x), self.pixels_y(point.y))
    }

    pub fn pixel_rect(&self, rect: Rect) -> Rect {
        Rect::new(
            self.pixels_x(rect.x),
            self.pixels_y(rect.y),
            self.pixels_x(rect.width),
            self.pixels_y(rect.height),
        )
    }

    /// Straight-alpha color of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let px = self.pixmap.pixel(x, y)?.demultiply();
        Some(Color::rgba(px.red(), px.green(), px.blue(), px.alpha()))
    }

    /// True when the pixel still holds the page background color.
    pub fn is_background(&self, x: u32, y: u32) -> bool {
        self.pixel(x, y) == Some(self.background)
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Row-major straight-alpha RGBA bytes, 4 per pixel.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixmap.data().len());
        for px in self.pixmap.pixels() {
            let c = px.demultiply();
            out.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        out
    }

    /// Restricts drawing to the intersection of the current clip and `rect`
    /// (device pixels) until the returned scope is dropped.
    pub fn clip_to(&mut self, rect: Rect) -> ClipScope<'_> {
        let saved = self.clip.clone();
        let path = rect.to_skia().map(PathBuilder::from_rect);
        let next = match (&self.clip, path) {
            (Some(mask), Some(path)) => {
                let mut mask = mask.clone();
                mask.intersect_path(&path, FillRule::Winding, false, Transform::identity());
                Some(mask)
            }
            (None, Some(path)) => Mask::new(self.width(), self.height()).map(|mut mask| {
                mask.fill_path(&path, FillRule::Winding, false, Transform::identity());
                mask
            }),
            // An empty clip rectangle hides everything.
            (_, None) => Mask::new(self.width(), self.height()),
        };
        self.clip = next;
        ClipScope {
            canvas: self,
            saved: Some(saved),
        }
    }

    pub(crate) fn fill_path(&mut self, path: &Path, paint: &Paint<'_>, transform: Transform) {
        self.pixmap.fill_path(
            path,
            paint,
            FillRule::Winding,
            transform,
            self.clip.as_ref(),
        );
    }

    pub(crate) fn stroke_path(
        &mut self,
        path: &Path,
        paint: &Paint<'_>,
        stroke: &Stroke,
        transform: Transform,
    ) {
        self.pixmap
            .stroke_path(path, paint, stroke, transform, self.clip.as_ref());
    }

    pub(crate) fn draw_pixmap(
        &mut self,
        image: PixmapRef<'_>,
        paint: &PixmapPaint,
        transform: Transform,
    ) {
        self.pixmap
            .draw_pixmap(0, 0, image, paint, transform, self.clip.as_ref());
    }
}

/// Restores the clip that was active before [`RasterCanvas::clip_to`] on
/// every exit path, including early returns and `?`.
pub struct ClipScope<'a> {
    canvas: &'a mut RasterCanvas,
    saved: Option<Option<Mask>>,
}

impl Deref for ClipScope<'_> {
    type Target = RasterCanvas;

    fn deref(&self) -> &RasterCanvas {
        self.canvas
    }
}

impl DerefMut for ClipScope<'_> {
    fn deref_mut(&mut self) -> &mut RasterCanvas {
        self.canvas
    }
}

impl Drop for ClipScope<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.canvas.clip = saved;
        }
    }
}

fn hundredths_mm_to_px(value: u32, dpi: f32) -> i64 {
    (value as f64 / 2540.0 * dpi as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_at_200_dpi() {
        let canvas =
            RasterCanvas::new(PageSize::letter(), Resolution::uniform(200.0), Color::WHITE)
                .unwrap();
        assert_eq!(canvas.width(), 1700);
        assert_eq!(canvas.height(), 2200);
        assert!(canvas.is_background(0, 0));
        assert!(canvas.is_background(1699, 2199));
    }

    #[test]
    fn pixel_conversion_uses_canvas_resolution() {
        let canvas = RasterCanvas::new(
            PageSize::from_inches(1.0, 1.0),
            Resolution::new(300.0, 150.0),
            Color::WHITE,
        )
        .unwrap();
        for v in [0.0f32, 1.0, 7.25, 72.0, 613.5, -12.0] {
            assert_eq!(canvas.pixels_x(v), v * 300.0 / 72.0);
            assert_eq!(canvas.pixels_y(v), v * 150.0 / 72.0);
        }
        let rect = canvas.pixel_rect(Rect::new(72.0, 72.0, 36.0, 144.0));
        assert_eq!(rect, Rect::new(300.0, 150.0, 150.0, 300.0));
    }

    #[test]
    fn zero_sized_page_is_rejected() {
        let err = RasterCanvas::new(
            PageSize::from_hundredths_mm(0, 100),
            Resolution::uniform(200.0),
            Color::WHITE,
        );
        assert!(matches!(err, Err(RenderError::InvalidRasterSize { .. })));
    }

    #[test]
    fn clip_scope_restores_previous_clip() {
        let mut canvas = RasterCanvas::new(
            PageSize::from_inches(0.5, 0.5),
            Resolution::uniform(72.0),
            Color::WHITE,
        )
        .unwrap();
        let full = PathBuilder::from_rect(tiny_skia::Rect::from_xywh(0.0, 0.0, 36.0, 36.0).unwrap());
        let mut paint = Paint::default();
        paint.set_color(Color::BLACK.to_skia());
        {
            let mut scoped = canvas.clip_to(Rect::new(0.0, 0.0, 10.0, 10.0));
            scoped.fill_path(&full, &paint, Transform::identity());
        }
        assert_eq!(canvas.pixel(5, 5), Some(Color::BLACK));
        assert!(canvas.is_background(20, 20));

        canvas.fill_path(&full, &paint, Transform::identity());
        assert_eq!(canvas.pixel(20, 20), Some(Color::BLACK));
    }
}
