//! Per-item painting: walks a page's items in order and draws each one
//! onto a [`RasterCanvas`].

use crate::assets::ImageCache;
use crate::canvas::RasterCanvas;
use crate::error::Result;
use crate::font::FontRegistry;
use crate::page::{
    CurveItem, ImageItem, LayoutContext, LineItem, PageItem, PieItem, PolygonItem, ShapeItem,
};
use crate::placement::place_image;
use crate::primitives::{StrokeSpec, content_rect, fill_for, stroke_for};
use crate::style::{BorderEdge, StyleInfo};
use crate::text::draw_text;
use crate::types::{Point, Rect};
use log::trace;
use tiny_skia::{FilterQuality, Path, PathBuilder, PixmapPaint, Transform};

/// Shared, read-only resources for painting one or more pages.
pub struct PaintContext<'a> {
    pub fonts: &'a FontRegistry,
    pub default_family: &'a str,
    pub images: &'a ImageCache,
}

impl PaintContext<'_> {
    fn layout(&self) -> LayoutContext<'_> {
        LayoutContext {
            fonts: self.fonts,
            default_family: self.default_family,
        }
    }
}

/// Paints `items` in sequence. The first failing item aborts the rest.
pub fn paint_items(canvas: &mut RasterCanvas, items: &[PageItem], ctx: &PaintContext<'_>) -> Result<()> {
    for item in items {
        paint_item(canvas, item, ctx)?;
    }
    Ok(())
}

fn paint_item(canvas: &mut RasterCanvas, item: &PageItem, ctx: &PaintContext<'_>) -> Result<()> {
    trace!("paint {} at {:?}", item.kind_name(), item.bounds());

    let item = match item {
        PageItem::CompositeMarkup(composite) => {
            let children = composite.expand(&ctx.layout())?;
            return paint_items(canvas, children, ctx);
        }
        PageItem::Line(line) => {
            draw_line_item(canvas, line);
            return Ok(());
        }
        other => other,
    };

    let style = item.style();
    let rect = canvas.pixel_rect(item.bounds());

    if matches!(item, PageItem::Text(_) | PageItem::Image(_) | PageItem::Rectangle(_)) {
        fill_background(canvas, rect, style);
    }
    if let Some(background) = &style.background_image {
        draw_image(canvas, background, rect, ctx)?;
    }

    match item {
        PageItem::Text(text) => draw_text(canvas, ctx.fonts, ctx.default_family, text),
        PageItem::Image(image) => draw_image(canvas, image, rect, ctx)?,
        PageItem::Rectangle(_) => {}
        PageItem::Ellipse(shape) => draw_ellipse(canvas, shape, rect),
        PageItem::Pie(pie) => draw_pie(canvas, pie, rect),
        PageItem::Polygon(polygon) => draw_polygon(canvas, polygon, rect),
        PageItem::Curve(curve) => draw_curve(canvas, curve),
        PageItem::Line(_) | PageItem::CompositeMarkup(_) => {}
    }

    draw_border(canvas, rect, style);
    Ok(())
}

/// Fills the item's full bounds; padding never shrinks the background.
fn fill_background(canvas: &mut RasterCanvas, rect: Rect, style: &StyleInfo) {
    let Some(paint) = fill_for(style).paint(rect) else {
        return;
    };
    if let Some(skia_rect) = rect.to_skia() {
        canvas.fill_path(&PathBuilder::from_rect(skia_rect), &paint, Transform::identity());
    }
}

fn edge_stroke(canvas: &RasterCanvas, edge: &BorderEdge, vertical: bool) -> Option<StrokeSpec> {
    let width = if vertical {
        canvas.pixels_x(edge.width)
    } else {
        canvas.pixels_y(edge.width)
    };
    stroke_for(edge, width)
}

fn draw_border(canvas: &mut RasterCanvas, rect: Rect, style: &StyleInfo) {
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return;
    }
    let b = &style.borders;
    let (left, top, right, bottom) = (rect.x, rect.y, rect.right(), rect.bottom());
    let edges = [
        (&b.top, false, (left, top), (right, top)),
        (&b.right, true, (right, top), (right, bottom)),
        (&b.left, true, (left, top), (left, bottom)),
        (&b.bottom, false, (left, bottom), (right, bottom)),
    ];
    for (edge, vertical, from, to) in edges {
        if let Some(spec) = edge_stroke(canvas, edge, vertical) {
            stroke_segment(canvas, spec, from, to);
        }
    }
}

fn stroke_segment(canvas: &mut RasterCanvas, spec: StrokeSpec, from: (f32, f32), to: (f32, f32)) {
    let mut pb = PathBuilder::new();
    pb.move_to(from.0, from.1);
    pb.line_to(to.0, to.1);
    if let Some(path) = pb.finish() {
        stroke_path(canvas, spec, &path);
    }
}

fn stroke_path(canvas: &mut RasterCanvas, spec: StrokeSpec, path: &Path) {
    let (paint, stroke) = spec.to_skia();
    canvas.stroke_path(path, &paint, &stroke, Transform::identity());
}

fn draw_line_item(canvas: &mut RasterCanvas, line: &LineItem) {
    let Some(spec) = edge_stroke(canvas, &line.style.borders.left, true) else {
        return;
    };
    let from = canvas.pixel_point(line.start);
    let to = canvas.pixel_point(line.end);
    stroke_segment(canvas, spec, (from.x, from.y), (to.x, to.y));
}

/// Fills `path` with the item's fill and outlines it with its top border.
fn fill_and_outline(canvas: &mut RasterCanvas, path: &Path, rect: Rect, style: &StyleInfo) {
    if let Some(paint) = fill_for(style).paint(rect) {
        canvas.fill_path(path, &paint, Transform::identity());
    }
    if let Some(spec) = edge_stroke(canvas, &style.borders.top, false) {
        stroke_path(canvas, spec, path);
    }
}

fn draw_ellipse(canvas: &mut RasterCanvas, shape: &ShapeItem, rect: Rect) {
    let Some(oval) = rect.to_skia().and_then(PathBuilder::from_oval) else {
        return;
    };
    fill_and_outline(canvas, &oval, rect, &shape.style);
}

fn draw_pie(canvas: &mut RasterCanvas, pie: &PieItem, rect: Rect) {
    let Some(path) = pie_path(rect, pie.start_angle, pie.sweep_angle) else {
        return;
    };
    fill_and_outline(canvas, &path, rect, &pie.style);
}

/// Closed wedge of the ellipse inscribed in `rect`. Angles are degrees,
/// clockwise on screen from the positive x axis.
fn pie_path(rect: Rect, start_deg: f32, sweep_deg: f32) -> Option<Path> {
    if !rect.is_drawable() || sweep_deg == 0.0 || !sweep_deg.is_finite() {
        return None;
    }
    let sweep = sweep_deg.clamp(-360.0, 360.0).to_radians();
    let start = start_deg.to_radians();
    let (cx, cy) = (rect.x + rect.width / 2.0, rect.y + rect.height / 2.0);
    let (rx, ry) = (rect.width / 2.0, rect.height / 2.0);
    let at = |angle: f32| (cx + rx * angle.cos(), cy + ry * angle.sin());

    let mut pb = PathBuilder::new();
    pb.move_to(cx, cy);
    let (sx, sy) = at(start);
    pb.line_to(sx, sy);

    let segments = (sweep.abs() / std::f32::consts::FRAC_PI_2).ceil().max(1.0) as usize;
    let step = sweep / segments as f32;
    let k = 4.0 / 3.0 * (step / 4.0).tan();
    let mut a0 = start;
    for _ in 0..segments {
        let a1 = a0 + step;
        let (x0, y0) = at(a0);
        let (x3, y3) = at(a1);
        let c1 = (x0 - k * rx * a0.sin(), y0 + k * ry * a0.cos());
        let c2 = (x3 + k * rx * a1.sin(), y3 - k * ry * a1.cos());
        pb.cubic_to(c1.0, c1.1, c2.0, c2.1, x3, y3);
        a0 = a1;
    }
    pb.close();
    pb.finish()
}

fn draw_polygon(canvas: &mut RasterCanvas, polygon: &PolygonItem, rect: Rect) {
    let points: Vec<Point> = polygon.points.iter().map(|p| canvas.pixel_point(*p)).collect();
    let Some((first, rest)) = points.split_first() else {
        return;
    };
    let mut pb = PathBuilder::new();
    pb.move_to(first.x, first.y);
    for p in rest {
        pb.line_to(p.x, p.y);
    }
    pb.close();
    let Some(path) = pb.finish() else {
        return;
    };
    if let Some(paint) = fill_for(&polygon.style).paint(rect) {
        canvas.fill_path(&path, &paint, Transform::identity());
    }
}

fn draw_curve(canvas: &mut RasterCanvas, curve: &CurveItem) {
    let Some(spec) = edge_stroke(canvas, &curve.style.borders.left, true) else {
        return;
    };
    let points: Vec<Point> = curve.points.iter().map(|p| canvas.pixel_point(*p)).collect();
    if let Some(path) = cardinal_spline(&points, curve.offset, curve.tension) {
        stroke_path(canvas, spec, &path);
    }
}

/// Cardinal spline through `points`, drawing the segments from `offset` to
/// the last point. Tangents use the neighbouring points, with the ends
/// duplicated.
fn cardinal_spline(points: &[Point], offset: usize, tension: f32) -> Option<Path> {
    if points.len() < 2 || offset + 1 >= points.len() {
        return None;
    }
    let t = tension / 3.0;
    let at = |i: isize| {
        let clamped = i.clamp(0, points.len() as isize - 1) as usize;
        points[clamped]
    };
    let mut pb = PathBuilder::new();
    pb.move_to(points[offset].x, points[offset].y);
    for i in offset..points.len() - 1 {
        let i = i as isize;
        let (p0, p1, p2, p3) = (at(i - 1), at(i), at(i + 1), at(i + 2));
        let c1 = (p1.x + t * (p2.x - p0.x), p1.y + t * (p2.y - p0.y));
        let c2 = (p2.x - t * (p3.x - p1.x), p2.y - t * (p3.y - p1.y));
        pb.cubic_to(c1.0, c1.1, c2.0, c2.1, p2.x, p2.y);
    }
    pb.finish()
}

/// Draws an image into the padded content area of `rect` (device pixels).
fn draw_image(
    canvas: &mut RasterCanvas,
    image: &ImageItem,
    rect: Rect,
    ctx: &PaintContext<'_>,
) -> Result<()> {
    let decoded = ctx.images.get_or_decode(&image.source)?;
    let mut metrics = decoded.metrics();
    if let Some(resolution) = image.resolution {
        metrics.resolution = resolution;
    }
    let dest = content_rect(canvas, rect, &image.style.padding);
    if !dest.is_drawable() {
        return Ok(());
    }
    let placed = place_image(image.sizing, metrics, dest, canvas.resolution());
    if placed.dest.width <= 0.0 || placed.dest.height <= 0.0 {
        return Ok(());
    }

    let sx = placed.dest.width / metrics.width as f32;
    let sy = placed.dest.height / metrics.height as f32;
    let transform = Transform::from_row(sx, 0.0, 0.0, sy, placed.dest.x, placed.dest.y);
    let paint = PixmapPaint {
        quality: if placed.unscaled {
            FilterQuality::Nearest
        } else {
            FilterQuality::Bilinear
        },
        ..PixmapPaint::default()
    };

    match placed.clip {
        Some(clip) => {
            let mut scoped = canvas.clip_to(clip);
            scoped.draw_pixmap(decoded.pixmap.as_ref(), &paint, transform);
        }
        None => canvas.draw_pixmap(decoded.pixmap.as_ref(), &paint, transform),
    }
    Ok(())
}
