//! Text layout and glyph rasterization for text items.

use crate::canvas::RasterCanvas;
use crate::font::{FontRegistry, ResolvedFont};
use crate::page::TextItem;
use crate::primitives::{Alignment, TextFormat, content_rect, font_request_for, text_format_for};
use crate::style::StyleInfo;
use crate::types::{Color, Rect};
use log::trace;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use tiny_skia::{LineCap, LineJoin, Paint, Path, PathBuilder, Stroke, Transform};
use std::ops::RangeInclusive;
use ttf_parser::{GlyphId, OutlineBuilder};

/// Horizontal shear applied for synthetic italics.
const SYNTHETIC_OBLIQUE: f32 = 0.2;
/// Outline stroke width for synthetic bold, as a fraction of the em size.
const SYNTHETIC_BOLD: f32 = 0.04;

#[derive(Debug, Clone, Copy)]
struct PositionedGlyph {
    id: u16,
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Default)]
struct ShapedLine {
    glyphs: Vec<PositionedGlyph>,
    width: f32,
}

/// A parsed face at a fixed size. All lengths it returns are in points.
struct TextShaper<'a> {
    face: ttf_parser::Face<'a>,
    hb: Option<HbFace<'a>>,
    size: f32,
    scale: f32,
}

impl<'a> TextShaper<'a> {
    fn new(data: &'a [u8], size: f32) -> Option<Self> {
        let face = ttf_parser::Face::parse(data, 0).ok()?;
        let upem = face.units_per_em().max(1) as f32;
        Some(Self {
            hb: HbFace::from_slice(data, 0),
            face,
            size,
            scale: size / upem,
        })
    }

    fn ascent(&self) -> f32 {
        self.face.ascender() as f32 * self.scale
    }

    fn line_height(&self) -> f32 {
        let units = self.face.ascender() as f32 - self.face.descender() as f32
            + self.face.line_gap() as f32;
        let height = units * self.scale;
        if height > 0.0 { height } else { self.size * 1.2 }
    }

    /// Offset below the baseline (positive down) and thickness.
    fn underline(&self) -> (f32, f32) {
        match self.face.underline_metrics() {
            Some(m) => (-(m.position as f32) * self.scale, m.thickness as f32 * self.scale),
            None => (self.size * 0.1, self.size * 0.05),
        }
    }

    /// Offset above the baseline (positive up) and thickness.
    fn strikeout(&self) -> (f32, f32) {
        match self.face.strikeout_metrics() {
            Some(m) => (m.position as f32 * self.scale, m.thickness as f32 * self.scale),
            None => (self.size * 0.3, self.size * 0.05),
        }
    }

    /// Shapes one line. The run goes right to left when `right_to_left` is
    /// set or the text contains right-to-left script; glyphs come back in
    /// visual order either way.
    fn shape(&self, text: &str, right_to_left: bool) -> ShapedLine {
        let rtl = right_to_left || is_rtl_script(text);
        let Some(hb) = &self.hb else {
            return self.shape_unshaped(text, rtl);
        };
        let mut buffer = UnicodeBuffer::new();
        buffer.push_str(text);
        buffer.set_direction(if rtl {
            HbDirection::RightToLeft
        } else {
            HbDirection::LeftToRight
        });
        let output = rustybuzz::shape(hb, &[], buffer);
        let infos = output.glyph_infos();
        let positions = output.glyph_positions();
        if infos.len() != positions.len() {
            return self.shape_unshaped(text, rtl);
        }
        let mut line = ShapedLine::default();
        let mut pen = 0.0f32;
        for (info, pos) in infos.iter().zip(positions) {
            let id = info.glyph_id as u16;
            if id != 0 {
                line.glyphs.push(PositionedGlyph {
                    id,
                    x: pen + pos.x_offset as f32 * self.scale,
                    y: -(pos.y_offset as f32) * self.scale,
                });
            }
            pen += pos.x_advance as f32 * self.scale;
        }
        line.width = pen;
        line
    }

    fn shape_unshaped(&self, text: &str, rtl: bool) -> ShapedLine {
        let mut line = ShapedLine::default();
        let mut pen = 0.0f32;
        let chars: Vec<char> = if rtl {
            text.chars().rev().collect()
        } else {
            text.chars().collect()
        };
        for ch in chars {
            let gid = self.face.glyph_index(ch).map(|id| id.0).unwrap_or(0);
            let mut advance = self
                .face
                .glyph_hor_advance(GlyphId(gid))
                .map(|v| v as f32 * self.scale)
                .unwrap_or(0.0);
            if advance <= 0.0 {
                advance = self.size * 0.5;
            }
            if gid != 0 {
                line.glyphs.push(PositionedGlyph { id: gid, x: pen, y: 0.0 });
            }
            pen += advance;
        }
        line.width = pen;
        line
    }

    fn glyph_path(&self, glyph: u16, skew: f32) -> Option<Path> {
        let mut builder = GlyphPathBuilder::new(self.scale, skew);
        self.face.outline_glyph(GlyphId(glyph), &mut builder)?;
        builder.finish()
    }
}

/// Converts font-unit outlines (y up) into point-space paths (y down)
/// relative to the glyph origin.
struct GlyphPathBuilder {
    builder: PathBuilder,
    scale: f32,
    skew: f32,
}

impl GlyphPathBuilder {
    fn new(scale: f32, skew: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            scale,
            skew,
        }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        ((x + y * self.skew) * self.scale, -y * self.scale)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Hebrew through Arabic Extended, the Hebrew and Arabic presentation
/// forms, the historic right-to-left scripts of the SMP and Arabic
/// mathematical symbols.
const RTL_BLOCKS: [RangeInclusive<char>; 5] = [
    '\u{0590}'..='\u{08FF}',
    '\u{FB1D}'..='\u{FDFF}',
    '\u{FE70}'..='\u{FEFF}',
    '\u{10800}'..='\u{10FFF}',
    '\u{1EE00}'..='\u{1EEFF}',
];

fn is_rtl_script(text: &str) -> bool {
    text.chars()
        .any(|ch| RTL_BLOCKS.iter().any(|block| block.contains(&ch)))
}

/// Greedy word wrap. Explicit newlines always break; a single word wider
/// than `max_width` gets a line of its own.
fn wrap_lines(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{current} {word}");
            if measure(&candidate) > max_width {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
            } else {
                current = candidate;
            }
        }
        lines.push(current);
    }
    lines
}

fn align_offset(alignment: Alignment, available: f32, used: f32) -> f32 {
    match alignment {
        Alignment::Near => 0.0,
        Alignment::Center => (available - used) / 2.0,
        Alignment::Far => available - used,
    }
}

/// Maps layout space (x along the line, y across lines) onto the page in
/// points. Vertical text runs top to bottom with lines progressing leftward.
fn layout_transform(content: Rect, vertical: bool) -> Transform {
    if vertical {
        Transform::from_row(0.0, 1.0, -1.0, 0.0, content.right(), content.y)
    } else {
        Transform::from_translate(content.x, content.y)
    }
}

fn resolve(fonts: &FontRegistry, default_family: &str, style: &StyleInfo) -> Option<ResolvedFont> {
    fonts.resolve(&font_request_for(style), default_family)
}

/// Unwrapped advance width of `text` in points. Falls back to an estimate
/// of half an em per character when no font is available.
pub fn measure_text_pt(
    fonts: &FontRegistry,
    default_family: &str,
    text: &str,
    style: &StyleInfo,
) -> f32 {
    let size = style.font_size.max(0.0);
    resolve(fonts, default_family, style)
        .and_then(|font| {
            let shaper = TextShaper::new(&font.face.data, size)?;
            Some(shaper.shape(text, false).width)
        })
        .unwrap_or_else(|| text.chars().count() as f32 * size * 0.5)
}

pub fn line_height_pt(fonts: &FontRegistry, default_family: &str, style: &StyleInfo) -> f32 {
    let size = style.font_size.max(0.0);
    resolve(fonts, default_family, style)
        .and_then(|font| Some(TextShaper::new(&font.face.data, size)?.line_height()))
        .unwrap_or(size * 1.2)
}

/// Paints a text item. Text with no usable font or an invisible color
/// draws nothing; this never fails the page.
pub(crate) fn draw_text(
    canvas: &mut RasterCanvas,
    fonts: &FontRegistry,
    default_family: &str,
    item: &TextItem,
) {
    let style = &item.style;
    if item.text.trim().is_empty() || style.color.is_empty() || style.font_size <= 0.0 {
        return;
    }
    let request = font_request_for(style);
    let Some(font) = fonts.resolve(&request, default_family) else {
        return;
    };
    let Some(shaper) = TextShaper::new(&font.face.data, request.size) else {
        return;
    };
    let format = text_format_for(style);

    let device = Transform::from_scale(canvas.pixels_x(1.0), canvas.pixels_y(1.0));
    if item.no_clip {
        let origin = Rect::new(item.bounds.x, item.bounds.y, 0.0, 0.0);
        let lines: Vec<ShapedLine> = item
            .text
            .split('\n')
            .map(|l| shaper.shape(l, format.right_to_left))
            .collect();
        let placed = place_lines(&shaper, lines, origin, format, false);
        paint_lines(canvas, &shaper, &font, &request_flags(&request), style.color, &placed, device);
        return;
    }

    let padded = content_points(item.bounds, style);
    if !padded.is_drawable() {
        return;
    }
    let (along, across) = if format.vertical_text {
        (padded.height, padded.width)
    } else {
        (padded.width, padded.height)
    };
    let rtl = format.right_to_left;
    let lines: Vec<ShapedLine> = wrap_lines(&item.text, along, |s| shaper.shape(s, rtl).width)
        .iter()
        .map(|l| shaper.shape(l, rtl))
        .collect();
    trace!(
        "text '{}' wrapped to {} line(s) at {:.1}pt",
        truncate(&item.text),
        lines.len(),
        request.size
    );
    let frame = Rect::new(0.0, 0.0, along, across);
    let placed = place_lines(&shaper, lines, frame, format, true);
    let to_page = device.pre_concat(layout_transform(padded, format.vertical_text));

    let clip = content_rect(canvas, canvas.pixel_rect(item.bounds), &style.padding);
    let mut scoped = canvas.clip_to(clip);
    paint_lines(&mut scoped, &shaper, &font, &request_flags(&request), style.color, &placed, to_page);
}

fn content_points(bounds: Rect, style: &StyleInfo) -> Rect {
    let p = &style.padding;
    Rect::new(
        bounds.x + p.left,
        bounds.y + p.top,
        bounds.width - p.left - p.right,
        bounds.height - p.top - p.bottom,
    )
}

struct PlacedLine {
    line: ShapedLine,
    x: f32,
    baseline: f32,
}

#[derive(Clone, Copy)]
struct Decorations {
    underline: bool,
    strikeout: bool,
}

fn request_flags(request: &crate::primitives::FontRequest) -> Decorations {
    Decorations {
        underline: request.underline,
        strikeout: request.strikeout,
    }
}

/// Positions lines inside `frame`. When `aligned` is false every line
/// starts at the frame's top-left.
fn place_lines(
    shaper: &TextShaper<'_>,
    lines: Vec<ShapedLine>,
    frame: Rect,
    format: TextFormat,
    aligned: bool,
) -> Vec<PlacedLine> {
    let line_height = shaper.line_height();
    let block = line_height * lines.len() as f32;
    let top = if aligned {
        frame.y + align_offset(format.vertical, frame.height, block)
    } else {
        frame.y
    };
    lines
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            let x = if aligned {
                frame.x + align_offset(format.horizontal, frame.width, line.width)
            } else {
                frame.x
            };
            PlacedLine {
                x,
                baseline: top + index as f32 * line_height + shaper.ascent(),
                line,
            }
        })
        .collect()
}

fn paint_lines(
    canvas: &mut RasterCanvas,
    shaper: &TextShaper<'_>,
    font: &ResolvedFont,
    decorations: &Decorations,
    color: Color,
    lines: &[PlacedLine],
    transform: Transform,
) {
    let mut paint = Paint::default();
    paint.set_color(color.to_skia());
    paint.anti_alias = true;
    let skew = if font.synthetic_italic { SYNTHETIC_OBLIQUE } else { 0.0 };
    let bold_stroke = font.synthetic_bold.then(|| Stroke {
        width: shaper.size * SYNTHETIC_BOLD,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    });

    for placed in lines {
        for glyph in &placed.line.glyphs {
            let Some(path) = shaper.glyph_path(glyph.id, skew) else {
                continue;
            };
            let local = transform.pre_translate(placed.x + glyph.x, placed.baseline + glyph.y);
            canvas.fill_path(&path, &paint, local);
            if let Some(stroke) = &bold_stroke {
                canvas.stroke_path(&path, &paint, stroke, local);
            }
        }
        if placed.line.width <= 0.0 {
            continue;
        }
        let mut bars = Vec::new();
        if decorations.underline {
            let (offset, thickness) = shaper.underline();
            bars.push((placed.baseline + offset, thickness));
        }
        if decorations.strikeout {
            let (offset, thickness) = shaper.strikeout();
            bars.push((placed.baseline - offset, thickness));
        }
        for (center, thickness) in bars {
            let rect = tiny_skia::Rect::from_xywh(
                placed.x,
                center - thickness / 2.0,
                placed.line.width,
                thickness.max(0.5),
            );
            if let Some(rect) = rect {
                canvas.fill_path(&PathBuilder::from_rect(rect), &paint, transform);
            }
        }
    }
}

fn truncate(text: &str) -> String {
    const MAX_CHARS: usize = 32;
    let mut out: String = text.chars().take(MAX_CHARS).collect();
    if text.chars().count() > MAX_CHARS {
        out.push_str("...");
    }
    out
}
