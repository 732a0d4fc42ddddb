//! Translation of resolved style attributes into drawing primitives:
//! strokes, fills and text formatting.

use crate::canvas::RasterCanvas;
use crate::style::{
    BorderEdge, BorderStyle, FontStyle, FontWeight, GradientType, Padding, StyleInfo,
    TextAlign, TextDecoration, VerticalAlign, WritingMode,
};
use crate::types::{Color, Rect};
use tiny_skia::{
    GradientStop, LineCap, LineJoin, LinearGradient, Paint, Point, SpreadMode, Stroke,
    StrokeDash, Transform,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashKind {
    Solid,
    Dash,
    Dot,
}

/// A pen: width in device pixels, color and dash pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeSpec {
    pub width: f32,
    pub color: Color,
    pub dash: DashKind,
}

impl StrokeSpec {
    /// Dash lengths are multiples of the pen width: dashes are 3 on 1 off,
    /// dots are 1 on 1 off.
    pub fn dash_pattern(&self) -> Option<[f32; 2]> {
        match self.dash {
            DashKind::Solid => None,
            DashKind::Dash => Some([self.width * 3.0, self.width]),
            DashKind::Dot => Some([self.width, self.width]),
        }
    }

    pub(crate) fn to_skia(self) -> (Paint<'static>, Stroke) {
        let mut paint = Paint::default();
        paint.set_color(self.color.to_skia());
        paint.anti_alias = true;

        let mut stroke = Stroke {
            width: self.width,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            ..Stroke::default()
        };
        if let Some(pattern) = self.dash_pattern() {
            stroke.dash = StrokeDash::new(pattern.to_vec(), 0.0);
        }
        (paint, stroke)
    }
}

/// Pen for one border edge, or `None` when the edge paints nothing.
/// Only dashed and dotted styles get a pattern; every other visible style
/// is a plain solid stroke.
pub fn stroke_for(edge: &BorderEdge, width_px: f32) -> Option<StrokeSpec> {
    if edge.style == BorderStyle::None || edge.color.is_empty() || edge.width <= 0.0 {
        return None;
    }
    if width_px.is_nan() || width_px <= 0.0 {
        return None;
    }
    let dash = match edge.style {
        BorderStyle::Dashed => DashKind::Dash,
        BorderStyle::Dotted => DashKind::Dot,
        BorderStyle::None
        | BorderStyle::Solid
        | BorderStyle::Double
        | BorderStyle::Groove
        | BorderStyle::Ridge
        | BorderStyle::Inset
        | BorderStyle::WindowInset
        | BorderStyle::Outset => DashKind::Solid,
    };
    Some(StrokeSpec {
        width: width_px,
        color: edge.color,
        dash,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientDirection {
    LeftRight,
    TopBottom,
    DiagonalForward,
    DiagonalBackward,
}

/// A brush for backgrounds and shape interiors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillSpec {
    None,
    Solid(Color),
    Gradient {
        start: Color,
        end: Color,
        direction: GradientDirection,
    },
}

impl FillSpec {
    pub fn is_none(&self) -> bool {
        matches!(self, FillSpec::None)
    }

    /// Paint covering `rect` (device pixels). Gradients span the rectangle.
    pub(crate) fn paint(&self, rect: Rect) -> Option<Paint<'static>> {
        let mut paint = Paint::default();
        paint.anti_alias = true;
        match *self {
            FillSpec::None => return None,
            FillSpec::Solid(color) => paint.set_color(color.to_skia()),
            FillSpec::Gradient {
                start,
                end,
                direction,
            } => {
                let (from, to) = gradient_axis(rect, direction);
                paint.shader = LinearGradient::new(
                    from,
                    to,
                    vec![
                        GradientStop::new(0.0, start.to_skia()),
                        GradientStop::new(1.0, end.to_skia()),
                    ],
                    SpreadMode::Pad,
                    Transform::identity(),
                )?;
            }
        }
        Some(paint)
    }
}

fn gradient_axis(rect: Rect, direction: GradientDirection) -> (Point, Point) {
    let (left, top, right, bottom) = (rect.x, rect.y, rect.right(), rect.bottom());
    match direction {
        GradientDirection::LeftRight => (Point::from_xy(left, top), Point::from_xy(right, top)),
        GradientDirection::TopBottom => (Point::from_xy(left, top), Point::from_xy(left, bottom)),
        GradientDirection::DiagonalForward => {
            (Point::from_xy(left, top), Point::from_xy(right, bottom))
        }
        GradientDirection::DiagonalBackward => {
            (Point::from_xy(right, top), Point::from_xy(left, bottom))
        }
    }
}

pub fn gradient_direction(kind: GradientType) -> Option<GradientDirection> {
    match kind {
        GradientType::None => None,
        GradientType::LeftRight | GradientType::Center | GradientType::HorizontalCenter => {
            Some(GradientDirection::LeftRight)
        }
        GradientType::TopBottom | GradientType::VerticalCenter => {
            Some(GradientDirection::TopBottom)
        }
        GradientType::DiagonalLeft => Some(GradientDirection::DiagonalForward),
        GradientType::DiagonalRight => Some(GradientDirection::DiagonalBackward),
    }
}

/// Background brush: a gradient when both ends are visible, else the solid
/// background color, else nothing.
pub fn fill_for(style: &StyleInfo) -> FillSpec {
    if !style.background_color.is_empty() && !style.gradient_end_color.is_empty() {
        if let Some(direction) = gradient_direction(style.gradient_type) {
            return FillSpec::Gradient {
                start: style.background_color,
                end: style.gradient_end_color,
                direction,
            };
        }
    }
    if style.background_color.is_empty() {
        FillSpec::None
    } else {
        FillSpec::Solid(style.background_color)
    }
}

/// What font to ask the registry for.
#[derive(Debug, Clone, PartialEq)]
pub struct FontRequest {
    pub family: String,
    /// Size in points.
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikeout: bool,
}

pub fn font_request_for(style: &StyleInfo) -> FontRequest {
    let bold = matches!(
        style.font_weight,
        FontWeight::Bold
            | FontWeight::Bolder
            | FontWeight::W500
            | FontWeight::W600
            | FontWeight::W700
            | FontWeight::W800
            | FontWeight::W900
    );
    FontRequest {
        family: style.font_family.clone(),
        size: style.font_size,
        bold,
        italic: style.font_style == FontStyle::Italic,
        underline: style.text_decoration == TextDecoration::Underline,
        strikeout: style.text_decoration == TextDecoration::LineThrough,
    }
}

/// Placement of a text block along one axis of its layout box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Near,
    Center,
    Far,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextFormat {
    pub horizontal: Alignment,
    pub vertical: Alignment,
    pub right_to_left: bool,
    pub vertical_text: bool,
}

pub fn text_format_for(style: &StyleInfo) -> TextFormat {
    let horizontal = match style.text_align {
        TextAlign::Right => Alignment::Far,
        TextAlign::Center => Alignment::Center,
        TextAlign::Left | TextAlign::General => Alignment::Near,
    };
    let vertical = match style.vertical_align {
        VerticalAlign::Bottom => Alignment::Far,
        VerticalAlign::Middle => Alignment::Center,
        VerticalAlign::Top => Alignment::Near,
    };
    let flipped = style.writing_mode == WritingMode::TbRl;
    TextFormat {
        horizontal,
        vertical,
        right_to_left: flipped,
        vertical_text: flipped,
    }
}

/// Shrinks a device-pixel rectangle by `padding` (points). Used for text
/// and image content only; backgrounds always cover the full bounds.
pub fn content_rect(canvas: &RasterCanvas, rect: Rect, padding: &Padding) -> Rect {
    let left = canvas.pixels_x(padding.left);
    let right = canvas.pixels_x(padding.right);
    let top = canvas.pixels_y(padding.top);
    let bottom = canvas.pixels_y(padding.bottom);
    Rect::new(
        rect.x + left,
        rect.y + top,
        rect.width - left - right,
        rect.height - top - bottom,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PageSize, Resolution};

    fn edge(style: BorderStyle, width: f32, color: Color) -> BorderEdge {
        BorderEdge::new(style, width, color)
    }

    #[test]
    fn invisible_borders_emit_no_stroke() {
        let styles = [
            BorderStyle::None,
            BorderStyle::Solid,
            BorderStyle::Dashed,
            BorderStyle::Dotted,
            BorderStyle::Groove,
        ];
        let colors = [Color::BLACK, Color::EMPTY, Color::rgba(10, 20, 30, 0)];
        let widths = [-1.0f32, 0.0, 0.5, 2.0];
        for style in styles {
            for color in colors {
                for width in widths {
                    let spec = stroke_for(&edge(style, width, color), width.max(0.0) + 1.0);
                    let visible = style != BorderStyle::None && !color.is_empty() && width > 0.0;
                    assert_eq!(spec.is_some(), visible, "{style:?} {color:?} {width}");
                }
            }
        }
    }

    #[test]
    fn dashed_border_gets_dash_pattern() {
        let spec = stroke_for(&edge(BorderStyle::Dashed, 2.0, Color::BLACK), 2.0).unwrap();
        assert_eq!(spec.dash, DashKind::Dash);
        assert_eq!(spec.dash_pattern(), Some([6.0, 2.0]));
        let (_, stroke) = spec.to_skia();
        assert!(stroke.dash.is_some());
    }

    #[test]
    fn dotted_border_gets_dot_pattern() {
        let spec = stroke_for(&edge(BorderStyle::Dotted, 1.0, Color::BLACK), 1.0).unwrap();
        assert_eq!(spec.dash, DashKind::Dot);
    }

    #[test]
    fn bevel_styles_are_plain_solid() {
        for style in [
            BorderStyle::Solid,
            BorderStyle::Double,
            BorderStyle::Groove,
            BorderStyle::Ridge,
            BorderStyle::Inset,
            BorderStyle::WindowInset,
            BorderStyle::Outset,
        ] {
            let spec = stroke_for(&edge(style, 1.0, Color::BLACK), 1.0).unwrap();
            assert_eq!(spec.dash, DashKind::Solid);
            assert!(spec.to_skia().1.dash.is_none());
        }
    }

    #[test]
    fn gradient_types_map_to_directions() {
        use GradientDirection::*;
        let cases = [
            (GradientType::LeftRight, LeftRight),
            (GradientType::TopBottom, TopBottom),
            (GradientType::Center, LeftRight),
            (GradientType::HorizontalCenter, LeftRight),
            (GradientType::VerticalCenter, TopBottom),
            (GradientType::DiagonalLeft, DiagonalForward),
            (GradientType::DiagonalRight, DiagonalBackward),
        ];
        for (kind, want) in cases {
            assert_eq!(gradient_direction(kind), Some(want));
        }
        assert_eq!(gradient_direction(GradientType::None), None);
    }

    #[test]
    fn fill_prefers_gradient_then_solid() {
        let mut style = StyleInfo {
            background_color: Color::rgb(255, 0, 0),
            gradient_type: GradientType::LeftRight,
            gradient_end_color: Color::rgb(0, 0, 255),
            ..StyleInfo::default()
        };
        assert!(matches!(fill_for(&style), FillSpec::Gradient { .. }));

        style.gradient_end_color = Color::EMPTY;
        assert_eq!(fill_for(&style), FillSpec::Solid(Color::rgb(255, 0, 0)));

        style.background_color = Color::EMPTY;
        style.gradient_end_color = Color::rgb(0, 0, 255);
        assert_eq!(fill_for(&style), FillSpec::None);
    }

    #[test]
    fn font_flags_combine_independently() {
        let style = StyleInfo {
            font_weight: FontWeight::W600,
            font_style: FontStyle::Italic,
            text_decoration: TextDecoration::LineThrough,
            ..StyleInfo::default()
        };
        let request = font_request_for(&style);
        assert!(request.bold && request.italic && request.strikeout);
        assert!(!request.underline);

        let plain = font_request_for(&StyleInfo {
            font_weight: FontWeight::W400,
            text_decoration: TextDecoration::Overline,
            ..StyleInfo::default()
        });
        assert!(!plain.bold && !plain.italic && !plain.underline && !plain.strikeout);
    }

    #[test]
    fn alignment_and_writing_mode() {
        let style = StyleInfo {
            text_align: TextAlign::Right,
            vertical_align: VerticalAlign::Middle,
            writing_mode: WritingMode::TbRl,
            ..StyleInfo::default()
        };
        let format = text_format_for(&style);
        assert_eq!(format.horizontal, Alignment::Far);
        assert_eq!(format.vertical, Alignment::Center);
        assert!(format.right_to_left && format.vertical_text);

        let format = text_format_for(&StyleInfo::default());
        assert_eq!(format.horizontal, Alignment::Near);
        assert_eq!(format.vertical, Alignment::Near);
        assert!(!format.right_to_left && !format.vertical_text);
    }

    #[test]
    fn padding_shrinks_content_rect() {
        let canvas = RasterCanvas::new(
            PageSize::from_inches(2.0, 2.0),
            Resolution::uniform(144.0),
            Color::WHITE,
        )
        .unwrap();
        let rect = Rect::new(10.0, 10.0, 100.0, 60.0);
        let padding = Padding {
            top: 1.0,
            right: 2.0,
            bottom: 3.0,
            left: 4.0,
        };
        let content = content_rect(&canvas, rect, &padding);
        assert_eq!(content, Rect::new(18.0, 12.0, 88.0, 52.0));
    }
}
