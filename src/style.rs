use crate::page::ImageItem;
use crate::types::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderStyle {
    #[default]
    None,
    Dotted,
    Dashed,
    Solid,
    Double,
    Groove,
    Ridge,
    Inset,
    WindowInset,
    Outset,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BorderEdge {
    pub style: BorderStyle,
    /// Stroke width in points.
    pub width: f32,
    pub color: Color,
}

impl BorderEdge {
    pub fn new(style: BorderStyle, width: f32, color: Color) -> Self {
        Self {
            style,
            width,
            color,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Borders {
    pub top: BorderEdge,
    pub right: BorderEdge,
    pub bottom: BorderEdge,
    pub left: BorderEdge,
}

impl Borders {
    pub fn all(edge: BorderEdge) -> Self {
        Self {
            top: edge,
            right: edge,
            bottom: edge,
            left: edge,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradientType {
    #[default]
    None,
    LeftRight,
    TopBottom,
    Center,
    DiagonalLeft,
    DiagonalRight,
    HorizontalCenter,
    VerticalCenter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontWeight {
    Lighter,
    #[default]
    Normal,
    Bold,
    Bolder,
    W100,
    W200,
    W300,
    W400,
    W500,
    W600,
    W700,
    W800,
    W900,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextDecoration {
    #[default]
    None,
    Underline,
    Overline,
    LineThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    #[default]
    General,
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalAlign {
    #[default]
    Top,
    Middle,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritingMode {
    #[default]
    LrTb,
    TbRl,
}

/// Padding per side, in points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Padding {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Padding {
    pub fn all(value: f32) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }
}

/// Fully resolved visual attributes of one page item. Produced upstream by
/// the expression engine; painting only reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleInfo {
    pub borders: Borders,
    pub background_color: Color,
    pub gradient_type: GradientType,
    pub gradient_end_color: Color,
    pub background_image: Option<Box<ImageItem>>,
    pub color: Color,
    pub font_family: String,
    /// Font size in points.
    pub font_size: f32,
    pub font_style: FontStyle,
    pub font_weight: FontWeight,
    pub text_decoration: TextDecoration,
    pub text_align: TextAlign,
    pub vertical_align: VerticalAlign,
    pub writing_mode: WritingMode,
    pub padding: Padding,
}

impl Default for StyleInfo {
    fn default() -> Self {
        Self {
            borders: Borders::default(),
            background_color: Color::EMPTY,
            gradient_type: GradientType::None,
            gradient_end_color: Color::EMPTY,
            background_image: None,
            color: Color::BLACK,
            font_family: "Arial".to_string(),
            font_size: 10.0,
            font_style: FontStyle::Normal,
            font_weight: FontWeight::Normal,
            text_decoration: TextDecoration::None,
            text_align: TextAlign::General,
            vertical_align: VerticalAlign::Top,
            writing_mode: WritingMode::LrTb,
            padding: Padding::default(),
        }
    }
}
