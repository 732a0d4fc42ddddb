/// Straight (non-premultiplied) RGBA color. Alpha 0 means "no color".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const EMPTY: Color = Color::rgba(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Fully transparent colors never paint anything.
    pub fn is_empty(self) -> bool {
        self.a == 0
    }

    pub(crate) fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::EMPTY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle. Layout rectangles are in points (1/72 inch);
/// once converted by the canvas they are in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Non-positive extents mean there is nothing to draw.
    pub fn is_drawable(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        const EPS: f32 = 1e-3;
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.right() <= self.right() + EPS
            && other.bottom() <= self.bottom() + EPS
    }

    pub(crate) fn to_skia(self) -> Option<tiny_skia::Rect> {
        tiny_skia::Rect::from_xywh(self.x, self.y, self.width, self.height)
    }
}

/// Physical page size in hundredths of a millimeter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize {
    pub width: u32,
    pub height: u32,
}

impl PageSize {
    pub const fn from_hundredths_mm(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn letter() -> Self {
        // 8.5in x 11in.
        Self::from_hundredths_mm(21_590, 27_940)
    }

    pub fn a4() -> Self {
        Self::from_hundredths_mm(21_000, 29_700)
    }

    pub fn from_inches(width_in: f32, height_in: f32) -> Self {
        Self {
            width: (width_in * 2540.0).round().max(0.0) as u32,
            height: (height_in * 2540.0).round().max(0.0) as u32,
        }
    }
}

/// Pixels per inch on each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub x: f32,
    pub y: f32,
}

impl Resolution {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub const fn uniform(dpi: f32) -> Self {
        Self { x: dpi, y: dpi }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.x > 0.0 && self.y > 0.0
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::uniform(200.0)
    }
}
