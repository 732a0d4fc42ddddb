use crate::document::{ColorMode, Compression};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid raster size {width}x{height} px at {dpi_x}x{dpi_y} DPI")]
    InvalidRasterSize {
        width: i64,
        height: i64,
        dpi_x: f32,
        dpi_y: f32,
    },

    #[error("image decode failed: {0}")]
    ImageDecode(String),

    #[error("no pages to render")]
    EmptyDocument,

    #[error("frame {index} is {found:?} but the document was opened as {expected:?}")]
    FrameMismatch {
        index: usize,
        expected: ColorMode,
        found: ColorMode,
    },

    #[error("compression {compression:?} cannot encode {mode:?} frames")]
    UnsupportedCompression {
        compression: Compression,
        mode: ColorMode,
    },

    #[error("document exceeds the 4 GiB TIFF offset range")]
    OffsetOverflow,

    #[error("markup expansion failed: {0}")]
    Markup(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
