//! Error types shared by the slicing pipeline and the interaction layer.

use thiserror::Error;

use crate::geometry::PixelRect;
use crate::selection::SelectionId;

/// A `font_size` string that is not `<number><px|em|rem>`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid font size {value:?}: expected a number followed by px, em or rem")]
pub struct FontSizeError {
    pub value: String,
}

/// Rejected edits against a stored selection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("selection width and height must be positive (got {width}x{height})")]
    NonPositiveSize { width: i32, height: i32 },

    #[error(transparent)]
    InvalidFontSize(#[from] FontSizeError),

    #[error("field `{field}` does not apply to a {kind} selection")]
    KindMismatch {
        field: &'static str,
        kind: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InteractionError {
    #[error("a slice is still encoding; wait for it to finish before changing selections")]
    SlicePending,

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// Failure of the raster-access capability for one cell.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("crop {rect} lies outside the {width}x{height} source image")]
    OutOfBounds {
        rect: PixelRect,
        width: u32,
        height: u32,
    },

    #[error("JPEG encode failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("{0}")]
    Other(String),
}

/// One cell that could not be rasterized.
#[derive(Debug)]
pub struct CellFailure {
    pub file_name: String,
    pub rect: PixelRect,
    pub error: RasterError,
}

#[derive(Debug, Error)]
pub enum SliceError {
    #[error("source image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("invalid font size {value:?} on {label} (selection {id})")]
    InvalidFontSize {
        id: SelectionId,
        label: String,
        value: String,
    },

    #[error("{} of {total} cell(s) failed to encode", failures.len())]
    Encode {
        total: usize,
        failures: Vec<CellFailure>,
    },

    #[error("slice worker panicked before producing a result")]
    WorkerPanicked,

    #[error("no slice is pending")]
    NothingPending,

    #[error(transparent)]
    Interaction(#[from] InteractionError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("display width must be positive")]
    ZeroDisplayWidth,

    #[error("jpeg quality must be between 1 and 100 (got {0})")]
    JpegQuality(u8),

    #[error("source image width must be positive")]
    ZeroImageWidth,
}
