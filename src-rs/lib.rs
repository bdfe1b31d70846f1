//! Table slicer
//!
//! Turns an image plus a set of rectangular selections into email-safe
//! nested-table HTML and one JPEG per image cell.

pub mod config;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod html;
pub mod interaction;
pub mod overlay;
pub mod raster;
pub mod selection;
pub mod session;
pub mod slice;

// Re-export commonly used types
pub use config::{Project, SlicerConfig};
pub use error::{InteractionError, RasterError, SelectionError, SliceError};
pub use geometry::{CoordinateMapper, PixelRect, Rect, ScreenPoint};
pub use grid::OccupantPrecedence;
pub use interaction::{InteractionController, InteractionOutcome};
pub use raster::{ImageRaster, RasterSource};
pub use selection::{Selection, SelectionContent, SelectionEdit, SelectionId, SelectionKind, SelectionStore};
pub use session::Session;
pub use slice::{slice, SliceFile, SliceOutput};
