//! Overview/detail navigation on top of two raster jobs

mod coordinator;
pub mod viewport;

pub use coordinator::{
    CoordinatorState, DisplayFrame, DualViewCoordinator, ViewEvent, ViewRole, ZoomOutcome,
};
pub use viewport::{OverlayRect, PageSize, ViewGeometry};
