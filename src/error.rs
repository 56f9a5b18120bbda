//! Error kinds surfaced to callers of the job and view layers

use crate::raster::{DisplayHandle, RasterError};
use crate::settings::SettingsError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewError {
    /// Non-positive resolution, page below 1, and similar
    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    /// A production is already in flight on this controller
    #[error("production already in flight on {handle}")]
    Busy { handle: DisplayHandle },

    /// Geometry has no page dimensions yet
    #[error("view has not completed a production yet")]
    NotReady,

    #[error("production {handle} aborted: {reason}")]
    AbortedProduction {
        handle: DisplayHandle,
        reason: String,
    },
}

impl ViewError {
    pub fn invalid(name: &'static str, value: impl ToString) -> Self {
        Self::InvalidParameter {
            name,
            value: value.to_string(),
        }
    }
}

/// Failure to bring up a pair of views
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    View(#[from] ViewError),
}
