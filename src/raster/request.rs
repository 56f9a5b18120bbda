//! Messages between the control thread and rasterizer workers

use std::path::PathBuf;

use super::types::{DisplayHandle, PixelRect, RasterBuffer, Resolution};

/// What a rasterizer should open
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSpec {
    pub source: PathBuf,
}

impl JobSpec {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Request sent to a rasterizer worker
#[derive(Debug)]
pub enum ProductionRequest {
    /// Produce one page
    Produce {
        handle: DisplayHandle,
        page: u32,
        resolution: Resolution,
    },

    /// Shutdown the worker
    Shutdown,
}

/// Errors reported by a rasterizer service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RasterError {
    #[error("consumer aborted production with status {code}")]
    Aborted { code: i32 },

    #[error("page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("invalid job: {detail}")]
    InvalidJob { detail: String },

    #[error("{detail}")]
    Device { detail: String },
}

impl RasterError {
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device { detail: msg.into() }
    }
}

/// Callback traffic marshaled from the producer thread to the control thread
#[derive(Debug)]
pub enum SinkEvent {
    Opened {
        handle: DisplayHandle,
    },

    /// Raster copied out at size time
    Sized {
        handle: DisplayHandle,
        buffer: Box<RasterBuffer>,
    },

    Updated {
        handle: DisplayHandle,
        rect: PixelRect,
    },

    PageReady {
        handle: DisplayHandle,
        copies: u32,
    },

    Synced {
        handle: DisplayHandle,
    },

    Closed {
        handle: DisplayHandle,
    },

    /// The sink refused a callback
    Aborted {
        handle: DisplayHandle,
        reason: String,
    },

    /// The rasterizer gave up on its own
    Failed {
        handle: DisplayHandle,
        error: RasterError,
    },
}

impl SinkEvent {
    #[must_use]
    pub fn handle(&self) -> DisplayHandle {
        match self {
            Self::Opened { handle }
            | Self::Sized { handle, .. }
            | Self::Updated { handle, .. }
            | Self::PageReady { handle, .. }
            | Self::Synced { handle }
            | Self::Closed { handle }
            | Self::Aborted { handle, .. }
            | Self::Failed { handle, .. } => *handle,
        }
    }
}
