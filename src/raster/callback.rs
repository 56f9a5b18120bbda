//! The callback contract a rasterizer drives while producing a page
//!
//! For one production run the producer calls, in order:
//! `on_open`, then one or more `on_presize` / `on_size` pairs, any number of
//! `on_update`, `on_page` once the page is finished, and finally
//! `on_preclose` and `on_close`. `on_sync` may arrive at any point after
//! `on_open`.
//!
//! Every method returns a [`Status`]. Returning [`Status::Abort`] tells the
//! producer to stop the run; it must not deliver further callbacks for that
//! handle except `on_close`.
//!
//! Callbacks run on the producer's thread. Implementations must return
//! promptly and hand any UI work to the control thread.

use super::types::{DeviceHandle, DisplayHandle, PixelRect};

/// Result of a callback, as seen by the producer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Continue,
    /// Stop the run. A zero code still reports as [`Status::REJECTED`].
    Abort(i32),
}

impl Status {
    /// Code used when the consumer rejects a callback
    pub const REJECTED: i32 = -1;

    #[must_use]
    pub const fn abort() -> Self {
        Self::Abort(Self::REJECTED)
    }

    /// Map a producer status code: 0 continues, anything else aborts
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        if code == 0 {
            Self::Continue
        } else {
            Self::Abort(code)
        }
    }

    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Continue => 0,
            Self::Abort(0) => Self::REJECTED,
            Self::Abort(code) => code,
        }
    }

    #[must_use]
    pub const fn is_abort(self) -> bool {
        matches!(self, Self::Abort(_))
    }
}

/// Lifecycle notifications for one production run.
///
/// All methods default to accepting the event and doing nothing.
#[allow(clippy::too_many_arguments)]
pub trait RenderCallbackSink: Send {
    /// A run begins
    fn on_open(&mut self, _handle: DisplayHandle, _device: DeviceHandle) -> Status {
        Status::Continue
    }

    /// The producer is about to release its buffers
    fn on_preclose(&mut self, _handle: DisplayHandle, _device: DeviceHandle) -> Status {
        Status::Continue
    }

    /// The run is over; `handle` is invalid afterwards
    fn on_close(&mut self, _handle: DisplayHandle, _device: DeviceHandle) -> Status {
        Status::Continue
    }

    /// Proposed geometry before the producer allocates; abort to refuse it
    fn on_presize(
        &mut self,
        _handle: DisplayHandle,
        _device: DeviceHandle,
        _width: u32,
        _height: u32,
        _row_stride: u32,
        _format: u32,
    ) -> Status {
        Status::Continue
    }

    /// Final raster. `buffer` is only valid until this call returns.
    fn on_size(
        &mut self,
        _handle: DisplayHandle,
        _device: DeviceHandle,
        _width: u32,
        _height: u32,
        _row_stride: u32,
        _format: u32,
        _buffer: &[u8],
    ) -> Status {
        Status::Continue
    }

    /// A page finished rendering
    fn on_page(
        &mut self,
        _handle: DisplayHandle,
        _device: DeviceHandle,
        _copies: u32,
        _flush: bool,
    ) -> Status {
        Status::Continue
    }

    /// Region of the raster changed
    fn on_update(
        &mut self,
        _handle: DisplayHandle,
        _device: DeviceHandle,
        _x: i32,
        _y: i32,
        _w: i32,
        _h: i32,
    ) -> Status {
        Status::Continue
    }

    /// Flush any buffered display state
    fn on_sync(&mut self, _handle: DisplayHandle, _device: DeviceHandle) -> Status {
        Status::Continue
    }

    /// Separation component `component` is named `name`
    fn on_separation(
        &mut self,
        _handle: DisplayHandle,
        _device: DeviceHandle,
        _component: u32,
        _name: &str,
        _cmyk: [u16; 4],
    ) -> Status {
        Status::Continue
    }

    /// Producer negotiates band height for banded rendering
    fn on_adjust_band_height(
        &mut self,
        _handle: DisplayHandle,
        _device: DeviceHandle,
        _band_height: u32,
    ) -> Status {
        Status::Continue
    }

    /// Producer asks which rectangle to render next. `None` means none.
    fn on_rectangle_request(
        &mut self,
        _handle: DisplayHandle,
        _device: DeviceHandle,
    ) -> Option<PixelRect> {
        None
    }
}

/// Sink that accepts everything and keeps nothing
#[derive(Debug, Default)]
pub struct NullSink;

impl RenderCallbackSink for NullSink {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::JobId;

    #[test]
    fn status_codes_round_trip() {
        assert_eq!(Status::from_code(0), Status::Continue);
        assert_eq!(Status::from_code(-100).code(), -100);
        assert_eq!(Status::Abort(0).code(), Status::REJECTED);
        assert!(Status::Abort(0).is_abort());
        assert!(Status::abort().is_abort());
        assert!(!Status::Continue.is_abort());
    }

    #[test]
    fn null_sink_accepts_every_event() {
        let mut sink = NullSink;
        let handle = DisplayHandle::new(JobId(0), 1);
        let device = DeviceHandle(7);
        assert_eq!(sink.on_open(handle, device), Status::Continue);
        assert_eq!(
            sink.on_presize(handle, device, 10, 10, 30, 0),
            Status::Continue
        );
        assert_eq!(
            sink.on_size(handle, device, 10, 10, 30, 0, &[]),
            Status::Continue
        );
        assert_eq!(sink.on_adjust_band_height(handle, device, 64), Status::Continue);
        assert_eq!(sink.on_rectangle_request(handle, device), None);
        assert_eq!(sink.on_close(handle, device), Status::Continue);
    }
}
