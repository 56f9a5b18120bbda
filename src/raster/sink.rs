//! Callback sink that validates one production run and marshals it to the
//! control thread

use flume::Sender;
use log::{debug, warn};

use super::callback::{RenderCallbackSink, Status};
use super::format::DisplayFormat;
use super::request::SinkEvent;
use super::types::{DeviceHandle, DisplayHandle, PixelRect, RasterBuffer, RasterGeometry, Resolution};

/// Highest number of separation components a run may name
pub const MAX_SEPARATIONS: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Opened,
    Presized {
        geometry: RasterGeometry,
        bottom_first: bool,
    },
    Sized {
        geometry: RasterGeometry,
    },
    PageDone,
    Preclosed,
    Closed,
    Aborted,
}

/// Sink for a single run on the producer's thread.
///
/// It only tracks where the run is in its lifecycle. Every accepted event is
/// forwarded as a [`SinkEvent`]; nothing is forwarded for a callback it
/// rejects.
pub struct ChannelSink {
    handle: DisplayHandle,
    page: u32,
    resolution: Resolution,
    max_raster_bytes: u64,
    phase: Phase,
    /// Stays set after the producer closes an aborted run
    aborted: bool,
    separations: Vec<String>,
    events: Sender<SinkEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(
        handle: DisplayHandle,
        page: u32,
        resolution: Resolution,
        max_raster_bytes: u64,
        events: Sender<SinkEvent>,
    ) -> Self {
        Self {
            handle,
            page,
            resolution,
            max_raster_bytes,
            phase: Phase::Idle,
            aborted: false,
            separations: Vec::new(),
            events,
        }
    }

    /// True once a callback has been refused
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// True once `on_close` was accepted
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    /// Separation names reported during the run, by component index
    #[must_use]
    pub fn separations(&self) -> &[String] {
        &self.separations
    }

    fn emit(&mut self, event: SinkEvent) -> Status {
        if self.events.send(event).is_err() {
            // Nobody is listening anymore; stop the producer.
            self.phase = Phase::Aborted;
            self.aborted = true;
            return Status::abort();
        }
        Status::Continue
    }

    fn reject(&mut self, reason: String) -> Status {
        warn!("Aborting production {}: {reason}", self.handle);
        self.phase = Phase::Aborted;
        self.aborted = true;
        let _ = self.events.send(SinkEvent::Aborted {
            handle: self.handle,
            reason,
        });
        Status::abort()
    }

    /// Common gate: wrong handle or an already aborted run
    fn admit(&mut self, handle: DisplayHandle, event: &str) -> Result<(), Status> {
        if self.phase == Phase::Aborted {
            return Err(Status::abort());
        }
        if handle != self.handle {
            return Err(self.reject(format!(
                "{event} for handle {handle}, expected {}",
                self.handle
            )));
        }
        Ok(())
    }

    fn out_of_order(&mut self, event: &str) -> Status {
        let reason = format!("{event} not allowed in phase {:?}", self.phase);
        self.reject(reason)
    }
}

impl RenderCallbackSink for ChannelSink {
    fn on_open(&mut self, handle: DisplayHandle, _device: DeviceHandle) -> Status {
        if let Err(status) = self.admit(handle, "open") {
            return status;
        }
        if self.phase != Phase::Idle {
            return self.out_of_order("open");
        }
        debug!("open {handle} (page {}, {:?})", self.page, self.resolution);
        self.phase = Phase::Opened;
        self.emit(SinkEvent::Opened { handle })
    }

    fn on_preclose(&mut self, handle: DisplayHandle, _device: DeviceHandle) -> Status {
        if let Err(status) = self.admit(handle, "preclose") {
            return status;
        }
        match self.phase {
            Phase::Opened | Phase::Presized { .. } | Phase::Sized { .. } | Phase::PageDone => {
                self.phase = Phase::Preclosed;
                Status::Continue
            }
            _ => self.out_of_order("preclose"),
        }
    }

    fn on_close(&mut self, handle: DisplayHandle, _device: DeviceHandle) -> Status {
        if handle != self.handle {
            return self.reject(format!("close for handle {handle}, expected {}", self.handle));
        }
        if matches!(self.phase, Phase::Idle | Phase::Closed) {
            return self.out_of_order("close");
        }
        debug!("close {handle}");
        self.phase = Phase::Closed;
        // The run is over either way; a dead receiver changes nothing now.
        let _ = self.events.send(SinkEvent::Closed { handle });
        Status::Continue
    }

    fn on_presize(
        &mut self,
        handle: DisplayHandle,
        _device: DeviceHandle,
        width: u32,
        height: u32,
        row_stride: u32,
        format: u32,
    ) -> Status {
        if let Err(status) = self.admit(handle, "presize") {
            return status;
        }
        if !matches!(
            self.phase,
            Phase::Opened | Phase::Sized { .. } | Phase::PageDone
        ) {
            return self.out_of_order("presize");
        }

        let Some(decoded) = DisplayFormat::from_raw(format) else {
            return self.reject(format!("unsupported raster format {format:#x}"));
        };
        let geometry = RasterGeometry {
            width,
            height,
            row_stride,
            format: decoded.pixel,
        };
        if let Err(reason) = geometry.check() {
            return self.reject(reason);
        }
        if geometry.byte_len() > self.max_raster_bytes {
            return self.reject(format!(
                "raster of {} bytes exceeds limit of {}",
                geometry.byte_len(),
                self.max_raster_bytes
            ));
        }

        debug!("presize {handle}: {width}x{height} stride {row_stride} {:?}", decoded.pixel);
        self.phase = Phase::Presized {
            geometry,
            bottom_first: decoded.bottom_first,
        };
        Status::Continue
    }

    fn on_size(
        &mut self,
        handle: DisplayHandle,
        _device: DeviceHandle,
        width: u32,
        height: u32,
        row_stride: u32,
        format: u32,
        buffer: &[u8],
    ) -> Status {
        if let Err(status) = self.admit(handle, "size") {
            return status;
        }
        let Phase::Presized {
            geometry,
            bottom_first,
        } = self.phase
        else {
            return self.out_of_order("size");
        };

        let proposed = (geometry.width, geometry.height, geometry.row_stride);
        let same_format = DisplayFormat::from_raw(format)
            .is_some_and(|f| f.pixel == geometry.format && f.bottom_first == bottom_first);
        if proposed != (width, height, row_stride) || !same_format {
            return self.reject(format!(
                "size {width}x{height} stride {row_stride} differs from presize {}x{} stride {}",
                geometry.width, geometry.height, geometry.row_stride
            ));
        }

        let copied = match RasterBuffer::copy_from(
            geometry,
            bottom_first,
            buffer,
            self.page,
            self.resolution,
        ) {
            Ok(copied) => copied,
            Err(reason) => return self.reject(reason),
        };

        self.phase = Phase::Sized { geometry };
        self.emit(SinkEvent::Sized {
            handle,
            buffer: Box::new(copied),
        })
    }

    fn on_page(
        &mut self,
        handle: DisplayHandle,
        _device: DeviceHandle,
        copies: u32,
        flush: bool,
    ) -> Status {
        if let Err(status) = self.admit(handle, "page") {
            return status;
        }
        if !matches!(self.phase, Phase::Sized { .. }) {
            return self.out_of_order("page");
        }
        debug!("page {handle}: copies {copies}, flush {flush}");
        self.phase = Phase::PageDone;
        self.emit(SinkEvent::PageReady { handle, copies })
    }

    fn on_update(
        &mut self,
        handle: DisplayHandle,
        _device: DeviceHandle,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
    ) -> Status {
        if let Err(status) = self.admit(handle, "update") {
            return status;
        }
        match self.phase {
            // Nothing to repaint before the raster exists.
            Phase::Presized { .. } => Status::Continue,
            Phase::Sized { geometry } => {
                match PixelRect::clipped(x, y, w, h, geometry.width, geometry.height) {
                    Some(rect) => self.emit(SinkEvent::Updated { handle, rect }),
                    None => Status::Continue,
                }
            }
            _ => self.out_of_order("update"),
        }
    }

    fn on_sync(&mut self, handle: DisplayHandle, _device: DeviceHandle) -> Status {
        if let Err(status) = self.admit(handle, "sync") {
            return status;
        }
        match self.phase {
            Phase::Idle | Phase::Preclosed | Phase::Closed | Phase::Aborted => {
                self.out_of_order("sync")
            }
            _ => self.emit(SinkEvent::Synced { handle }),
        }
    }

    fn on_separation(
        &mut self,
        handle: DisplayHandle,
        _device: DeviceHandle,
        component: u32,
        name: &str,
        cmyk: [u16; 4],
    ) -> Status {
        if let Err(status) = self.admit(handle, "separation") {
            return status;
        }
        if component >= MAX_SEPARATIONS {
            return self.reject(format!(
                "separation component {component} beyond limit of {MAX_SEPARATIONS}"
            ));
        }
        let index = component as usize;
        if self.separations.len() <= index {
            self.separations.resize(index + 1, String::new());
        }
        self.separations[index] = name.to_string();
        debug!("separation {handle}: {component} = {name} {cmyk:?}");
        Status::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::format::PixelFormat;
    use crate::raster::types::JobId;

    const DEVICE: DeviceHandle = DeviceHandle(1);

    fn handle() -> DisplayHandle {
        DisplayHandle::new(JobId(0), 1)
    }

    fn sink() -> (ChannelSink, flume::Receiver<SinkEvent>) {
        let (tx, rx) = flume::unbounded();
        let sink = ChannelSink::new(handle(), 3, Resolution::uniform(72.0), 1 << 20, tx);
        (sink, rx)
    }

    fn rgb() -> u32 {
        PixelFormat::Rgb24.to_raw()
    }

    #[test]
    fn full_run_forwards_events_in_order() {
        let (mut sink, rx) = sink();
        let h = handle();
        assert_eq!(sink.on_open(h, DEVICE), Status::Continue);
        assert_eq!(sink.on_presize(h, DEVICE, 2, 2, 6, rgb()), Status::Continue);
        assert_eq!(
            sink.on_size(h, DEVICE, 2, 2, 6, rgb(), &[9; 12]),
            Status::Continue
        );
        assert_eq!(sink.on_update(h, DEVICE, 0, 0, 2, 1), Status::Continue);
        assert_eq!(sink.on_page(h, DEVICE, 1, true), Status::Continue);
        assert_eq!(sink.on_sync(h, DEVICE), Status::Continue);
        assert_eq!(sink.on_preclose(h, DEVICE), Status::Continue);
        assert_eq!(sink.on_close(h, DEVICE), Status::Continue);
        assert!(sink.is_closed());

        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events[0], SinkEvent::Opened { .. }));
        match &events[1] {
            SinkEvent::Sized { buffer, .. } => {
                assert_eq!(buffer.page, 3);
                assert_eq!(buffer.pixels.len(), 12);
            }
            other => panic!("expected Sized, got {other:?}"),
        }
        assert!(matches!(events[2], SinkEvent::Updated { .. }));
        assert!(matches!(events[3], SinkEvent::PageReady { copies: 1, .. }));
        assert!(matches!(events[4], SinkEvent::Synced { .. }));
        assert!(matches!(events[5], SinkEvent::Closed { .. }));
        assert_eq!(events.len(), 6);
    }

    #[test]
    fn presize_over_limit_aborts_without_forwarding_size() {
        let (mut sink, rx) = sink();
        let h = handle();
        sink.on_open(h, DEVICE);
        let status = sink.on_presize(h, DEVICE, 4096, 4096, 4096 * 3, rgb());
        assert!(status.is_abort());
        assert!(sink.is_aborted());
        // A producer ignoring the abort still gets nothing through.
        assert!(sink.on_size(h, DEVICE, 4096, 4096, 4096 * 3, rgb(), &[]).is_abort());

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], SinkEvent::Aborted { .. }));
    }

    #[test]
    fn presize_with_short_stride_aborts() {
        let (mut sink, _rx) = sink();
        let h = handle();
        sink.on_open(h, DEVICE);
        assert!(sink.on_presize(h, DEVICE, 10, 10, 20, rgb()).is_abort());
    }

    #[test]
    fn presize_with_unknown_format_aborts() {
        let (mut sink, _rx) = sink();
        let h = handle();
        sink.on_open(h, DEVICE);
        assert!(sink.on_presize(h, DEVICE, 10, 10, 30, 0).is_abort());
    }

    #[test]
    fn size_must_match_presize() {
        let (mut sink, rx) = sink();
        let h = handle();
        sink.on_open(h, DEVICE);
        sink.on_presize(h, DEVICE, 2, 2, 6, rgb());
        assert!(sink.on_size(h, DEVICE, 3, 2, 9, rgb(), &[0; 18]).is_abort());
        assert!(
            rx.try_iter()
                .all(|event| !matches!(event, SinkEvent::Sized { .. }))
        );
    }

    #[test]
    fn page_before_size_is_rejected() {
        let (mut sink, _rx) = sink();
        let h = handle();
        sink.on_open(h, DEVICE);
        assert!(sink.on_page(h, DEVICE, 1, false).is_abort());
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let (mut sink, _rx) = sink();
        let other = DisplayHandle::new(JobId(1), 1);
        assert!(sink.on_open(other, DEVICE).is_abort());
    }

    #[test]
    fn update_outside_raster_is_dropped() {
        let (mut sink, rx) = sink();
        let h = handle();
        sink.on_open(h, DEVICE);
        sink.on_presize(h, DEVICE, 2, 2, 6, rgb());
        sink.on_size(h, DEVICE, 2, 2, 6, rgb(), &[0; 12]);
        assert_eq!(sink.on_update(h, DEVICE, 5, 5, 2, 2), Status::Continue);
        assert!(
            rx.try_iter()
                .all(|event| !matches!(event, SinkEvent::Updated { .. }))
        );
    }

    #[test]
    fn close_after_abort_is_still_reported() {
        let (mut sink, rx) = sink();
        let h = handle();
        sink.on_open(h, DEVICE);
        sink.on_presize(h, DEVICE, 10, 10, 1, rgb());
        assert_eq!(sink.on_close(h, DEVICE), Status::Continue);
        assert!(sink.is_closed());
        assert!(sink.is_aborted());
        assert!(matches!(
            rx.try_iter().last(),
            Some(SinkEvent::Closed { .. })
        ));
    }

    #[test]
    fn separations_are_recorded_by_component() {
        let (mut sink, _rx) = sink();
        let h = handle();
        sink.on_open(h, DEVICE);
        sink.on_separation(h, DEVICE, 1, "Spot Red", [0, 65535, 65535, 0]);
        assert_eq!(sink.separations(), &[String::new(), "Spot Red".to_string()]);
    }

    #[test]
    fn separation_index_is_bounded() {
        let (mut sink, rx) = sink();
        let h = handle();
        sink.on_open(h, DEVICE);
        assert_eq!(
            sink.on_separation(h, DEVICE, MAX_SEPARATIONS - 1, "Last", [0; 4]),
            Status::Continue
        );
        assert!(
            sink.on_separation(h, DEVICE, 10_000_000, "Spot", [0; 4])
                .is_abort()
        );
        assert_eq!(sink.separations().len(), MAX_SEPARATIONS as usize);
        assert!(matches!(
            rx.try_iter().last(),
            Some(SinkEvent::Aborted { .. })
        ));
    }

    #[test]
    fn dropped_receiver_stops_the_producer() {
        let (mut sink, rx) = sink();
        drop(rx);
        assert!(sink.on_open(handle(), DEVICE).is_abort());
    }
}
