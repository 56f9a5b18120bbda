//! One rasterization job: a document, a resolution and a current page

use std::sync::Arc;

use flume::Sender;
use log::{debug, info, warn};

use super::rasterizer::Rasterizer;
use super::request::{JobSpec, ProductionRequest, RasterError, SinkEvent};
use super::types::{
    DeviceHandle, DisplayHandle, JobId, JobState, PixelRect, RasterBuffer, Resolution,
};
use super::worker::production_worker;
use crate::error::ViewError;

/// What a controller reports after applying a callback event
#[derive(Debug, Clone)]
pub enum JobNotice {
    /// A page completed; `image` is now the controller's last image
    ImageReady { page: u32, image: Arc<RasterBuffer> },
    /// Repaint hint for the run in flight
    Damaged { rect: PixelRect },
    Synced,
    /// The sink refused a callback; the previous image stays current
    Aborted { error: ViewError },
    /// The rasterizer gave up; the previous image stays current
    Failed { error: RasterError },
}

/// Drives a rasterizer worker and keeps the job's state.
///
/// All methods run on the control thread. Callback traffic reaches the
/// controller only through [`JobController::handle_event`].
pub struct JobController {
    id: JobId,
    name: String,
    state: JobState,
    device: DeviceHandle,
    next_run: u32,
    /// Run whose page has not been delivered yet
    active: Option<DisplayHandle>,
    /// Run that delivered its page but has not closed yet
    finishing: Option<DisplayHandle>,
    pending: Option<Box<RasterBuffer>>,
    request_tx: Sender<ProductionRequest>,
}

impl JobController {
    /// Open `spec` on `rasterizer` and move it into a worker thread.
    /// Callback events for this job are delivered to `events`.
    pub fn spawn(
        id: JobId,
        name: impl Into<String>,
        mut rasterizer: Box<dyn Rasterizer>,
        spec: &JobSpec,
        resolution: Resolution,
        max_raster_bytes: u64,
        events: Sender<SinkEvent>,
    ) -> Result<Self, RasterError> {
        if !resolution.is_valid() {
            return Err(RasterError::InvalidJob {
                detail: format!("bad initial resolution {resolution:?}"),
            });
        }
        let name = name.into();
        let device = rasterizer.open(spec)?;
        let (request_tx, request_rx) = flume::unbounded();

        std::thread::Builder::new()
            .name(format!("raster-{name}"))
            .spawn(move || {
                production_worker(rasterizer, device, max_raster_bytes, request_rx, events);
            })
            .map_err(|e| RasterError::device(format!("cannot spawn worker: {e}")))?;

        info!("Job {name} opened on device {} at {resolution:?}", device.0);

        Ok(Self {
            id,
            name,
            state: JobState::new(resolution),
            device,
            next_run: 0,
            active: None,
            finishing: None,
            pending: None,
            request_tx,
        })
    }

    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> &JobState {
        &self.state
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.state.page
    }

    #[must_use]
    pub fn resolution(&self) -> Resolution {
        self.state.resolution
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.state.busy
    }

    #[must_use]
    pub fn last_image(&self) -> Option<&Arc<RasterBuffer>> {
        self.state.last_image.as_ref()
    }

    /// Handle of the run in flight, if any
    #[must_use]
    pub fn active_handle(&self) -> Option<DisplayHandle> {
        self.active
    }

    /// Change the target page. Does not start a production.
    pub fn set_page(&mut self, page: u32) -> Result<(), ViewError> {
        if page < 1 {
            return Err(ViewError::invalid("page", page));
        }
        self.state.page = page;
        Ok(())
    }

    /// Resolution used by the next production
    pub fn set_resolution(&mut self, x: f32, y: f32) -> Result<(), ViewError> {
        let resolution = Resolution::new(x, y);
        if !resolution.is_valid() {
            return Err(ViewError::invalid("resolution", format!("{x}x{y}")));
        }
        self.state.resolution = resolution;
        Ok(())
    }

    /// Ask the worker to produce `page` at the current resolution.
    ///
    /// Returns immediately. A request while a run is in flight is rejected
    /// with [`ViewError::Busy`] and changes nothing.
    pub fn start_production(&mut self, page: u32) -> Result<DisplayHandle, ViewError> {
        if let Some(handle) = self.active {
            debug!("Job {}: rejecting production of page {page}, {handle} in flight", self.name);
            return Err(ViewError::Busy { handle });
        }
        if page < 1 {
            return Err(ViewError::invalid("page", page));
        }

        let handle = DisplayHandle::new(self.id, self.next_run + 1);
        let request = ProductionRequest::Produce {
            handle,
            page,
            resolution: self.state.resolution,
        };
        if self.request_tx.send(request).is_err() {
            return Err(ViewError::AbortedProduction {
                handle,
                reason: "rasterizer worker is gone".to_string(),
            });
        }

        self.next_run += 1;
        self.state.page = page;
        self.state.busy = true;
        self.active = Some(handle);
        self.pending = None;
        info!(
            "Job {}: producing page {page} at {:?} as {handle}",
            self.name, self.state.resolution
        );
        Ok(handle)
    }

    /// Apply one marshaled callback event
    pub fn handle_event(&mut self, event: SinkEvent) -> Option<JobNotice> {
        let handle = event.handle();
        if self.active != Some(handle) {
            if self.finishing == Some(handle) {
                return self.handle_finishing(event);
            }
            debug!("Job {}: ignoring event for stale run {handle}", self.name);
            return None;
        }

        match event {
            SinkEvent::Opened { .. } => None,

            SinkEvent::Sized { buffer, .. } => {
                self.pending = Some(buffer);
                None
            }

            SinkEvent::Updated { rect, .. } => Some(JobNotice::Damaged { rect }),

            SinkEvent::Synced { .. } => Some(JobNotice::Synced),

            SinkEvent::PageReady { copies, .. } => {
                let Some(buffer) = self.pending.take() else {
                    return Some(self.end_run(
                        handle,
                        JobNotice::Failed {
                            error: RasterError::device("page delivered without a raster"),
                        },
                    ));
                };
                let image = Arc::new(*buffer);
                let page = image.page;
                self.state.last_image = Some(Arc::clone(&image));
                self.state.busy = false;
                self.active = None;
                self.finishing = Some(handle);
                info!("Job {}: page {page} ready ({copies} copies) from {handle}", self.name);
                Some(JobNotice::ImageReady { page, image })
            }

            SinkEvent::Closed { .. } => Some(self.end_run(
                handle,
                JobNotice::Failed {
                    error: RasterError::device("run closed before a page was produced"),
                },
            )),

            SinkEvent::Aborted { reason, .. } => Some(self.end_run(
                handle,
                JobNotice::Aborted {
                    error: ViewError::AbortedProduction { handle, reason },
                },
            )),

            SinkEvent::Failed { error, .. } => {
                Some(self.end_run(handle, JobNotice::Failed { error }))
            }
        }
    }

    /// Events after the page was delivered only matter for bookkeeping
    fn handle_finishing(&mut self, event: SinkEvent) -> Option<JobNotice> {
        match event {
            SinkEvent::Synced { .. } => Some(JobNotice::Synced),
            SinkEvent::Closed { .. } | SinkEvent::Aborted { .. } | SinkEvent::Failed { .. } => {
                self.finishing = None;
                None
            }
            _ => None,
        }
    }

    /// Terminate the run in flight without touching the last image
    fn end_run(&mut self, handle: DisplayHandle, notice: JobNotice) -> JobNotice {
        warn!("Job {}: run {handle} ended without a page: {notice:?}", self.name);
        self.state.busy = false;
        self.active = None;
        self.pending = None;
        notice
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        let _ = self.request_tx.send(ProductionRequest::Shutdown);
    }
}

impl std::fmt::Debug for JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("device", &self.device)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use flume::Receiver;

    use super::*;
    use crate::raster::rasterizer::SyntheticRasterizer;
    use crate::test_utils::test_helpers::ScriptedRasterizer;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn controller(
        rasterizer: impl Rasterizer + 'static,
        resolution: f32,
    ) -> (JobController, Receiver<SinkEvent>) {
        let (tx, rx) = flume::unbounded();
        let job = JobController::spawn(
            JobId(0),
            "test",
            Box::new(rasterizer),
            &JobSpec::new("doc"),
            Resolution::uniform(resolution),
            64 << 20,
            tx,
        )
        .unwrap();
        (job, rx)
    }

    /// Feed events until the run in flight ends
    fn drive(job: &mut JobController, rx: &Receiver<SinkEvent>) -> Vec<JobNotice> {
        let mut notices = Vec::new();
        while job.is_busy() {
            let event = rx.recv_timeout(TIMEOUT).expect("worker stalled");
            notices.extend(job.handle_event(event));
        }
        notices
    }

    #[test]
    fn set_resolution_rejects_non_positive_values() {
        let (mut job, _rx) = controller(SyntheticRasterizer::new(1, (1.0, 1.0)), 72.0);
        assert!(matches!(
            job.set_resolution(0.0, 72.0),
            Err(ViewError::InvalidParameter { .. })
        ));
        assert!(job.set_resolution(-1.0, -1.0).is_err());
        assert_eq!(job.resolution(), Resolution::uniform(72.0));

        job.set_resolution(150.0, 100.0).unwrap();
        assert_eq!(job.resolution(), Resolution::new(150.0, 100.0));
    }

    #[test]
    fn set_page_rejects_zero_and_does_not_produce() {
        let (mut job, rx) = controller(SyntheticRasterizer::new(3, (1.0, 1.0)), 72.0);
        assert!(job.set_page(0).is_err());
        job.set_page(3).unwrap();
        assert_eq!(job.page(), 3);
        assert!(!job.is_busy());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn production_stores_last_image_and_clears_busy() {
        let (mut job, rx) = controller(SyntheticRasterizer::new(2, (1.0, 2.0)), 20.0);
        job.start_production(2).unwrap();
        assert!(job.is_busy());

        let notices = drive(&mut job, &rx);
        assert!(notices.iter().any(|n| matches!(n, JobNotice::Damaged { .. })));
        let Some(JobNotice::ImageReady { page, image }) = notices
            .iter()
            .find(|n| matches!(n, JobNotice::ImageReady { .. }))
            .cloned()
        else {
            panic!("no image: {notices:?}");
        };
        assert_eq!(page, 2);
        assert_eq!((image.width, image.height), (20, 40));
        assert!(!job.is_busy());
        assert_eq!(job.last_image().unwrap().page, 2);
    }

    #[test]
    fn start_while_busy_is_rejected_without_side_effects() {
        let (rasterizer, script) = ScriptedRasterizer::gated(2, (1.0, 1.0));
        let (mut job, rx) = controller(rasterizer, 10.0);

        let first = job.start_production(1).unwrap();
        assert_eq!(
            job.start_production(2),
            Err(ViewError::Busy { handle: first })
        );
        assert_eq!(job.page(), 1);
        assert!(job.last_image().is_none());

        script.release();
        drive(&mut job, &rx);
        assert_eq!(script.runs(), 1);
        assert_eq!(job.last_image().unwrap().page, 1);
    }

    #[test]
    fn presize_abort_keeps_previous_image() {
        let (rasterizer, script) = ScriptedRasterizer::new(2, (1.0, 1.0));
        let (mut job, rx) = controller(rasterizer, 10.0);

        job.start_production(1).unwrap();
        drive(&mut job, &rx);
        let before = Arc::clone(job.last_image().unwrap());

        script.break_stride();
        job.start_production(2).unwrap();
        let notices = drive(&mut job, &rx);

        assert!(!job.is_busy());
        assert!(Arc::ptr_eq(job.last_image().unwrap(), &before));
        assert!(matches!(
            notices.last(),
            Some(JobNotice::Aborted {
                error: ViewError::AbortedProduction { .. }
            })
        ));
        assert!(!script.calls().iter().any(|call| call == "size#2"));
    }

    #[test]
    fn rasterizer_failure_clears_busy() {
        let (mut job, rx) = controller(SyntheticRasterizer::new(1, (1.0, 1.0)), 10.0);
        job.start_production(4).unwrap();
        let notices = drive(&mut job, &rx);
        assert!(matches!(
            notices.as_slice(),
            [JobNotice::Failed {
                error: RasterError::PageOutOfRange { page: 4, .. }
            }]
        ));
        assert!(job.last_image().is_none());
    }

    #[test]
    fn stale_events_are_ignored() {
        let (mut job, _rx) = controller(SyntheticRasterizer::new(1, (1.0, 1.0)), 10.0);
        let stale = DisplayHandle::new(JobId(0), 42);
        assert!(job.handle_event(SinkEvent::Closed { handle: stale }).is_none());
        assert!(
            job.handle_event(SinkEvent::Aborted {
                handle: stale,
                reason: "x".into()
            })
            .is_none()
        );
        assert!(!job.is_busy());
    }

    #[test]
    fn consecutive_runs_get_distinct_handles() {
        let (mut job, rx) = controller(SyntheticRasterizer::new(1, (1.0, 1.0)), 10.0);
        let first = job.start_production(1).unwrap();
        drive(&mut job, &rx);
        let second = job.start_production(1).unwrap();
        assert_ne!(first, second);
        assert_eq!(second.job, job.id());
    }
}
