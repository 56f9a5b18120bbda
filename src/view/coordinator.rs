//! Overview + detail windows over one document
//!
//! The overview renders the whole page at a low resolution and carries the
//! zoom box; the detail view renders the same page at a high resolution and
//! shows the region under the zoom box. Both jobs report to one event queue
//! that only the control thread drains.

use std::sync::Arc;
use std::time::Duration;

use flume::Receiver;
use log::{debug, info, warn};

use super::viewport::{self, OverlayRect, ViewGeometry};
use crate::error::{SetupError, ViewError};
use crate::raster::{
    JobController, JobId, JobNotice, JobSpec, PixelRect, Point, RasterBuffer, RasterError,
    Rasterizer, Resolution, SinkEvent,
};
use crate::settings::Settings;

/// Which of the two windows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewRole {
    Overview,
    Detail,
}

impl ViewRole {
    #[must_use]
    pub const fn job_id(self) -> JobId {
        match self {
            Self::Overview => JobId(0),
            Self::Detail => JobId(1),
        }
    }

    fn from_job(id: JobId) -> Option<Self> {
        match id.0 {
            0 => Some(Self::Overview),
            1 => Some(Self::Detail),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Detail => "detail",
        }
    }
}

/// Where the pair of views is in loading the current page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    OverviewLoading,
    OverviewReady,
    DetailLoading,
    BothReady,
}

/// Notifications for the host UI
#[derive(Debug, Clone)]
pub enum ViewEvent {
    ImageReady { view: ViewRole, page: u32 },
    Damaged { view: ViewRole, rect: PixelRect },
    Synced { view: ViewRole },
    /// The zoom box moved or changed size
    OverlayChanged(OverlayRect),
    ProductionAborted { view: ViewRole, error: ViewError },
    ProductionFailed { view: ViewRole, error: RasterError },
}

/// Result of a zoom gesture
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomOutcome {
    /// Gesture point in detail pixel space, before the zoom
    pub anchor: Point,
    pub overlay: OverlayRect,
}

/// What the host should blit for one view
#[derive(Clone, Debug)]
pub struct DisplayFrame {
    pub image: Arc<RasterBuffer>,
    /// Top-left of the visible region, in the image's pixel space even when
    /// the image predates the current resolution
    pub origin: Point,
    /// Zoom box, overview only
    pub overlay: Option<OverlayRect>,
}

struct ViewPane {
    job: JobController,
    geometry: ViewGeometry,
    /// A production was wanted while the job was busy
    stale: bool,
}

pub struct DualViewCoordinator {
    /// Indexed by `JobId`
    panes: Vec<ViewPane>,
    page: u32,
    zoom_factor: f64,
    detail_viewport: (u32, u32),
    events: Receiver<SinkEvent>,
}

impl DualViewCoordinator {
    /// Open `spec` on both rasterizers. Nothing is produced until
    /// [`DualViewCoordinator::start`].
    pub fn new(
        spec: &JobSpec,
        overview: Box<dyn Rasterizer>,
        detail: Box<dyn Rasterizer>,
        settings: &Settings,
    ) -> Result<Self, SetupError> {
        settings.validate()?;
        let (event_tx, events) = flume::unbounded();

        let mut panes = Vec::with_capacity(2);
        for (role, rasterizer, resolution) in [
            (ViewRole::Overview, overview, settings.overview_resolution),
            (ViewRole::Detail, detail, settings.detail_resolution),
        ] {
            let geometry = ViewGeometry::new(f64::from(resolution))?;
            let job = JobController::spawn(
                role.job_id(),
                role.name(),
                rasterizer,
                spec,
                Resolution::uniform(resolution),
                settings.max_raster_bytes,
                event_tx.clone(),
            )?;
            panes.push(ViewPane {
                job,
                geometry,
                stale: false,
            });
        }

        Ok(Self {
            panes,
            page: 1,
            zoom_factor: f64::from(settings.zoom_factor),
            detail_viewport: (
                settings.detail_viewport_width,
                settings.detail_viewport_height,
            ),
            events,
        })
    }

    fn pane(&self, role: ViewRole) -> &ViewPane {
        &self.panes[role.job_id().0]
    }

    fn pane_mut(&mut self, role: ViewRole) -> &mut ViewPane {
        &mut self.panes[role.job_id().0]
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub fn overview(&self) -> &JobController {
        &self.pane(ViewRole::Overview).job
    }

    #[must_use]
    pub fn detail(&self) -> &JobController {
        &self.pane(ViewRole::Detail).job
    }

    #[must_use]
    pub fn geometry(&self, role: ViewRole) -> &ViewGeometry {
        &self.pane(role).geometry
    }

    #[must_use]
    pub fn detail_viewport(&self) -> (u32, u32) {
        self.detail_viewport
    }

    /// True while a view waits to redo a production that hit `Busy`
    #[must_use]
    pub fn has_pending_refresh(&self) -> bool {
        self.panes.iter().any(|pane| pane.stale)
    }

    pub fn set_detail_viewport(&mut self, width: u32, height: u32) -> Result<(), ViewError> {
        if width == 0 || height == 0 {
            return Err(ViewError::invalid("viewport", format!("{width}x{height}")));
        }
        self.detail_viewport = (width, height);
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        let overview = &self.pane(ViewRole::Overview).job;
        let detail = &self.pane(ViewRole::Detail).job;
        let overview_current = !overview.is_busy() && self.shows_current_page(ViewRole::Overview);
        let detail_current = !detail.is_busy() && self.shows_current_page(ViewRole::Detail);

        if overview.is_busy() {
            CoordinatorState::OverviewLoading
        } else if !overview_current {
            if overview.last_image().is_none() {
                CoordinatorState::Idle
            } else {
                CoordinatorState::OverviewLoading
            }
        } else if detail.is_busy() {
            CoordinatorState::DetailLoading
        } else if detail_current {
            CoordinatorState::BothReady
        } else {
            CoordinatorState::OverviewReady
        }
    }

    fn shows_current_page(&self, role: ViewRole) -> bool {
        let pane = self.pane(role);
        pane.job.last_image().is_some_and(|image| {
            image.page == self.page
                && (f64::from(image.resolution.x) - pane.geometry.resolution).abs() < 1e-3
        })
    }

    /// Produce the first page in the overview
    pub fn start(&mut self) -> Result<(), ViewError> {
        info!("Starting dual view at page {}", self.page);
        self.request(ViewRole::Overview)
    }

    pub fn next_page(&mut self) -> Result<(), ViewError> {
        self.go_to_page(self.page + 1)
    }

    /// No-op on the first page
    pub fn prev_page(&mut self) -> Result<(), ViewError> {
        if self.page <= 1 {
            return Ok(());
        }
        self.go_to_page(self.page - 1)
    }

    fn go_to_page(&mut self, page: u32) -> Result<(), ViewError> {
        for pane in &mut self.panes {
            pane.job.set_page(page)?;
            pane.geometry.reset_origin();
        }
        self.page = page;
        debug!("Page changed to {page}");
        self.request(ViewRole::Overview)
    }

    /// Start a production of the current page, or remember to once the job
    /// is free again
    fn request(&mut self, role: ViewRole) -> Result<(), ViewError> {
        let page = self.page;
        let pane = self.pane_mut(role);
        let resolution = pane.geometry.resolution as f32;
        pane.job.set_resolution(resolution, resolution)?;
        match pane.job.start_production(page) {
            Ok(_) => {
                pane.stale = false;
                Ok(())
            }
            Err(ViewError::Busy { handle }) => {
                debug!("{} busy with {handle}, refreshing page {page} later", role.name());
                pane.stale = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Pan the zoom box by `(dx, dy)` overview pixels; the detail view
    /// follows so both show the same region.
    pub fn pan(&mut self, dx: f64, dy: f64) -> Result<OverlayRect, ViewError> {
        let mut overview = self.pane(ViewRole::Overview).geometry;
        let mut detail = self.pane(ViewRole::Detail).geometry;

        viewport::translate(&mut overview, dx, dy);
        let target = viewport::map_point_to_other_resolution(overview.origin(), &overview, &detail)?;
        let (detail_dx, detail_dy) = (detail.origin_x - target.x, detail.origin_y - target.y);
        viewport::translate(&mut detail, detail_dx, detail_dy);

        self.pane_mut(ViewRole::Overview).geometry = overview;
        self.pane_mut(ViewRole::Detail).geometry = detail;
        self.overlay_rect()
    }

    /// Zoom the detail view in by the configured factor.
    ///
    /// Both origins go back to the page's top-left corner; the gesture point
    /// is reported but does not anchor the zoom.
    pub fn zoom_in(&mut self, x: f64, y: f64) -> Result<ZoomOutcome, ViewError> {
        let factor = self.zoom_factor;
        self.zoom_at(x, y, |geometry| viewport::zoom_in(geometry, factor))
    }

    /// Zoom the detail view out by the configured factor. Same origin policy
    /// as [`DualViewCoordinator::zoom_in`].
    pub fn zoom_out(&mut self, x: f64, y: f64) -> Result<ZoomOutcome, ViewError> {
        let factor = self.zoom_factor;
        self.zoom_at(x, y, |geometry| viewport::zoom_out(geometry, factor))
    }

    fn zoom_at(
        &mut self,
        x: f64,
        y: f64,
        zoom: impl FnOnce(&mut ViewGeometry) -> Result<(), ViewError>,
    ) -> Result<ZoomOutcome, ViewError> {
        let overview = self.pane(ViewRole::Overview).geometry;
        let mut detail = self.pane(ViewRole::Detail).geometry;

        let anchor = viewport::map_point_to_other_resolution(Point::new(x, y), &overview, &detail)?;
        detail.reset_origin();
        zoom(&mut detail)?;

        self.pane_mut(ViewRole::Overview).geometry.reset_origin();
        self.pane_mut(ViewRole::Detail).geometry = detail;
        info!("Detail zoomed to {} dpi around {anchor:?}", detail.resolution);
        self.request(ViewRole::Detail)?;

        Ok(ZoomOutcome {
            anchor,
            overlay: self.overlay_rect()?,
        })
    }

    /// Render the detail view at `resolution`, keeping the region it shows
    pub fn zoom_to_res(&mut self, resolution: f64) -> Result<(), ViewError> {
        let mut detail = self.pane(ViewRole::Detail).geometry;
        viewport::zoom_to_resolution(&mut detail, resolution)?;
        self.pane_mut(ViewRole::Detail).geometry = detail;
        info!("Detail zoomed to {resolution} dpi");
        self.request(ViewRole::Detail)
    }

    /// Zoom box in overview pixels
    pub fn overlay_rect(&self) -> Result<OverlayRect, ViewError> {
        let (width, height) = self.detail_viewport;
        viewport::visible_region_rect(
            &self.pane(ViewRole::Detail).geometry,
            &self.pane(ViewRole::Overview).geometry,
            f64::from(width),
            f64::from(height),
        )
    }

    /// Latest completed image of `role` plus what the host needs to draw it
    #[must_use]
    pub fn frame(&self, role: ViewRole) -> Option<DisplayFrame> {
        let pane = self.pane(role);
        let image = Arc::clone(pane.job.last_image()?);
        let overlay = match role {
            ViewRole::Overview => self.overlay_rect().ok(),
            ViewRole::Detail => None,
        };
        // Until a pending zoom lands, the image is at its own resolution.
        let geometry = &pane.geometry;
        let origin = Point::new(
            geometry.origin_x * f64::from(image.resolution.x) / geometry.resolution,
            geometry.origin_y * f64::from(image.resolution.y) / geometry.resolution,
        );
        Some(DisplayFrame {
            image,
            origin,
            overlay,
        })
    }

    /// Apply every queued callback event without blocking
    pub fn pump(&mut self) -> Vec<ViewEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            self.dispatch(event, &mut out);
        }
        out
    }

    /// Wait up to `timeout` for the first event, then drain the queue
    pub fn wait_events(&mut self, timeout: Duration) -> Vec<ViewEvent> {
        let mut out = Vec::new();
        if let Ok(event) = self.events.recv_timeout(timeout) {
            self.dispatch(event, &mut out);
            out.extend(self.pump());
        }
        out
    }

    fn dispatch(&mut self, event: SinkEvent, out: &mut Vec<ViewEvent>) {
        let handle = event.handle();
        let Some(role) = ViewRole::from_job(handle.job) else {
            warn!("Dropping event for unknown job {handle}");
            return;
        };

        let Some(notice) = self.pane_mut(role).job.handle_event(event) else {
            return;
        };

        match notice {
            JobNotice::ImageReady { page, image } => {
                self.pane_mut(role).geometry.adopt_page_size(&image);
                out.push(ViewEvent::ImageReady { view: role, page });
                self.after_image(role, page, out);
            }
            JobNotice::Damaged { rect } => out.push(ViewEvent::Damaged { view: role, rect }),
            JobNotice::Synced => out.push(ViewEvent::Synced { view: role }),
            JobNotice::Aborted { error } => {
                out.push(ViewEvent::ProductionAborted { view: role, error });
                self.retry_if_stale(role);
            }
            JobNotice::Failed { error } => {
                out.push(ViewEvent::ProductionFailed { view: role, error });
                self.retry_if_stale(role);
            }
        }
    }

    /// A failed run that was already outdated gets one more try
    fn retry_if_stale(&mut self, role: ViewRole) {
        if !self.pane(role).stale {
            return;
        }
        self.pane_mut(role).stale = false;
        if let Err(e) = self.request(role) {
            warn!("Could not refresh {}: {e}", role.name());
        }
    }

    fn after_image(&mut self, role: ViewRole, page: u32, out: &mut Vec<ViewEvent>) {
        let outdated = page != self.page || self.pane(role).stale;
        let follow_up = match role {
            ViewRole::Overview if outdated => self.request(role),
            // The detail of a new page waits for that page's overview.
            ViewRole::Detail if outdated => {
                if self.shows_current_page(ViewRole::Overview) {
                    self.request(role)
                } else {
                    self.pane_mut(role).stale = false;
                    Ok(())
                }
            }
            // The cheap pass is done; start the expensive one if it is free.
            ViewRole::Overview if self.detail().is_busy() => {
                self.pane_mut(ViewRole::Detail).stale = true;
                Ok(())
            }
            ViewRole::Overview => self.request(ViewRole::Detail),
            ViewRole::Detail => Ok(()),
        };
        if let Err(e) = follow_up {
            warn!("Could not follow up on {} page {page}: {e}", role.name());
        }

        if let Ok(rect) = self.overlay_rect() {
            out.push(ViewEvent::OverlayChanged(rect));
        }
    }
}

impl std::fmt::Debug for DualViewCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualViewCoordinator")
            .field("page", &self.page)
            .field("state", &self.state())
            .field("overview", &self.pane(ViewRole::Overview).geometry)
            .field("detail", &self.pane(ViewRole::Detail).geometry)
            .finish_non_exhaustive()
    }
}
