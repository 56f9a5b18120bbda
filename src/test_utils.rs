pub mod test_helpers {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::{Duration, Instant};

    use flume::{Receiver, Sender};

    use crate::raster::{
        DeviceHandle, DisplayHandle, JobSpec, PixelFormat, RasterError, Rasterizer,
        RenderCallbackSink, Resolution, Status,
    };
    use crate::view::{DualViewCoordinator, ViewEvent};

    /// Shared knobs and observations of a [`ScriptedRasterizer`]
    #[derive(Clone)]
    pub struct Script {
        calls: Arc<Mutex<Vec<String>>>,
        runs: Arc<AtomicUsize>,
        short_stride: Arc<AtomicBool>,
        gate: Option<Sender<()>>,
    }

    impl Script {
        /// Let one gated production proceed
        pub fn release(&self) {
            if let Some(gate) = &self.gate {
                let _ = gate.send(());
            }
        }

        /// From now on propose a row stride too short for the width
        pub fn break_stride(&self) {
            self.short_stride.store(true, Ordering::SeqCst);
        }

        pub fn fix_stride(&self) {
            self.short_stride.store(false, Ordering::SeqCst);
        }

        /// Number of productions that got past the gate
        pub fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }

        /// Callbacks issued so far, as `name#run`
        pub fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Pages requested so far, in order
        pub fn produced_pages(&self) -> Vec<u32> {
            self.calls()
                .iter()
                .filter_map(|call| call.strip_prefix("open p"))
                .filter_map(|rest| rest.split('#').next()?.parse().ok())
                .collect()
        }
    }

    /// Rasterizer for tests: white RGB pages, every callback it issues is
    /// logged, optionally waits for [`Script::release`] before each run.
    pub struct ScriptedRasterizer {
        page_count: u32,
        page_size: (f64, f64),
        gate: Option<Receiver<()>>,
        script: Script,
    }

    impl ScriptedRasterizer {
        pub fn new(page_count: u32, page_size: (f64, f64)) -> (Self, Script) {
            Self::build(page_count, page_size, None)
        }

        /// Every production blocks until released
        pub fn gated(page_count: u32, page_size: (f64, f64)) -> (Self, Script) {
            let (tx, rx) = flume::unbounded();
            let (rasterizer, mut script) = Self::build(page_count, page_size, Some(rx));
            // Only the test side holds the sender, so dropping it unblocks the worker.
            script.gate = Some(tx);
            (rasterizer, script)
        }

        fn build(
            page_count: u32,
            page_size: (f64, f64),
            gate: Option<Receiver<()>>,
        ) -> (Self, Script) {
            let script = Script {
                calls: Arc::new(Mutex::new(Vec::new())),
                runs: Arc::new(AtomicUsize::new(0)),
                short_stride: Arc::new(AtomicBool::new(false)),
                gate: None,
            };
            let rasterizer = Self {
                page_count,
                page_size,
                gate,
                script: script.clone(),
            };
            (rasterizer, script)
        }

        fn log(&self, call: String) {
            self.script
                .calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(call);
        }
    }

    fn proceed(status: Status) -> Result<(), RasterError> {
        match status {
            Status::Continue => Ok(()),
            Status::Abort(_) => Err(RasterError::Aborted {
                code: status.code(),
            }),
        }
    }

    impl Rasterizer for ScriptedRasterizer {
        fn open(&mut self, _spec: &JobSpec) -> Result<DeviceHandle, RasterError> {
            Ok(DeviceHandle(99))
        }

        fn produce(
            &mut self,
            device: DeviceHandle,
            handle: DisplayHandle,
            page: u32,
            resolution: Resolution,
            sink: &mut dyn RenderCallbackSink,
        ) -> Result<(), RasterError> {
            if let Some(gate) = &self.gate {
                gate.recv()
                    .map_err(|_| RasterError::device("gate dropped"))?;
            }
            self.script.runs.fetch_add(1, Ordering::SeqCst);
            if page > self.page_count {
                return Err(RasterError::PageOutOfRange {
                    page,
                    page_count: self.page_count,
                });
            }

            let run = handle.run;
            let width = (self.page_size.0 * f64::from(resolution.x)).round() as u32;
            let height = (self.page_size.1 * f64::from(resolution.y)).round() as u32;
            let stride = if self.script.short_stride.load(Ordering::SeqCst) {
                width * 3 - 1
            } else {
                width * 3
            };
            let format = PixelFormat::Rgb24.to_raw();

            self.log(format!("open p{page}#{run}"));
            proceed(sink.on_open(handle, device))?;
            self.log(format!("presize#{run}"));
            proceed(sink.on_presize(handle, device, width, height, stride, format))?;
            let pixels = vec![255u8; stride as usize * height as usize];
            self.log(format!("size#{run}"));
            proceed(sink.on_size(handle, device, width, height, stride, format, &pixels))?;
            self.log(format!("page#{run}"));
            proceed(sink.on_page(handle, device, 1, true))?;
            self.log(format!("preclose#{run}"));
            proceed(sink.on_preclose(handle, device))?;
            self.log(format!("close#{run}"));
            proceed(sink.on_close(handle, device))?;
            Ok(())
        }

        fn close(&mut self, _device: DeviceHandle) {}
    }

    /// Pump the coordinator until `done` holds or `timeout` passes.
    /// Returns every event seen on the way.
    pub fn pump_until(
        coordinator: &mut DualViewCoordinator,
        timeout: Duration,
        mut done: impl FnMut(&DualViewCoordinator) -> bool,
    ) -> Vec<ViewEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();
        while !done(coordinator) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            events.extend(coordinator.wait_events(remaining.min(Duration::from_millis(20))));
        }
        events
    }

    /// Pump until neither view has a production in flight
    pub fn pump_until_idle(coordinator: &mut DualViewCoordinator) -> Vec<ViewEvent> {
        pump_until(coordinator, Duration::from_secs(5), |c| {
            !c.overview().is_busy() && !c.detail().is_busy() && !c.has_pending_refresh()
        })
    }
}
