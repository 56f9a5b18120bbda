//! Production worker - runs the rasterizer in its own thread

use flume::{Receiver, Sender};
use log::{debug, error, warn};

use super::rasterizer::Rasterizer;
use super::request::{ProductionRequest, RasterError, SinkEvent};
use super::sink::ChannelSink;
use super::types::{DeviceHandle, DisplayHandle, Resolution};

/// Main worker function - owns the rasterizer until shutdown
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn production_worker(
    mut rasterizer: Box<dyn Rasterizer>,
    device: DeviceHandle,
    max_raster_bytes: u64,
    requests: Receiver<ProductionRequest>,
    events: Sender<SinkEvent>,
) {
    for request in requests.iter() {
        match request {
            ProductionRequest::Produce {
                handle,
                page,
                resolution,
            } => {
                run_production(
                    rasterizer.as_mut(),
                    device,
                    handle,
                    page,
                    resolution,
                    max_raster_bytes,
                    &events,
                );
            }

            ProductionRequest::Shutdown => break,
        }
    }

    debug!("Worker for device {} shutting down", device.0);
    rasterizer.close(device);
}

fn run_production(
    rasterizer: &mut dyn Rasterizer,
    device: DeviceHandle,
    handle: DisplayHandle,
    page: u32,
    resolution: Resolution,
    max_raster_bytes: u64,
    events: &Sender<SinkEvent>,
) {
    let mut sink = ChannelSink::new(handle, page, resolution, max_raster_bytes, events.clone());

    match rasterizer.produce(device, handle, page, resolution, &mut sink) {
        Ok(()) if sink.is_closed() => {}
        Ok(()) => {
            warn!("Production {handle} returned without closing");
            let _ = events.send(SinkEvent::Failed {
                handle,
                error: RasterError::device("producer returned without closing the run"),
            });
        }
        // The sink already reported why it refused.
        Err(RasterError::Aborted { .. }) if sink.is_aborted() => {}
        Err(e) => {
            error!("Production {handle} failed: {e}");
            let _ = events.send(SinkEvent::Failed { handle, error: e });
        }
    }
}
