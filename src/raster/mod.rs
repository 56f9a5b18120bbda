//! Page production: rasterizer back ends, the display callback protocol and
//! one controller per rendering job

mod callback;
mod format;
mod job;
mod rasterizer;
mod request;
mod sink;
mod types;
mod worker;

pub use callback::{NullSink, RenderCallbackSink, Status};
pub use format::{DisplayFormat, PixelFormat, raw};
pub use job::{JobController, JobNotice};
pub use rasterizer::{LETTER, Rasterizer, SyntheticRasterizer};
pub use request::{JobSpec, ProductionRequest, RasterError, SinkEvent};
pub use sink::{ChannelSink, MAX_SEPARATIONS};
pub use types::*;
pub use worker::production_worker;
