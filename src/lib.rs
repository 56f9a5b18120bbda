pub mod error;
pub mod panic_handler;
pub mod raster;
pub mod script;
pub mod settings;
pub mod view;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{SetupError, ViewError};
pub use raster::{JobController, JobSpec, RasterError, Rasterizer, SyntheticRasterizer};
pub use settings::Settings;
pub use view::{DualViewCoordinator, ViewEvent, ViewRole};
