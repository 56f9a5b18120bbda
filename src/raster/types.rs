//! Core types for produced rasters

use std::sync::Arc;

use image::RgbaImage;

use super::format::PixelFormat;

/// Identifies one production run.
///
/// `job` is the arena index of the owning JobController, `run` increments
/// every time that controller starts a production. A handle is never reused
/// for two overlapping runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DisplayHandle {
    pub job: JobId,
    pub run: u32,
}

impl DisplayHandle {
    #[must_use]
    pub const fn new(job: JobId, run: u32) -> Self {
        Self { job, run }
    }
}

impl std::fmt::Display for DisplayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.job.0, self.run)
    }
}

/// Opaque rasterizer device instance, returned by `Rasterizer::open`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// Arena index of a JobController
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobId(pub usize);

/// Horizontal and vertical resolution in pixels per inch
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolution {
    pub x: f32,
    pub y: f32,
}

impl Resolution {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub const fn uniform(res: f32) -> Self {
        Self { x: res, y: res }
    }

    /// Both axes finite and strictly positive
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.x > 0.0 && self.y > 0.0
    }
}

/// A point in some view's pixel space
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Integer pixel rectangle, used for damage regions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Clip a signed producer rectangle to a `width` x `height` raster.
    /// Returns `None` when nothing of it is visible.
    #[must_use]
    pub fn clipped(x: i32, y: i32, w: i32, h: i32, width: u32, height: u32) -> Option<Self> {
        let x0 = i64::from(x).clamp(0, i64::from(width));
        let y0 = i64::from(y).clamp(0, i64::from(height));
        let x1 = (i64::from(x) + i64::from(w)).clamp(0, i64::from(width));
        let y1 = (i64::from(y) + i64::from(h)).clamp(0, i64::from(height));
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

/// Geometry proposed at presize and confirmed at size
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterGeometry {
    pub width: u32,
    pub height: u32,
    pub row_stride: u32,
    pub format: PixelFormat,
}

impl RasterGeometry {
    /// Bytes needed to hold the whole raster
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        u64::from(self.row_stride) * u64::from(self.height)
    }

    /// Validate the `width * bytes_per_pixel <= row_stride` invariant
    pub fn check(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("empty raster {}x{}", self.width, self.height));
        }
        let row_bytes = u64::from(self.width) * self.format.bytes_per_pixel() as u64;
        if row_bytes > u64::from(self.row_stride) {
            return Err(format!(
                "row stride {} shorter than {} bytes of pixels",
                self.row_stride, row_bytes
            ));
        }
        Ok(())
    }
}

/// One completed page raster, copied out of the producer's memory.
///
/// Rows are always stored top-first with the producer's row stride.
#[derive(Clone)]
pub struct RasterBuffer {
    pub width: u32,
    pub height: u32,
    pub row_stride: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
    /// Page this raster belongs to (1-based)
    pub page: u32,
    /// Resolution the raster was produced at
    pub resolution: Resolution,
}

impl std::fmt::Debug for RasterBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("row_stride", &self.row_stride)
            .field("format", &self.format)
            .field("page", &self.page)
            .field("resolution", &self.resolution)
            .field("pixels_len", &self.pixels.len())
            .finish()
    }
}

impl RasterBuffer {
    /// Copy a producer buffer. `bottom_first` rasters get their rows flipped.
    pub fn copy_from(
        geometry: RasterGeometry,
        bottom_first: bool,
        source: &[u8],
        page: u32,
        resolution: Resolution,
    ) -> Result<Self, String> {
        geometry.check()?;
        let stride = geometry.row_stride as usize;
        let height = geometry.height as usize;
        let needed = stride * height;
        if source.len() < needed {
            return Err(format!(
                "buffer holds {} bytes, geometry needs {}",
                source.len(),
                needed
            ));
        }

        let pixels = if bottom_first {
            let mut out = Vec::with_capacity(needed);
            for row in source[..needed].chunks_exact(stride).rev() {
                out.extend_from_slice(row);
            }
            out
        } else {
            source[..needed].to_vec()
        };

        Ok(Self {
            width: geometry.width,
            height: geometry.height,
            row_stride: geometry.row_stride,
            format: geometry.format,
            pixels,
            page,
            resolution,
        })
    }

    #[must_use]
    pub fn geometry(&self) -> RasterGeometry {
        RasterGeometry {
            width: self.width,
            height: self.height,
            row_stride: self.row_stride,
            format: self.format,
        }
    }

    /// Packed pixel bytes of row `y`, without stride padding
    #[must_use]
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.row_stride as usize;
        let len = self.width as usize * self.format.bytes_per_pixel();
        self.pixels.get(start..start + len)
    }

    /// Native page size (at resolution 1) implied by this raster
    #[must_use]
    pub fn base_size(&self) -> (f64, f64) {
        (
            f64::from(self.width) / f64::from(self.resolution.x),
            f64::from(self.height) / f64::from(self.resolution.y),
        )
    }

    /// Convert to RGBA for blitting by the host
    #[must_use]
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            let row = self.row(y)?;
            for px in row.chunks_exact(self.format.bytes_per_pixel()) {
                out.extend_from_slice(&self.format.to_rgba(px));
            }
        }
        RgbaImage::from_raw(self.width, self.height, out)
    }
}

/// Metadata of the job a DisplayState belongs to
#[derive(Clone, Debug)]
pub struct JobState {
    /// Current page (1-based)
    pub page: u32,
    pub resolution: Resolution,
    pub busy: bool,
    pub last_image: Option<Arc<RasterBuffer>>,
}

impl JobState {
    #[must_use]
    pub fn new(resolution: Resolution) -> Self {
        Self {
            page: 1,
            resolution,
            busy: false,
            last_image: None,
        }
    }
}
