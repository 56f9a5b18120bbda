//! The rasterizer service seam and a synthetic implementation

use log::{debug, info};

use super::callback::{RenderCallbackSink, Status};
use super::format::{DisplayFormat, PixelFormat};
use super::request::{JobSpec, RasterError};
use super::types::{DeviceHandle, DisplayHandle, Resolution};

/// An external page-description interpreter.
///
/// `produce` drives `sink` through one production run on the calling thread
/// and returns once the run is over. When a callback returns
/// [`Status::Abort`], the run stops immediately and `produce` returns
/// [`RasterError::Aborted`].
pub trait Rasterizer: Send {
    fn open(&mut self, spec: &JobSpec) -> Result<DeviceHandle, RasterError>;

    fn produce(
        &mut self,
        device: DeviceHandle,
        handle: DisplayHandle,
        page: u32,
        resolution: Resolution,
        sink: &mut dyn RenderCallbackSink,
    ) -> Result<(), RasterError>;

    fn close(&mut self, device: DeviceHandle);
}

/// Turn a callback status into an early return
fn proceed(status: Status) -> Result<(), RasterError> {
    match status {
        Status::Continue => Ok(()),
        Status::Abort(_) => Err(RasterError::Aborted {
            code: status.code(),
        }),
    }
}

/// Letter paper, in inches
pub const LETTER: (f64, f64) = (8.5, 11.0);

/// Produces a deterministic test pattern: white paper, a grey half-inch grid
/// and a black bar whose length is a quarter inch per page number.
pub struct SyntheticRasterizer {
    page_count: u32,
    page_size: (f64, f64),
    format: DisplayFormat,
    band_height: u32,
    device: Option<DeviceHandle>,
    next_device: u64,
}

impl SyntheticRasterizer {
    #[must_use]
    pub fn new(page_count: u32, page_size: (f64, f64)) -> Self {
        Self {
            page_count,
            page_size,
            format: DisplayFormat::top_first(PixelFormat::Rgb24),
            band_height: 64,
            device: None,
            next_device: 1,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: DisplayFormat) -> Self {
        self.format = format;
        self
    }

    /// Rows per update hint; 0 disables updates
    #[must_use]
    pub fn with_band_height(mut self, band_height: u32) -> Self {
        self.band_height = band_height;
        self
    }

    /// Width, height and 4-byte aligned row stride, or an error when the
    /// raster cannot be addressed with 32-bit sizes
    fn raster_size(&self, resolution: Resolution) -> Result<(u32, u32, u32), RasterError> {
        let side = |inches: f64, res: f32| {
            let pixels = (inches * f64::from(res)).round().max(1.0);
            if pixels <= f64::from(u32::MAX) {
                Ok(pixels as u32)
            } else {
                Err(RasterError::device(format!(
                    "{pixels} pixels at {resolution:?} do not fit a raster"
                )))
            }
        };
        let width = side(self.page_size.0, resolution.x)?;
        let height = side(self.page_size.1, resolution.y)?;
        let row_stride = width
            .checked_mul(self.format.pixel.bytes_per_pixel() as u32)
            .and_then(|row_bytes| row_bytes.checked_next_multiple_of(4))
            .ok_or_else(|| {
                RasterError::device(format!("row of {width} pixels overflows the stride"))
            })?;
        Ok((width, height, row_stride))
    }

    fn paint(&self, page: u32, resolution: Resolution, width: u32, height: u32, stride: u32) -> Vec<u8> {
        let bpp = self.format.pixel.bytes_per_pixel();
        let mut pixels = vec![0u8; stride as usize * height as usize];

        let grid_x = (resolution.x / 2.0).max(1.0) as u32;
        let grid_y = (resolution.y / 2.0).max(1.0) as u32;
        let bar_len = (f64::from(page) * 0.25 * f64::from(resolution.x)) as u32;
        let bar_top = grid_y / 2;
        let bar_bottom = bar_top + (grid_y / 4).max(1);

        for y in 0..height {
            let row_index = if self.format.bottom_first { height - 1 - y } else { y };
            let row_start = row_index as usize * stride as usize;
            let row = &mut pixels[row_start..row_start + width as usize * bpp];
            for (x, px) in (0u32..).zip(row.chunks_exact_mut(bpp)) {
                let rgb = if y >= bar_top && y < bar_bottom && x < bar_len {
                    [0, 0, 0]
                } else if x % grid_x == 0 || y % grid_y == 0 {
                    [160, 160, 160]
                } else {
                    [255, 255, 255]
                };
                write_pixel(self.format.pixel, px, rgb);
            }
        }
        pixels
    }
}

fn write_pixel(format: PixelFormat, px: &mut [u8], [r, g, b]: [u8; 3]) {
    match format {
        PixelFormat::Gray8 => {
            px[0] = ((u16::from(r) * 54 + u16::from(g) * 183 + u16::from(b) * 19) >> 8) as u8;
        }
        PixelFormat::Rgb24 | PixelFormat::Rgbx32 => px[..3].copy_from_slice(&[r, g, b]),
        PixelFormat::Bgr24 | PixelFormat::Bgrx32 => px[..3].copy_from_slice(&[b, g, r]),
        PixelFormat::Xrgb32 => px[1..4].copy_from_slice(&[r, g, b]),
        PixelFormat::Xbgr32 => px[1..4].copy_from_slice(&[b, g, r]),
        PixelFormat::Cmyk32 => px.copy_from_slice(&[255 - r, 255 - g, 255 - b, 0]),
    }
}

impl Rasterizer for SyntheticRasterizer {
    fn open(&mut self, spec: &JobSpec) -> Result<DeviceHandle, RasterError> {
        if self.page_count == 0 {
            return Err(RasterError::InvalidJob {
                detail: format!("{} has no pages", spec.source.display()),
            });
        }
        let device = DeviceHandle(self.next_device);
        self.next_device += 1;
        self.device = Some(device);
        info!(
            "Opened synthetic job {} ({} pages) as device {}",
            spec.source.display(),
            self.page_count,
            device.0
        );
        Ok(device)
    }

    fn produce(
        &mut self,
        device: DeviceHandle,
        handle: DisplayHandle,
        page: u32,
        resolution: Resolution,
        sink: &mut dyn RenderCallbackSink,
    ) -> Result<(), RasterError> {
        if self.device != Some(device) {
            return Err(RasterError::device(format!("device {} is not open", device.0)));
        }
        if page == 0 || page > self.page_count {
            return Err(RasterError::PageOutOfRange {
                page,
                page_count: self.page_count,
            });
        }
        if !resolution.is_valid() {
            return Err(RasterError::device(format!("bad resolution {resolution:?}")));
        }

        let (width, height, stride) = self.raster_size(resolution)?;
        let format = self.format.to_raw();
        debug!("Producing page {page} of device {} as {width}x{height}", device.0);

        proceed(sink.on_open(handle, device))?;
        proceed(sink.on_presize(handle, device, width, height, stride, format))?;
        let pixels = self.paint(page, resolution, width, height, stride);
        proceed(sink.on_size(handle, device, width, height, stride, format, &pixels))?;

        if self.band_height > 0 {
            let mut y = 0;
            while y < height {
                let band = self.band_height.min(height - y);
                proceed(sink.on_update(handle, device, 0, y as i32, width as i32, band as i32))?;
                y += band;
            }
        }

        proceed(sink.on_page(handle, device, 1, true))?;
        proceed(sink.on_sync(handle, device))?;
        proceed(sink.on_preclose(handle, device))?;
        proceed(sink.on_close(handle, device))?;
        Ok(())
    }

    fn close(&mut self, device: DeviceHandle) {
        if self.device == Some(device) {
            info!("Closed synthetic device {}", device.0);
            self.device = None;
        }
    }
}
