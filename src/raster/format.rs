//! Pixel formats and the producer's raw format bitmask

/// Raw format bits reported by the producer at presize/size
pub mod raw {
    pub const COLORS_NATIVE: u32 = 1 << 0;
    pub const COLORS_GRAY: u32 = 1 << 1;
    pub const COLORS_RGB: u32 = 1 << 2;
    pub const COLORS_CMYK: u32 = 1 << 3;
    pub const COLORS_SEPARATION: u32 = 1 << 19;
    pub const COLORS_MASK: u32 = 0x8_000f;

    pub const ALPHA_NONE: u32 = 0;
    pub const ALPHA_FIRST: u32 = 1 << 4;
    pub const ALPHA_LAST: u32 = 1 << 5;
    pub const UNUSED_FIRST: u32 = 1 << 6;
    pub const UNUSED_LAST: u32 = 1 << 7;
    pub const ALPHA_MASK: u32 = 0x00f0;

    pub const DEPTH_1: u32 = 1 << 8;
    pub const DEPTH_2: u32 = 1 << 9;
    pub const DEPTH_4: u32 = 1 << 10;
    pub const DEPTH_8: u32 = 1 << 11;
    pub const DEPTH_12: u32 = 1 << 12;
    pub const DEPTH_16: u32 = 1 << 13;
    pub const DEPTH_MASK: u32 = 0xff00;

    pub const BIG_ENDIAN: u32 = 0;
    pub const LITTLE_ENDIAN: u32 = 1 << 16;

    pub const TOP_FIRST: u32 = 0;
    pub const BOTTOM_FIRST: u32 = 1 << 17;
}

/// Pixel layouts the consumer can display
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Gray8,
    Rgb24,
    Bgr24,
    /// RGB followed by an unused byte
    Rgbx32,
    Xrgb32,
    Bgrx32,
    Xbgr32,
    Cmyk32,
}

impl PixelFormat {
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb24 | Self::Bgr24 => 3,
            Self::Rgbx32 | Self::Xrgb32 | Self::Bgrx32 | Self::Xbgr32 | Self::Cmyk32 => 4,
        }
    }

    /// Convert one pixel to RGBA
    #[must_use]
    pub fn to_rgba(self, px: &[u8]) -> [u8; 4] {
        match self {
            Self::Gray8 => [px[0], px[0], px[0], 255],
            Self::Rgb24 | Self::Rgbx32 => [px[0], px[1], px[2], 255],
            Self::Bgr24 | Self::Bgrx32 => [px[2], px[1], px[0], 255],
            Self::Xrgb32 => [px[1], px[2], px[3], 255],
            Self::Xbgr32 => [px[3], px[2], px[1], 255],
            Self::Cmyk32 => {
                let k = u16::from(px[3]);
                let channel = |c: u8| (255 - (u16::from(c) + k).min(255)) as u8;
                [channel(px[0]), channel(px[1]), channel(px[2]), 255]
            }
        }
    }

    /// Encode as a top-first raw format
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        use raw::*;
        match self {
            Self::Gray8 => COLORS_GRAY | DEPTH_8,
            Self::Rgb24 => COLORS_RGB | DEPTH_8 | BIG_ENDIAN,
            Self::Bgr24 => COLORS_RGB | DEPTH_8 | LITTLE_ENDIAN,
            Self::Rgbx32 => COLORS_RGB | DEPTH_8 | UNUSED_LAST | BIG_ENDIAN,
            Self::Xrgb32 => COLORS_RGB | DEPTH_8 | UNUSED_FIRST | BIG_ENDIAN,
            Self::Bgrx32 => COLORS_RGB | DEPTH_8 | UNUSED_FIRST | LITTLE_ENDIAN,
            Self::Xbgr32 => COLORS_RGB | DEPTH_8 | UNUSED_LAST | LITTLE_ENDIAN,
            Self::Cmyk32 => COLORS_CMYK | DEPTH_8,
        }
    }
}

/// A decoded raw format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayFormat {
    pub pixel: PixelFormat,
    pub bottom_first: bool,
}

impl DisplayFormat {
    #[must_use]
    pub const fn top_first(pixel: PixelFormat) -> Self {
        Self {
            pixel,
            bottom_first: false,
        }
    }

    /// Decode a raw format bitmask. Only 8 bit per component layouts are
    /// supported; anything else yields `None`.
    #[must_use]
    pub fn from_raw(bits: u32) -> Option<Self> {
        use raw::*;

        if bits & DEPTH_MASK != DEPTH_8 {
            return None;
        }
        let little = bits & LITTLE_ENDIAN != 0;
        let alpha = bits & ALPHA_MASK;

        let pixel = match (bits & COLORS_MASK, alpha, little) {
            (COLORS_GRAY, ALPHA_NONE, _) => PixelFormat::Gray8,
            (COLORS_RGB, ALPHA_NONE, false) => PixelFormat::Rgb24,
            (COLORS_RGB, ALPHA_NONE, true) => PixelFormat::Bgr24,
            (COLORS_RGB, UNUSED_LAST, false) => PixelFormat::Rgbx32,
            (COLORS_RGB, UNUSED_FIRST, false) => PixelFormat::Xrgb32,
            (COLORS_RGB, UNUSED_FIRST, true) => PixelFormat::Bgrx32,
            (COLORS_RGB, UNUSED_LAST, true) => PixelFormat::Xbgr32,
            (COLORS_CMYK, ALPHA_NONE, false) => PixelFormat::Cmyk32,
            _ => return None,
        };

        Some(Self {
            pixel,
            bottom_first: bits & BOTTOM_FIRST != 0,
        })
    }

    #[must_use]
    pub const fn to_raw(self) -> u32 {
        let row_order = if self.bottom_first {
            raw::BOTTOM_FIRST
        } else {
            raw::TOP_FIRST
        };
        self.pixel.to_raw() | row_order
    }
}
