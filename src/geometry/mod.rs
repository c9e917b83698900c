//! Buffer geometry: stride and size computation per format family.
//!
//! Every supported pixel format belongs to one [`FormatFamily`]. Each family
//! has its own pure function that turns `(width, height, alloc_type, usage)`
//! into a [`BufferGeometry`]. Nothing here allocates device memory, takes a
//! lock or performs I/O, so geometry errors always surface before any device
//! call is made.
//!
//! # Families
//!
//! | Family | Formats | Compression |
//! |--------|---------|-------------|
//! | [`FormatFamily::Rgb`] | RGBA/RGBX/BGRA/RGB/565/FP16/1010102 | all AFBC modes |
//! | [`FormatFamily::Yuv420`] | YV12, NV12, NV21 | AFBC (not padded) |
//! | [`FormatFamily::Yuyv422`] | YUYV | none |
//! | [`FormatFamily::Yuv422Afbc`] | 8-bit YUV 4:2:2 | AFBC only |
//! | [`FormatFamily::Px10`] | P010, P210 | none |
//! | [`FormatFamily::Y210`] | Y210 | AFBC (not padded) |
//! | [`FormatFamily::Y0L2`] | Y0L2 | AFBC (not padded) |
//! | [`FormatFamily::Y410`] | Y410 | none |
//! | [`FormatFamily::Camera`] | RAW16, RAW12, RAW10, BLOB | none |
//! | [`FormatFamily::VendorNv12`] | vendor NV12, NV12 10-bit | none |
//!
//! # Example
//!
//! ```rust,ignore
//! use gralloc_drm::format::{AllocType, PixelFormat};
//! use gralloc_drm::geometry;
//! use gralloc_drm::usage::Usage;
//!
//! let g = geometry::compute(
//!     PixelFormat::Rgba8888,
//!     1920,
//!     1080,
//!     AllocType::Uncompressed,
//!     Usage::empty(),
//! )?;
//! assert_eq!(g.byte_stride, 7680);
//! assert_eq!(g.size, 8_294_400);
//! ```

pub mod afbc;
mod camera;
mod rgb;
mod vendor;
mod yuv;

pub use afbc::{AfbcHeaders, HeaderLayout};
pub use camera::CameraFormat;

use crate::error::{Error, Result};
use crate::format::{AllocType, PixelFormat};
use crate::usage::Usage;

/// Memory layout of one buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferGeometry {
    /// Distance between rows in pixels.
    pub pixel_stride: usize,
    /// Distance between rows in bytes.
    pub byte_stride: usize,
    /// Total allocation size in bytes, AFBC header region included.
    pub size: usize,
    /// Width the buffer is laid out for.
    pub internal_width: u32,
    /// Height the buffer is laid out for.
    pub internal_height: u32,
    /// AFBC header region, for compressed layouts.
    pub afbc: Option<AfbcHeaders>,
}

/// Closed set of layout families.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatFamily {
    /// Linear RGB-like with a fixed number of bytes per pixel.
    Rgb {
        /// Bytes per pixel.
        bytes_per_pixel: usize,
    },
    /// 8-bit YUV 4:2:0, planar or semi-planar.
    Yuv420,
    /// 8-bit packed YUYV 4:2:2.
    Yuyv422,
    /// 8-bit YUV 4:2:2, compressed only.
    Yuv422Afbc,
    /// 10-bit Y-UV in 16-bit containers.
    Px10 {
        /// Vertical chroma subsampling: 2 for 4:2:0, 1 for 4:2:2.
        vertical_subsampling: usize,
    },
    /// 10-bit packed YUYV 4:2:2.
    Y210,
    /// 10-bit packed YUV 4:2:0 clumps.
    Y0L2,
    /// 10-bit packed AVYU 4:4:4.
    Y410,
    /// Camera sensor and blob formats.
    Camera(CameraFormat),
    /// Vendor NV12 whose width is the decoder byte stride.
    VendorNv12 {
        /// 10-bit variant.
        ten_bit: bool,
    },
}

impl FormatFamily {
    /// Family of a base format, `None` if the format must be resolved first.
    pub const fn of(format: PixelFormat) -> Option<Self> {
        use PixelFormat as F;

        let family = match format {
            F::Rgba8888 | F::Rgbx8888 | F::Bgra8888 | F::Rgba1010102 => {
                FormatFamily::Rgb { bytes_per_pixel: 4 }
            }
            F::Rgb888 => FormatFamily::Rgb { bytes_per_pixel: 3 },
            F::Rgb565 => FormatFamily::Rgb { bytes_per_pixel: 2 },
            F::RgbaFp16 => FormatFamily::Rgb { bytes_per_pixel: 8 },
            F::Yv12 | F::Nv12 | F::Nv21 | F::YCrCb420Sp | F::YCbCr420_888 => FormatFamily::Yuv420,
            F::Yuyv422 => FormatFamily::Yuyv422,
            F::Yuv422_8Bit => FormatFamily::Yuv422Afbc,
            F::P010 => FormatFamily::Px10 {
                vertical_subsampling: 2,
            },
            F::P210 => FormatFamily::Px10 {
                vertical_subsampling: 1,
            },
            F::Y210 => FormatFamily::Y210,
            F::Y0L2 => FormatFamily::Y0L2,
            F::Y410 => FormatFamily::Y410,
            F::Raw16 => FormatFamily::Camera(CameraFormat::Raw16),
            F::Raw12 => FormatFamily::Camera(CameraFormat::Raw12),
            F::Raw10 => FormatFamily::Camera(CameraFormat::Raw10),
            F::Blob => FormatFamily::Camera(CameraFormat::Blob),
            F::VendorNv12 => FormatFamily::VendorNv12 { ten_bit: false },
            F::VendorNv12_10 => FormatFamily::VendorNv12 { ten_bit: true },
            F::ImplementationDefined => return None,
        };
        Some(family)
    }
}

/// Compute the geometry of a buffer.
pub fn compute(
    format: PixelFormat,
    width: u32,
    height: u32,
    alloc_type: AllocType,
    usage: Usage,
) -> Result<BufferGeometry> {
    compute_with_row_padding(format, width, height, alloc_type, usage, false)
}

/// Compute the geometry of a buffer, optionally adding one extra block row
/// to compressed YUV 4:2:0 layouts for decoder cropping.
pub fn compute_with_row_padding(
    format: PixelFormat,
    width: u32,
    height: u32,
    alloc_type: AllocType,
    usage: Usage,
    video_row_padding: bool,
) -> Result<BufferGeometry> {
    let req = Request {
        format,
        width,
        height,
        alloc_type,
    };

    if width == 0 || height == 0 {
        return Err(req.invalid("width and height must be non-zero"));
    }

    let family = FormatFamily::of(format)
        .ok_or_else(|| req.unsupported("format must be resolved to a concrete layout first"))?;

    match family {
        FormatFamily::Rgb { bytes_per_pixel } => rgb::rgb(&req, bytes_per_pixel),
        FormatFamily::Yuv420 => yuv::yuv420_8bit(&req, usage, video_row_padding),
        FormatFamily::Yuyv422 => yuv::yuyv422(&req),
        FormatFamily::Yuv422Afbc => yuv::yuv422_8bit_afbc(&req),
        FormatFamily::Px10 {
            vertical_subsampling,
        } => yuv::px10(&req, vertical_subsampling),
        FormatFamily::Y210 => yuv::y210(&req),
        FormatFamily::Y0L2 => yuv::y0l2(&req, video_row_padding),
        FormatFamily::Y410 => yuv::y410(&req),
        FormatFamily::Camera(camera) => camera::camera(&req, camera),
        FormatFamily::VendorNv12 { ten_bit } => vendor::vendor_nv12(&req, ten_bit),
    }
}

// ============================================================================
// Shared arithmetic
// ============================================================================

/// One geometry request, carried through the family functions so that every
/// error names the format and dimensions it came from.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Request {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub alloc_type: AllocType,
}

impl Request {
    #[inline]
    pub fn w(&self) -> usize {
        self.width as usize
    }

    #[inline]
    pub fn h(&self) -> usize {
        self.height as usize
    }

    pub fn invalid(&self, reason: &'static str) -> Error {
        Error::InvalidDimensions {
            format: self.format,
            width: self.width,
            height: self.height,
            reason,
        }
    }

    pub fn unsupported(&self, reason: &'static str) -> Error {
        Error::UnsupportedLayout {
            format: self.format,
            alloc_type: self.alloc_type,
            reason,
        }
    }

    /// Fails unless the layout is uncompressed.
    pub fn require_uncompressed(&self) -> Result<()> {
        if self.alloc_type.is_afbc() {
            return Err(self.unsupported("format has no compressed representation"));
        }
        Ok(())
    }

    /// Fails unless the width is a multiple of 4.
    pub fn require_width_multiple_of_4(&self) -> Result<()> {
        if self.width % 4 != 0 {
            return Err(self.invalid("width must be a multiple of 4"));
        }
        Ok(())
    }

    pub fn mul(&self, a: usize, b: usize) -> Result<usize> {
        a.checked_mul(b)
            .ok_or_else(|| self.invalid("buffer size overflows usize"))
    }

    pub fn add(&self, a: usize, b: usize) -> Result<usize> {
        a.checked_add(b)
            .ok_or_else(|| self.invalid("buffer size overflows usize"))
    }

    pub fn align(&self, value: usize, alignment: usize) -> Result<usize> {
        value
            .checked_next_multiple_of(alignment)
            .ok_or_else(|| self.invalid("buffer size overflows usize"))
    }

    pub fn to_u32(&self, value: usize) -> Result<u32> {
        u32::try_from(value).map_err(|_| self.invalid("internal dimension overflows u32"))
    }

    /// Geometry that keeps the requested dimensions.
    pub fn linear(
        &self,
        pixel_stride: usize,
        byte_stride: usize,
        size: usize,
        internal_height: u32,
    ) -> BufferGeometry {
        BufferGeometry {
            pixel_stride,
            byte_stride,
            size,
            internal_width: self.width,
            internal_height,
            afbc: None,
        }
    }
}
