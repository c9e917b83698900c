//! Pixel formats, internal formats and allocation types.
//!
//! A request names a [`PixelFormat`] (a HAL or vendor format code). Before
//! any layout is computed the request is resolved to an [`InternalFormat`]:
//! the base format the memory is laid out for, plus optional AFBC modifier
//! bits. The modifier bits together with the usage flags then pick the
//! [`AllocType`] that drives block alignment in the geometry calculator.

use crate::error::{Error, Result};
use crate::usage::Usage;

// ============================================================================
// Pixel formats
// ============================================================================

/// Pixel formats understood by the allocator.
///
/// Discriminants are the raw codes used on the plugin boundary: Android HAL
/// codes, vendor codes `0x15` and `0x17` and ARM internal codes from
/// `0x100`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum PixelFormat {
    // ========================================================================
    // RGB formats
    // ========================================================================
    /// RGBA 8-bit per channel.
    Rgba8888 = 0x1,
    /// RGBX 8-bit per channel, alpha ignored.
    Rgbx8888 = 0x2,
    /// RGB 8-bit per channel, packed (24 bits/pixel).
    Rgb888 = 0x3,
    /// RGB 5-6-5.
    Rgb565 = 0x4,
    /// BGRA 8-bit per channel.
    Bgra8888 = 0x5,
    /// RGBA half float.
    RgbaFp16 = 0x16,
    /// RGBA 10-10-10-2.
    Rgba1010102 = 0x2B,

    // ========================================================================
    // YUV formats
    // ========================================================================
    /// YUV 4:2:0 semi-planar, VU order (NV21).
    YCrCb420Sp = 0x11,
    /// YUV 4:2:2 packed (YUYV).
    Yuyv422 = 0x14,
    /// Flexible YUV 4:2:0; resolved to NV12.
    YCbCr420_888 = 0x23,
    /// YUV 4:2:0 planar, V plane first.
    Yv12 = 0x3231_5659,

    // ========================================================================
    // Vendor video-decoder formats
    // ========================================================================
    /// NV12 whose width field carries the decoder's byte stride.
    VendorNv12 = 0x15,
    /// 10-bit NV12 whose width field carries the decoder's byte stride.
    VendorNv12_10 = 0x17,

    // ========================================================================
    // Camera and opaque formats
    // ========================================================================
    /// 16 bits per pixel raw sensor data.
    Raw16 = 0x20,
    /// Opaque byte blob, `height == 1`.
    Blob = 0x21,
    /// Chosen by the allocator from the usage flags.
    ImplementationDefined = 0x22,
    /// 10-bit packed raw, 4 pixels in 5 bytes.
    Raw10 = 0x25,
    /// 12-bit packed raw, 2 pixels in 3 bytes.
    Raw12 = 0x26,

    // ========================================================================
    // ARM internal formats
    // ========================================================================
    /// YUV 4:2:0 semi-planar, UV order.
    Nv12 = 0x103,
    /// YUV 4:2:0 semi-planar, VU order.
    Nv21 = 0x104,
    /// 8-bit YUV 4:2:2, AFBC only.
    Yuv422_8Bit = 0x105,
    /// 10-bit YUV 4:2:0 packed YUYAAYVYAA clumps.
    Y0L2 = 0x106,
    /// 10-bit Y-UV 4:2:0 in 16-bit containers.
    P010 = 0x107,
    /// 10-bit Y-UV 4:2:2 in 16-bit containers.
    P210 = 0x108,
    /// 10-bit YUYV 4:2:2 packed in 16-bit containers.
    Y210 = 0x109,
    /// 10-bit AVYU 2-10-10-10 4:4:4 packed.
    Y410 = 0x10A,
}

/// Every known format.
pub const ALL_FORMATS: [PixelFormat; 26] = [
    PixelFormat::Rgba8888,
    PixelFormat::Rgbx8888,
    PixelFormat::Rgb888,
    PixelFormat::Rgb565,
    PixelFormat::Bgra8888,
    PixelFormat::RgbaFp16,
    PixelFormat::Rgba1010102,
    PixelFormat::YCrCb420Sp,
    PixelFormat::Yuyv422,
    PixelFormat::YCbCr420_888,
    PixelFormat::Yv12,
    PixelFormat::VendorNv12,
    PixelFormat::VendorNv12_10,
    PixelFormat::Raw16,
    PixelFormat::Blob,
    PixelFormat::ImplementationDefined,
    PixelFormat::Raw10,
    PixelFormat::Raw12,
    PixelFormat::Nv12,
    PixelFormat::Nv21,
    PixelFormat::Yuv422_8Bit,
    PixelFormat::Y0L2,
    PixelFormat::P010,
    PixelFormat::P210,
    PixelFormat::Y210,
    PixelFormat::Y410,
];

impl PixelFormat {
    /// Raw format code.
    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Look a format up by its raw code.
    pub fn from_code(code: u32) -> Result<Self> {
        ALL_FORMATS
            .iter()
            .copied()
            .find(|f| f.code() == code)
            .ok_or(Error::UnknownFormat(code))
    }

    /// True if this format has an AFBC compressed representation.
    pub const fn supports_afbc(self) -> bool {
        matches!(
            self,
            PixelFormat::Rgba8888
                | PixelFormat::Rgbx8888
                | PixelFormat::Rgb888
                | PixelFormat::Rgb565
                | PixelFormat::Bgra8888
                | PixelFormat::Rgba1010102
                | PixelFormat::Yv12
                | PixelFormat::Nv12
                | PixelFormat::Nv21
                | PixelFormat::YCrCb420Sp
                | PixelFormat::Yuv422_8Bit
                | PixelFormat::Y0L2
                | PixelFormat::Y210
        )
    }

    /// True for 8-bit YUV 4:2:0 formats.
    pub const fn is_yuv420_8bit(self) -> bool {
        matches!(
            self,
            PixelFormat::Yv12
                | PixelFormat::Nv12
                | PixelFormat::Nv21
                | PixelFormat::YCrCb420Sp
                | PixelFormat::YCbCr420_888
        )
    }
}

impl TryFrom<u32> for PixelFormat {
    type Error = Error;

    fn try_from(code: u32) -> Result<Self> {
        Self::from_code(code)
    }
}

// ============================================================================
// Internal formats
// ============================================================================

/// AFBC modifier bits carried in the upper half of a 64-bit internal format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AfbcModifiers(u32);

impl AfbcModifiers {
    /// No compression.
    pub const NONE: Self = Self(0);
    /// 16x16 superblocks.
    pub const BASIC: Self = Self(1 << 0);
    /// Split-block mode.
    pub const SPLITBLK: Self = Self(1 << 1);
    /// 32x8 superblocks.
    pub const WIDEBLK: Self = Self(1 << 2);
    /// Tiled header layout.
    pub const TILED_HEADERS: Self = Self(1 << 3);

    /// Raw modifier bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Rebuild from raw bits, dropping unknown ones.
    #[inline]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & 0xF)
    }

    /// True if every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any compression bit is set.
    #[inline]
    pub const fn is_compressed(self) -> bool {
        self.0 != 0
    }
}

impl std::ops::BitOr for AfbcModifiers {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A base layout format plus AFBC modifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InternalFormat {
    /// Format the memory is laid out for.
    pub base: PixelFormat,
    /// Compression modifiers.
    pub modifiers: AfbcModifiers,
}

impl InternalFormat {
    /// Uncompressed internal format.
    pub const fn linear(base: PixelFormat) -> Self {
        Self {
            base,
            modifiers: AfbcModifiers::NONE,
        }
    }

    /// Compressed internal format.
    pub const fn afbc(base: PixelFormat, modifiers: AfbcModifiers) -> Self {
        Self { base, modifiers }
    }

    /// True if the layout is AFBC compressed.
    #[inline]
    pub const fn is_afbc(&self) -> bool {
        self.modifiers.is_compressed()
    }

    /// Pack into the 64-bit representation stored in buffer handles.
    pub const fn to_bits(self) -> u64 {
        ((self.modifiers.bits() as u64) << 32) | self.base.code() as u64
    }

    /// Unpack the 64-bit representation.
    pub fn from_bits(bits: u64) -> Result<Self> {
        let base = PixelFormat::from_code(bits as u32)?;
        let modifiers = AfbcModifiers::from_bits_truncate((bits >> 32) as u32);
        Ok(Self { base, modifiers })
    }

    /// Pick the internal format for a requested format and usage.
    ///
    /// AFBC is only chosen when the vendor usage field asks for it, the base
    /// format can be compressed and neither CPU access nor protection rules
    /// it out.
    pub fn select(format: PixelFormat, usage: Usage) -> Self {
        let base = match format {
            PixelFormat::ImplementationDefined => {
                if usage.bits()
                    & (Usage::HW_VIDEO_ENCODER | Usage::HW_CAMERA_WRITE | Usage::HW_CAMERA_READ)
                    != 0
                {
                    PixelFormat::Nv12
                } else {
                    PixelFormat::Rgba8888
                }
            }
            PixelFormat::YCbCr420_888 => PixelFormat::Nv12,
            PixelFormat::VendorNv12_10 if usage.wants_arm_p010() => PixelFormat::P010,
            other => other,
        };

        if usage.wants_afbc()
            && base.supports_afbc()
            && !usage.has_cpu_access()
            && !usage.is_protected()
        {
            Self::afbc(base, AfbcModifiers::BASIC)
        } else {
            Self::linear(base)
        }
    }
}

// ============================================================================
// Allocation type
// ============================================================================

/// Compression mode of one geometry computation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AllocType {
    /// Linear, uncompressed.
    #[default]
    Uncompressed,
    /// AFBC with 16x16 blocks.
    Afbc,
    /// AFBC with 32x16 pixel alignment.
    AfbcWideBlock,
    /// AFBC with each header row padded to 64 bytes.
    AfbcPadded,
    /// Tiled-header AFBC with 128x128 pixel alignment.
    AfbcTiledBasic,
    /// Tiled-header AFBC with 256x64 pixel alignment.
    AfbcTiledWideBlock,
}

impl AllocType {
    /// Resolve the allocation type from an internal format and usage.
    pub fn resolve(internal: InternalFormat, usage: Usage) -> Result<Self> {
        let m = internal.modifiers;
        if !m.is_compressed() {
            return Ok(AllocType::Uncompressed);
        }

        let alloc_type = if m.contains(AfbcModifiers::TILED_HEADERS) {
            if m.contains(AfbcModifiers::WIDEBLK) {
                AllocType::AfbcTiledWideBlock
            } else if m.contains(AfbcModifiers::BASIC) {
                AllocType::AfbcTiledBasic
            } else {
                // Split-block or a bare tiled bit: no tiled layout exists for it.
                return Err(Error::UnsupportedLayout {
                    format: internal.base,
                    alloc_type: AllocType::AfbcTiledBasic,
                    reason: "tiled headers need basic or wide blocks",
                });
            }
        } else if usage.wants_afbc_padding() {
            AllocType::AfbcPadded
        } else if m.contains(AfbcModifiers::WIDEBLK) {
            AllocType::AfbcWideBlock
        } else {
            AllocType::Afbc
        };

        Ok(alloc_type)
    }

    /// True for every AFBC variant.
    #[inline]
    pub const fn is_afbc(self) -> bool {
        !matches!(self, AllocType::Uncompressed)
    }

    /// True for the tiled-header variants.
    #[inline]
    pub const fn is_tiled(self) -> bool {
        matches!(
            self,
            AllocType::AfbcTiledBasic | AllocType::AfbcTiledWideBlock
        )
    }
}
