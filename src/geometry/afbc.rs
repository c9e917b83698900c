//! AFBC block alignment, header region sizing and header prefill.
//!
//! An AFBC buffer starts with a header region holding one 16-byte entry per
//! 16x16 pixel block, followed by the compressed body. The header region is
//! aligned to 1024 bytes (4096 for tiled-header modes) and the block grid is
//! aligned per [`AllocType`].

use super::Request;
use crate::error::Result;
use crate::format::{AllocType, PixelFormat};

/// Pixels per block edge used for header accounting.
pub const PIXELS_PER_BLOCK: usize = 16;
/// Bytes of one header entry.
pub const HEADER_BYTES_PER_BLOCK: usize = 16;
/// Header region alignment for non-tiled modes.
pub const HEADER_ALIGNMENT: usize = 1024;
/// Header region alignment for tiled-header modes.
pub const TILED_HEADER_ALIGNMENT: usize = 4 * HEADER_ALIGNMENT;

/// Header region of a compressed buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AfbcHeaders {
    /// Number of header entries.
    pub block_count: usize,
    /// Aligned header region size; the body starts here.
    pub body_offset: usize,
}

/// Pixel alignment and header alignment of one AFBC mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BlockAlignment {
    pub width: usize,
    pub height: usize,
    pub header_alignment: usize,
}

/// Block alignment for `alloc_type`, `None` when uncompressed.
pub(crate) const fn block_alignment(alloc_type: AllocType) -> Option<BlockAlignment> {
    let (width, height, header_alignment) = match alloc_type {
        AllocType::Uncompressed => return None,
        AllocType::Afbc => (16, 16, HEADER_ALIGNMENT),
        AllocType::AfbcWideBlock => (32, 16, HEADER_ALIGNMENT),
        AllocType::AfbcPadded => (64, 16, HEADER_ALIGNMENT),
        AllocType::AfbcTiledBasic => (128, 128, TILED_HEADER_ALIGNMENT),
        AllocType::AfbcTiledWideBlock => (256, 64, TILED_HEADER_ALIGNMENT),
    };
    Some(BlockAlignment {
        width,
        height,
        header_alignment,
    })
}

/// Block alignment for a YUV layout: compressed only, padding not allowed.
pub(crate) fn yuv_block_alignment(req: &Request) -> Result<BlockAlignment> {
    match req.alloc_type {
        AllocType::Uncompressed => Err(req.unsupported("format must be AFBC compressed")),
        AllocType::AfbcPadded => Err(req.unsupported("AFBC header row padding is RGB only")),
        other => block_alignment(other).ok_or_else(|| req.unsupported("no AFBC block alignment")),
    }
}

/// Header region for `block_count` blocks.
pub(crate) fn headers(
    req: &Request,
    block_count: usize,
    alignment: &BlockAlignment,
) -> Result<AfbcHeaders> {
    let bytes = req.mul(block_count, HEADER_BYTES_PER_BLOCK)?;
    let body_offset = req.align(bytes, alignment.header_alignment)?;
    Ok(AfbcHeaders {
        block_count,
        body_offset,
    })
}

// ============================================================================
// Header prefill
// ============================================================================

/// Header entry pattern for an all-empty buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderLayout {
    /// RGB-like single plane.
    Rgb,
    /// 8-bit YUV 4:2:0.
    Yuv420,
}

impl HeaderLayout {
    /// Layout used for a base format.
    pub const fn for_format(base: PixelFormat) -> Self {
        if base.is_yuv420_8bit() {
            HeaderLayout::Yuv420
        } else {
            HeaderLayout::Rgb
        }
    }

    fn entry(self, body_offset: u32) -> [u32; 4] {
        match self {
            HeaderLayout::Rgb => [body_offset, 0x1, 0x0, 0x0],
            HeaderLayout::Yuv420 => [
                body_offset.wrapping_add(1 << 28),
                0x0020_0040,
                0x4000,
                0x80,
            ],
        }
    }
}

/// Write one "empty block" header per block at the start of `buf`.
///
/// Stops early if `buf` is shorter than the header region. Returns the
/// number of entries written.
pub fn write_empty_headers(buf: &mut [u8], base: PixelFormat, headers: &AfbcHeaders) -> usize {
    // Entries hold a 32-bit offset; larger regions keep the low bits.
    let entry = HeaderLayout::for_format(base).entry(headers.body_offset as u32);

    let mut bytes = [0u8; HEADER_BYTES_PER_BLOCK];
    for (chunk, word) in bytes.chunks_exact_mut(4).zip(entry) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }

    let mut written = 0;
    for slot in buf
        .chunks_exact_mut(HEADER_BYTES_PER_BLOCK)
        .take(headers.block_count)
    {
        slot.copy_from_slice(&bytes);
        written += 1;
    }
    written
}
