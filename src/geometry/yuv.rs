//! YUV layouts: 8-bit 4:2:0 and 4:2:2, and the 10-bit packed and planar
//! variants.

use super::afbc::{self, BlockAlignment, PIXELS_PER_BLOCK};
use super::{BufferGeometry, Request};
use crate::error::Result;
use crate::usage::Usage;

/// Plane alignment preferred by the GPU.
const MALI_PLANE_ALIGN: usize = 128;
/// Plane alignment software components expect.
const ANDROID_PLANE_ALIGN: usize = 16;

/// Compressed layout helper: aligns the grid and sizes the header region.
struct AfbcGrid {
    block: BlockAlignment,
    width: usize,
    height: usize,
}

impl AfbcGrid {
    fn new(req: &Request, height: usize) -> Result<Self> {
        let block = afbc::yuv_block_alignment(req)?;
        Ok(Self {
            width: req.align(req.w(), block.width)?,
            height: req.align(height, block.height)?,
            block,
        })
    }

    fn headers(&self, req: &Request, block_count: usize) -> Result<afbc::AfbcHeaders> {
        afbc::headers(req, block_count, &self.block)
    }

    fn block_count(&self, req: &Request) -> Result<usize> {
        req.mul(
            self.width / PIXELS_PER_BLOCK,
            self.height / PIXELS_PER_BLOCK,
        )
    }
}

/// Extra rows reserved for decoder cropping.
fn padded_height(req: &Request, video_row_padding: bool) -> Result<usize> {
    if video_row_padding {
        req.add(req.h(), PIXELS_PER_BLOCK)
    } else {
        Ok(req.h())
    }
}

// ============================================================================
// 8-bit
// ============================================================================

/// YV12, NV12 and NV21.
pub(crate) fn yuv420_8bit(
    req: &Request,
    usage: Usage,
    video_row_padding: bool,
) -> Result<BufferGeometry> {
    if req.alloc_type.is_afbc() {
        let grid = AfbcGrid::new(req, padded_height(req, video_row_padding)?)?;
        let luma = grid.width;
        let chroma = req.align(luma / 2, 16)?;
        let headers = grid.headers(req, grid.block_count(req)?)?;
        let size = req.add(req.mul(luma + chroma, grid.height)?, headers.body_offset)?;

        return Ok(BufferGeometry {
            pixel_stride: luma,
            byte_stride: luma,
            size,
            internal_width: req.to_u32(grid.width)?,
            internal_height: req.to_u32(grid.height)?,
            afbc: Some(headers),
        });
    }

    let alignment = if usage.has_cpu_access() {
        ANDROID_PLANE_ALIGN
    } else {
        MALI_PLANE_ALIGN
    };

    // 2x2 clumps need an even height; the stride alignment keeps width even.
    let height = req.align(req.h(), 2)?;
    let luma = req.align(req.w(), alignment)?;
    let chroma = req.align(luma / 2, alignment)?;
    let size = req.mul(height, luma + chroma)?;

    Ok(req.linear(luma, luma, size, req.to_u32(height)?))
}

/// Packed YUYV 4:2:2.
pub(crate) fn yuyv422(req: &Request) -> Result<BufferGeometry> {
    req.require_uncompressed()?;
    let pixel_stride = req.align(req.w(), MALI_PLANE_ALIGN)?;
    let byte_stride = req.align(req.mul(req.w(), 2)?, MALI_PLANE_ALIGN)?;
    let size = req.mul(byte_stride, req.h())?;
    Ok(req.linear(pixel_stride, byte_stride, size, req.height))
}

/// 8-bit YUV 4:2:2, compressed only.
pub(crate) fn yuv422_8bit_afbc(req: &Request) -> Result<BufferGeometry> {
    let grid = AfbcGrid::new(req, req.h())?;
    let luma = grid.width;
    let headers = grid.headers(req, grid.block_count(req)?)?;
    // Chroma plane is as large as luma.
    let size = req.add(
        req.mul(req.mul(luma, grid.height)?, 2)?,
        headers.body_offset,
    )?;

    Ok(BufferGeometry {
        pixel_stride: luma,
        byte_stride: luma,
        size,
        internal_width: req.to_u32(grid.width)?,
        internal_height: req.to_u32(grid.height)?,
        afbc: Some(headers),
    })
}

// ============================================================================
// 10-bit
// ============================================================================

/// P010 (`vss == 2`) and P210 (`vss == 1`).
pub(crate) fn px10(req: &Request, vss: usize) -> Result<BufferGeometry> {
    req.require_uncompressed()?;
    req.require_width_multiple_of_4()?;

    let height = if vss == 2 {
        req.align(req.h(), 2)?
    } else {
        req.h()
    };

    let pixel_stride = req.align(req.w(), MALI_PLANE_ALIGN)?;
    let byte_stride = req.align(req.mul(req.w(), 2)?, MALI_PLANE_ALIGN)?;
    let chroma = req.mul(byte_stride, height / vss)?;
    let size = req.add(req.mul(byte_stride, height)?, chroma)?;

    Ok(req.linear(pixel_stride, byte_stride, size, req.to_u32(height)?))
}

/// Y210, packed or compressed as 10-bit 4:2:2 AFBC.
pub(crate) fn y210(req: &Request) -> Result<BufferGeometry> {
    req.require_width_multiple_of_4()?;

    if !req.alloc_type.is_afbc() {
        let pixel_stride = req.align(req.w(), MALI_PLANE_ALIGN)?;
        let byte_stride = req.align(req.mul(req.w(), 4)?, MALI_PLANE_ALIGN)?;
        let size = req.mul(byte_stride, req.h())?;
        return Ok(req.linear(pixel_stride, byte_stride, size, req.height));
    }

    let grid = AfbcGrid::new(req, req.h())?;
    let pixel_stride = req.align(grid.width, 16)?;
    let byte_stride = req.align(req.mul(grid.width, 2)?, 16)?;
    let headers = grid.headers(req, grid.block_count(req)?)?;
    let size = req.add(
        req.mul(req.mul(byte_stride, grid.height)?, 2)?,
        headers.body_offset,
    )?;

    Ok(BufferGeometry {
        pixel_stride,
        byte_stride,
        size,
        internal_width: req.to_u32(grid.width)?,
        internal_height: req.to_u32(grid.height)?,
        afbc: Some(headers),
    })
}

/// Y0L2, packed or compressed as 10-bit 4:2:0 AFBC.
pub(crate) fn y0l2(req: &Request, video_row_padding: bool) -> Result<BufferGeometry> {
    req.require_width_multiple_of_4()?;

    if !req.alloc_type.is_afbc() {
        let height = req.align(req.h(), 2)?;
        let pixel_stride = req.align(req.w(), MALI_PLANE_ALIGN)?;
        // One 8-byte clump covers 2x2 pixels.
        let byte_stride = req.align(req.mul(req.w(), 4)?, MALI_PLANE_ALIGN)?;
        let size = req.mul(byte_stride, height)? / 2;
        return Ok(req.linear(pixel_stride, byte_stride, size, req.to_u32(height)?));
    }

    // Two pixel rows share one body row; a single-row buffer still needs one.
    let internal_height = padded_height(req, video_row_padding)?;
    let grid = AfbcGrid::new(req, internal_height.div_ceil(2))?;
    let stride = req.align(grid.width, 16)?;
    let body_stride = req.align(req.mul(grid.width, 4)?, 16)?;
    let block_count =
        req.mul(grid.width / PIXELS_PER_BLOCK, internal_height)?.div_ceil(PIXELS_PER_BLOCK);
    let headers = grid.headers(req, block_count)?;
    let size = req.add(req.mul(body_stride, grid.height)?, headers.body_offset)?;

    Ok(BufferGeometry {
        pixel_stride: stride,
        byte_stride: stride,
        size,
        internal_width: req.to_u32(grid.width)?,
        internal_height: req.to_u32(req.mul(grid.height, 2)?)?,
        afbc: Some(headers),
    })
}

/// Y410, packed 4:4:4.
pub(crate) fn y410(req: &Request) -> Result<BufferGeometry> {
    req.require_uncompressed()?;
    let pixel_stride = req.align(req.w(), MALI_PLANE_ALIGN)?;
    let byte_stride = req.align(req.mul(req.w(), 4)?, MALI_PLANE_ALIGN)?;
    let size = req.mul(byte_stride, req.h())?;
    Ok(req.linear(pixel_stride, byte_stride, size, req.height))
}
