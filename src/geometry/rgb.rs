//! Linear RGB-like layouts.

use super::afbc::{self, PIXELS_PER_BLOCK};
use super::{BufferGeometry, Request};
use crate::error::Result;

/// Rows are aligned to the 64-byte bus burst.
const ROW_ALIGNMENT: usize = 64;

pub(crate) fn rgb(req: &Request, bpp: usize) -> Result<BufferGeometry> {
    let Some(block) = afbc::block_alignment(req.alloc_type) else {
        let byte_stride = req.align(req.mul(req.w(), bpp)?, ROW_ALIGNMENT)?;
        let size = req.mul(byte_stride, req.h())?;
        return Ok(req.linear(byte_stride / bpp, byte_stride, size, req.height));
    };

    let w_aligned = req.align(req.w(), block.width)?;
    let h_aligned = req.align(req.h(), block.height)?;
    let byte_stride = req.align(req.mul(w_aligned, bpp)?, ROW_ALIGNMENT)?;

    let block_count = req.mul(w_aligned / PIXELS_PER_BLOCK, h_aligned / PIXELS_PER_BLOCK)?;
    let headers = afbc::headers(req, block_count, &block)?;
    let size = req.add(req.mul(byte_stride, h_aligned)?, headers.body_offset)?;

    Ok(BufferGeometry {
        pixel_stride: byte_stride / bpp,
        byte_stride,
        size,
        internal_width: req.to_u32(w_aligned)?,
        internal_height: req.to_u32(h_aligned)?,
        afbc: Some(headers),
    })
}
