//! Vendor video-decoder NV12 layouts.
//!
//! For these formats the decoder passes its required byte stride in the
//! width field. The buffer is sized `2 * stride * height` so the decoder can
//! append its own metadata after the image planes. This contract is specific
//! to these two formats.

use super::{BufferGeometry, Request};
use crate::error::Result;

pub(crate) fn vendor_nv12(req: &Request, ten_bit: bool) -> Result<BufferGeometry> {
    req.require_uncompressed()?;

    if ten_bit && (req.width % 2 != 0 || req.height % 2 != 0) {
        return Err(req.invalid("10-bit NV12 needs even width and height"));
    }

    let stride = req.w();
    let size = req.mul(req.mul(stride, req.h())?, 2)?;

    // The 10-bit stride is reported in bytes for both fields.
    Ok(req.linear(stride, stride, size, req.height))
}
