//! Camera sensor and blob layouts.
//!
//! Stride is in pixels for RAW16 and in bytes for the packed raw formats;
//! both strides report the same value.

use super::{BufferGeometry, Request};
use crate::error::Result;

/// Camera formats with fixed bit packing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraFormat {
    /// 16 bits per pixel.
    Raw16,
    /// 2 pixels in 3 bytes.
    Raw12,
    /// 4 pixels in 5 bytes.
    Raw10,
    /// One-dimensional byte array.
    Blob,
}

pub(crate) fn camera(req: &Request, format: CameraFormat) -> Result<BufferGeometry> {
    req.require_uncompressed()?;

    let (stride, size) = match format {
        CameraFormat::Raw16 => {
            let stride = req.align(req.w(), 16)?;
            (stride, req.mul(req.mul(stride, req.h())?, 2)?)
        }
        CameraFormat::Raw12 => {
            req.require_width_multiple_of_4()?;
            let stride = req.w() / 2 * 3;
            (stride, req.mul(stride, req.h())?)
        }
        CameraFormat::Raw10 => {
            req.require_width_multiple_of_4()?;
            let stride = req.w() / 4 * 5;
            (stride, req.mul(stride, req.h())?)
        }
        CameraFormat::Blob => {
            if req.height != 1 {
                return Err(req.invalid("blob height must be 1"));
            }
            (0, req.w())
        }
    };

    Ok(req.linear(stride, stride, size, req.height))
}
