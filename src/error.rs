//! Error types for gralloc-drm.

use crate::format::{AllocType, PixelFormat};
use thiserror::Error;

/// Result type alias using gralloc-drm's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for allocation, import and mapping.
#[derive(Error, Debug)]
pub enum Error {
    /// The format has no defined geometry for the requested allocation type.
    #[error("unsupported layout: {format:?} as {alloc_type:?}: {reason}")]
    UnsupportedLayout {
        /// Requested pixel format.
        format: PixelFormat,
        /// Allocation type resolved for the request.
        alloc_type: AllocType,
        /// What made the combination invalid.
        reason: &'static str,
    },

    /// Width or height violates a divisibility or range rule of the format.
    #[error("invalid dimensions {width}x{height} for {format:?}: {reason}")]
    InvalidDimensions {
        /// Requested pixel format.
        format: PixelFormat,
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Which rule was violated.
        reason: &'static str,
    },

    /// The device memory backend refused to create or import an object.
    #[error("backend allocation failed: {0}")]
    BackendAllocationFailed(String),

    /// The buffer could not be mapped into the process address space.
    #[error("map failed: {0}")]
    MapFailed(String),

    /// A raw format code that does not name any known pixel format.
    #[error("unknown pixel format code {0:#x}")]
    UnknownFormat(u32),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}

impl Error {
    /// Returns true for errors detected by the geometry calculator.
    ///
    /// These are raised before any device call, so the failed request left
    /// no device-level side effects behind.
    pub fn is_geometry(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedLayout { .. } | Error::InvalidDimensions { .. }
        )
    }

    /// Short label used as the `reason` metric label.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Error::UnsupportedLayout { .. } => "unsupported_layout",
            Error::InvalidDimensions { .. } => "invalid_dimensions",
            Error::BackendAllocationFailed(_) => "backend",
            Error::MapFailed(_) => "map",
            Error::UnknownFormat(_) => "unknown_format",
            Error::Io(_) => "io",
            Error::System(_) => "system",
        }
    }
}
