//! Tracing integration for structured logging and spans.

use crate::backend::DeviceHandle;
use crate::format::PixelFormat;
use tracing::{Level, Span, span};

/// Configuration for tracing behavior.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Create a span per allocate or import request.
    pub allocation_spans: bool,
    /// Create a span per release.
    pub release_spans: bool,
    /// Log every map and unmap.
    pub mapping_events: bool,
    /// Default span level.
    pub level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            allocation_spans: true,
            release_spans: true,
            mapping_events: false, // Hot path for CPU readers
            level: Level::INFO,
        }
    }
}

impl TracingConfig {
    /// Everything enabled.
    pub fn all() -> Self {
        Self {
            allocation_spans: true,
            release_spans: true,
            mapping_events: true,
            level: Level::DEBUG,
        }
    }

    /// Allocation spans only.
    pub fn minimal() -> Self {
        Self {
            allocation_spans: true,
            release_spans: false,
            mapping_events: false,
            level: Level::INFO,
        }
    }

    /// Disable all spans.
    pub fn none() -> Self {
        Self {
            allocation_spans: false,
            release_spans: false,
            mapping_events: false,
            level: Level::INFO,
        }
    }
}

/// Create a span for one allocate or import request.
///
/// # Example
///
/// ```rust,ignore
/// use gralloc_drm::format::PixelFormat;
/// use gralloc_drm::observability::span_allocate;
///
/// let span = span_allocate(PixelFormat::Nv12, 1920, 1080);
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_allocate(format: PixelFormat, width: u32, height: u32) -> Span {
    span!(
        Level::INFO,
        "allocate",
        format = ?format,
        width = width,
        height = height
    )
}

/// Create a span for releasing one buffer object.
#[inline]
pub fn span_release(handle: DeviceHandle) -> Span {
    span!(Level::DEBUG, "release", handle = %handle)
}

/// Log a CPU mapping.
#[inline]
pub fn trace_map(handle: DeviceHandle, size: usize, for_write: bool) {
    tracing::debug!(handle = %handle, size, for_write, "buffer mapped");
}

/// Log a CPU unmapping.
#[inline]
pub fn trace_unmap(handle: DeviceHandle) {
    tracing::debug!(handle = %handle, "buffer unmapped");
}
