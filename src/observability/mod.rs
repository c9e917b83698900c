//! Observability: metrics and tracing.
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `gralloc_buffers_allocated` | Counter | Buffers backed by a new device object |
//! | `gralloc_buffers_imported` | Counter | Buffers backed by an imported descriptor |
//! | `gralloc_buffers_released` | Counter | Buffer objects released |
//! | `gralloc_device_objects_closed` | Counter | Device objects closed on last release |
//! | `gralloc_allocation_failures` | Counter | Failed requests, label `reason` |
//! | `gralloc_bytes_allocated` | Counter | Bytes of new device memory |
//! | `gralloc_allocation_time_ns` | Histogram | Latency of allocate/import |
//! | `gralloc_tracked_handles` | Gauge | Handles tracked by the registry |
//!
//! ## Tracing
//!
//! Spans are emitted per allocate/import request and per release, gated by
//! [`TracingConfig`]. The library never installs a subscriber.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gralloc_drm::observability::init_metrics;
//!
//! init_metrics();
//! // Install a metrics exporter (prometheus, statsd, ...) to collect them.
//! ```

mod metrics;
mod tracing_support;

pub use metrics::{
    AllocatorMetrics, TimerGuard, init_metrics, record_allocation_failure,
    record_device_object_closed, record_tracked_handles,
};
pub use tracing_support::{TracingConfig, span_allocate, span_release, trace_map, trace_unmap};
