//! Metrics collection using metrics-rs.

use metrics::{Counter, Histogram, Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const BUFFERS_ALLOCATED: &str = "gralloc_buffers_allocated";
const BUFFERS_IMPORTED: &str = "gralloc_buffers_imported";
const BUFFERS_RELEASED: &str = "gralloc_buffers_released";
const DEVICE_OBJECTS_CLOSED: &str = "gralloc_device_objects_closed";
const ALLOCATION_FAILURES: &str = "gralloc_allocation_failures";
const BYTES_ALLOCATED: &str = "gralloc_bytes_allocated";
const ALLOCATION_TIME_NS: &str = "gralloc_allocation_time_ns";
const TRACKED_HANDLES: &str = "gralloc_tracked_handles";

/// Initialize metrics descriptions.
///
/// Call this once at startup. Safe to call multiple times.
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        BUFFERS_ALLOCATED,
        Unit::Count,
        "Buffers backed by a freshly created device object"
    );
    metrics::describe_counter!(
        BUFFERS_IMPORTED,
        Unit::Count,
        "Buffers backed by an imported foreign descriptor"
    );
    metrics::describe_counter!(BUFFERS_RELEASED, Unit::Count, "Buffer objects released");
    metrics::describe_counter!(
        DEVICE_OBJECTS_CLOSED,
        Unit::Count,
        "Device memory objects closed after their last reference"
    );
    metrics::describe_counter!(
        ALLOCATION_FAILURES,
        Unit::Count,
        "Failed allocate or import requests, by reason"
    );
    metrics::describe_counter!(
        BYTES_ALLOCATED,
        Unit::Bytes,
        "Bytes of freshly created device memory"
    );
    metrics::describe_histogram!(
        ALLOCATION_TIME_NS,
        Unit::Nanoseconds,
        "Time to serve one allocate or import request"
    );
    metrics::describe_gauge!(
        TRACKED_HANDLES,
        Unit::Count,
        "Distinct device handles tracked by the registry"
    );
}

/// Record a device object closed by the registry.
#[inline]
pub fn record_device_object_closed() {
    counter!(DEVICE_OBJECTS_CLOSED).increment(1);
}

/// Record the number of handles tracked by the registry.
#[inline]
pub fn record_tracked_handles(count: usize) {
    gauge!(TRACKED_HANDLES).set(count as f64);
}

/// Record a failed request.
#[inline]
pub fn record_allocation_failure(reason: &'static str) {
    counter!(ALLOCATION_FAILURES, "reason" => reason).increment(1);
}

/// Metrics handles for one allocator.
#[derive(Clone)]
pub struct AllocatorMetrics {
    allocated: Counter,
    imported: Counter,
    released: Counter,
    bytes: Counter,
    allocation_time: Histogram,
}

impl AllocatorMetrics {
    /// Register the allocator metrics.
    pub fn new() -> Self {
        Self {
            allocated: counter!(BUFFERS_ALLOCATED),
            imported: counter!(BUFFERS_IMPORTED),
            released: counter!(BUFFERS_RELEASED),
            bytes: counter!(BYTES_ALLOCATED),
            allocation_time: histogram!(ALLOCATION_TIME_NS),
        }
    }

    /// Record a freshly allocated buffer.
    #[inline]
    pub fn record_allocated(&self, size: usize) {
        self.allocated.increment(1);
        self.bytes.increment(size as u64);
    }

    /// Record an imported buffer.
    #[inline]
    pub fn record_imported(&self) {
        self.imported.increment(1);
    }

    /// Record a released buffer object.
    #[inline]
    pub fn record_released(&self) {
        self.released.increment(1);
    }

    /// Record request latency.
    #[inline]
    pub fn record_time(&self, duration: Duration) {
        self.allocation_time.record(duration.as_nanos() as f64);
    }

    /// Start a timer that records on drop.
    pub fn start_timer(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            metrics: self,
        }
    }
}

impl Default for AllocatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that records request latency when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    metrics: &'a AllocatorMetrics,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record_time(self.start.elapsed());
    }
}
