//! Allocator configuration.

use crate::observability::TracingConfig;

/// Behavior switches for a [`BufferAllocator`](crate::allocator::BufferAllocator).
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Write "empty block" AFBC headers into fresh compressed buffers that
    /// are not protected.
    pub init_afbc_headers: bool,
    /// Add one 16-pixel block row to compressed YUV 4:2:0 buffers so a
    /// video decoder can crop.
    pub afbc_video_row_padding: bool,
    /// Attach a debug name to every exported descriptor.
    pub name_dma_bufs: bool,
    /// Query the physical address of contiguous buffers.
    pub query_physical_address: bool,
    /// Span and event settings.
    pub tracing: TracingConfig,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            init_afbc_headers: true,
            afbc_video_row_padding: false,
            name_dma_bufs: true,
            query_physical_address: true,
            tracing: TracingConfig::default(),
        }
    }
}

impl AllocatorConfig {
    /// Config for a video-decoder platform.
    pub fn video() -> Self {
        Self {
            afbc_video_row_padding: true,
            ..Self::default()
        }
    }

    /// Config that makes no optional backend calls.
    pub fn minimal() -> Self {
        Self {
            init_afbc_headers: false,
            afbc_video_row_padding: false,
            name_dma_bufs: false,
            query_physical_address: false,
            tracing: TracingConfig::minimal(),
        }
    }

    /// Set AFBC header prefill.
    pub fn with_init_afbc_headers(mut self, enabled: bool) -> Self {
        self.init_afbc_headers = enabled;
        self
    }

    /// Set video row padding.
    pub fn with_afbc_video_row_padding(mut self, enabled: bool) -> Self {
        self.afbc_video_row_padding = enabled;
        self
    }

    /// Set descriptor naming.
    pub fn with_name_dma_bufs(mut self, enabled: bool) -> Self {
        self.name_dma_bufs = enabled;
        self
    }

    /// Set physical address lookup.
    pub fn with_query_physical_address(mut self, enabled: bool) -> Self {
        self.query_physical_address = enabled;
        self
    }

    /// Set tracing options.
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }
}
