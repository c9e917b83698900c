//! Buffer allocation, import, mapping and release.
//!
//! [`BufferAllocator`] ties the pieces together. One call to
//! [`allocate`](BufferAllocator::allocate) serves both fresh allocation and
//! import:
//!
//! - **no foreign descriptor** in the request: a new device object is
//!   created and exported so other processes can import it;
//! - **a foreign descriptor** in the request: it is imported, resolving to
//!   an existing handle when this process already knows the object.
//!
//! Geometry is computed first in both cases, so invalid requests fail before
//! any device call. Device objects are only ever closed by the registry,
//! when the last buffer object referring to them is released.
//!
//! # Example
//!
//! ```rust,ignore
//! use gralloc_drm::prelude::*;
//! use std::sync::Arc;
//!
//! let allocator = BufferAllocator::new(Arc::new(MemfdBackend::new()));
//!
//! let usage = Usage::new(Usage::HW_RENDER | Usage::SW_READ_OFTEN);
//! let mut bo = allocator.allocate(BufferRequest::new(PixelFormat::Rgba8888, 1920, 1080, usage))?;
//! assert_eq!(bo.byte_stride(), 7680);
//!
//! let addr = allocator.map(&mut bo, Rect::new(0, 0, 1920, 1080), false)?;
//! // ... read pixels at addr ...
//! allocator.unmap(&mut bo);
//! allocator.release(bo);
//! ```

use crate::backend::{BoFlags, CpuAccess, DeviceHandle, DeviceMemoryBackend, Mapping};
use crate::config::AllocatorConfig;
use crate::error::{Error, Result};
use crate::format::{AllocType, InternalFormat, PixelFormat};
use crate::geometry::{self, BufferGeometry, afbc};
use crate::observability::{self, AllocatorMetrics};
use crate::registry::{ReleaseOutcome, SharedHandleRegistry};
use crate::usage::Usage;
use rustix::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Request and result types
// ============================================================================

/// One allocate or import request.
#[derive(Debug)]
pub struct BufferRequest {
    /// Requested format.
    pub format: PixelFormat,
    /// Width in pixels (the byte stride for vendor NV12 formats).
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Usage flags.
    pub usage: Usage,
    /// Internal format override; selected from format and usage if `None`.
    pub internal_format: Option<InternalFormat>,
    /// Foreign descriptor to import instead of allocating.
    pub prime_fd: Option<OwnedFd>,
}

impl BufferRequest {
    /// Request a fresh allocation.
    pub fn new(format: PixelFormat, width: u32, height: u32, usage: Usage) -> Self {
        Self {
            format,
            width,
            height,
            usage,
            internal_format: None,
            prime_fd: None,
        }
    }

    /// Import `fd` instead of allocating.
    pub fn with_prime_fd(mut self, fd: OwnedFd) -> Self {
        self.prime_fd = Some(fd);
        self
    }

    /// Use an explicit internal format.
    pub fn with_internal_format(mut self, internal: InternalFormat) -> Self {
        self.internal_format = Some(internal);
        self
    }
}

/// Region of a buffer the CPU is about to access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl Rect {
    /// Create a rectangle.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn fits(&self, width: u32, height: u32) -> bool {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        matches!((right, bottom), (Some(r), Some(b)) if r <= width && b <= height)
    }
}

/// The six attributes reported to the plugin layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferAttributes {
    /// Requested width.
    pub width: u32,
    /// Requested height.
    pub height: u32,
    /// Row stride in pixels.
    pub pixel_stride: usize,
    /// Requested format.
    pub format: PixelFormat,
    /// Allocation size in bytes.
    pub size: usize,
    /// Row stride in bytes.
    pub byte_stride: usize,
}

/// A buffer backed by a device memory object.
///
/// The device handle may be shared with other buffer objects. Pass the
/// object to [`BufferAllocator::release`] exactly once; dropping it without
/// releasing keeps the device object alive.
#[must_use = "buffer objects must be passed to BufferAllocator::release"]
#[derive(Debug)]
pub struct BufferObject {
    handle: DeviceHandle,
    prime_fd: OwnedFd,
    format: PixelFormat,
    width: u32,
    height: u32,
    usage: Usage,
    internal_format: InternalFormat,
    alloc_type: AllocType,
    geometry: BufferGeometry,
    flags: BoFlags,
    physical_address: Option<u64>,
    mapping: Option<Mapping>,
    cpu_access: Option<CpuAccess>,
}

impl BufferObject {
    /// Device handle (possibly shared).
    #[inline]
    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    /// Foreign descriptor for sharing with other processes.
    #[inline]
    pub fn prime_fd(&self) -> BorrowedFd<'_> {
        self.prime_fd.as_fd()
    }

    /// Requested format.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Requested width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Requested height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Usage flags.
    #[inline]
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Internal format the memory is laid out for.
    #[inline]
    pub fn internal_format(&self) -> InternalFormat {
        self.internal_format
    }

    /// Compression mode.
    #[inline]
    pub fn alloc_type(&self) -> AllocType {
        self.alloc_type
    }

    /// Full geometry.
    #[inline]
    pub fn geometry(&self) -> &BufferGeometry {
        &self.geometry
    }

    /// Row stride in pixels.
    #[inline]
    pub fn pixel_stride(&self) -> usize {
        self.geometry.pixel_stride
    }

    /// Row stride in bytes.
    #[inline]
    pub fn byte_stride(&self) -> usize {
        self.geometry.byte_stride
    }

    /// Allocation size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.geometry.size
    }

    /// Internal width.
    #[inline]
    pub fn internal_width(&self) -> u32 {
        self.geometry.internal_width
    }

    /// Internal height.
    #[inline]
    pub fn internal_height(&self) -> u32 {
        self.geometry.internal_height
    }

    /// Placement flags the object was created or imported with.
    #[inline]
    pub fn flags(&self) -> BoFlags {
        self.flags
    }

    /// Physical address, for contiguous buffers whose backend reports it.
    #[inline]
    pub fn physical_address(&self) -> Option<u64> {
        self.physical_address
    }

    /// True while a CPU mapping is held.
    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// The plugin-facing attribute set.
    pub fn attributes(&self) -> BufferAttributes {
        BufferAttributes {
            width: self.width,
            height: self.height,
            pixel_stride: self.geometry.pixel_stride,
            format: self.format,
            size: self.geometry.size,
            byte_stride: self.geometry.byte_stride,
        }
    }
}

// ============================================================================
// Allocator
// ============================================================================

/// Allocates, imports, maps and releases buffer objects.
///
/// Every buffer created by one allocator shares its registry; create one
/// allocator per device and pass it to whoever needs it.
pub struct BufferAllocator<B: DeviceMemoryBackend> {
    registry: SharedHandleRegistry<B>,
    config: AllocatorConfig,
    metrics: AllocatorMetrics,
}

impl<B: DeviceMemoryBackend> BufferAllocator<B> {
    /// Create an allocator with the default configuration.
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_config(backend, AllocatorConfig::default())
    }

    /// Create an allocator with `config`.
    pub fn with_config(backend: Arc<B>, config: AllocatorConfig) -> Self {
        Self {
            registry: SharedHandleRegistry::new(backend),
            config,
            metrics: AllocatorMetrics::new(),
        }
    }

    /// The shared handle registry.
    #[inline]
    pub fn registry(&self) -> &SharedHandleRegistry<B> {
        &self.registry
    }

    /// The device memory backend.
    #[inline]
    pub fn backend(&self) -> &Arc<B> {
        self.registry.backend()
    }

    /// The active configuration.
    #[inline]
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Allocate a new buffer, or import `request.prime_fd` if present.
    pub fn allocate(&self, request: BufferRequest) -> Result<BufferObject> {
        let _span = self
            .config
            .tracing
            .allocation_spans
            .then(|| observability::span_allocate(request.format, request.width, request.height).entered());
        let _timer = self.metrics.start_timer();

        let format = request.format;
        self.allocate_inner(request).inspect_err(|e| {
            observability::record_allocation_failure(e.kind());
            tracing::warn!(format = ?format, error = %e, "buffer allocation failed");
        })
    }

    fn allocate_inner(&self, request: BufferRequest) -> Result<BufferObject> {
        let BufferRequest {
            format,
            width,
            height,
            usage,
            internal_format,
            prime_fd,
        } = request;

        let internal = internal_format.unwrap_or_else(|| InternalFormat::select(format, usage));
        let alloc_type = AllocType::resolve(internal, usage)?;
        let geometry = geometry::compute_with_row_padding(
            internal.base,
            width,
            height,
            alloc_type,
            usage,
            self.config.afbc_video_row_padding,
        )?;
        let flags = bo_flags(format, usage);

        tracing::debug!(
            format = ?format,
            internal = ?internal,
            alloc_type = ?alloc_type,
            pixel_stride = geometry.pixel_stride,
            byte_stride = geometry.byte_stride,
            size = geometry.size,
            "geometry resolved"
        );

        let fresh = prime_fd.is_none();
        let (handle, prime_fd) = match prime_fd {
            Some(fd) => {
                let handle = self.registry.import(fd.as_fd(), flags, geometry.size)?;
                self.metrics.record_imported();
                (handle, fd)
            }
            None => {
                let (handle, fd) = self.registry.create_exportable(geometry.size, flags)?;
                self.name_descriptor(fd.as_fd(), geometry.size);
                self.metrics.record_allocated(geometry.size);
                (handle, fd)
            }
        };

        let physical_address = self.query_physical_address(handle, flags);

        let bo = BufferObject {
            handle,
            prime_fd,
            format,
            width,
            height,
            usage,
            internal_format: internal,
            alloc_type,
            geometry,
            flags,
            physical_address,
            mapping: None,
            cpu_access: None,
        };

        if fresh && self.config.init_afbc_headers && !usage.is_protected() {
            if let Some(headers) = geometry.afbc {
                if let Err(e) = self.prefill_afbc_headers(&bo, &headers) {
                    self.registry.release(bo.handle);
                    return Err(e);
                }
            }
        }

        tracing::info!(
            handle = %bo.handle,
            format = ?format,
            width,
            height,
            size = bo.size(),
            imported = !fresh,
            "buffer ready"
        );
        Ok(bo)
    }

    fn name_descriptor(&self, fd: BorrowedFd<'_>, size: usize) {
        if !self.config.name_dma_bufs {
            return;
        }
        let name = dmabuf_name(size);
        match self.registry.backend().set_name(fd, &name) {
            Ok(()) => tracing::debug!(name = %name, "dma-buf named"),
            Err(e) => tracing::warn!(name = %name, error = %e, "failed to name dma-buf"),
        }
    }

    fn query_physical_address(&self, handle: DeviceHandle, flags: BoFlags) -> Option<u64> {
        if !self.config.query_physical_address || !flags.contains(BoFlags::CONTIGUOUS) {
            return None;
        }
        match self.registry.backend().physical_address(handle) {
            Ok(addr) => addr,
            Err(e) => {
                tracing::warn!(handle = %handle, error = %e, "physical address lookup failed");
                None
            }
        }
    }

    fn prefill_afbc_headers(&self, bo: &BufferObject, headers: &afbc::AfbcHeaders) -> Result<()> {
        let backend = self.registry.backend();
        let mut mapping = backend
            .map(bo.handle, bo.size())
            .map_err(|e| Error::MapFailed(format!("AFBC header prefill: {e}")))?;

        // SAFETY: the object was created by this call and nothing else maps it yet.
        let written = afbc::write_empty_headers(
            unsafe { mapping.as_mut_slice() },
            bo.internal_format.base,
            headers,
        );
        tracing::debug!(handle = %bo.handle, headers = written, "AFBC headers initialized");

        if let Err(e) = backend.unmap(bo.handle, mapping) {
            tracing::warn!(handle = %bo.handle, error = %e, "unmap after AFBC prefill failed");
        }
        Ok(())
    }

    /// Map `bo` for CPU access and return its base address.
    ///
    /// `rect` must lie inside the buffer. The whole buffer is mapped; the
    /// address is always the buffer start. Cacheable buffers get a
    /// begin-access barrier, read-write when `for_write` is set.
    pub fn map(&self, bo: &mut BufferObject, rect: Rect, for_write: bool) -> Result<*mut u8> {
        if bo.usage.is_protected() {
            return Err(Error::MapFailed(format!(
                "protected buffer {} cannot be CPU mapped",
                bo.handle
            )));
        }

        if !rect.fits(bo.internal_width(), bo.internal_height()) {
            return Err(Error::InvalidDimensions {
                format: bo.format,
                width: rect.width,
                height: rect.height,
                reason: "rectangle lies outside the buffer",
            });
        }

        let backend = self.registry.backend();
        let addr = match &bo.mapping {
            Some(mapping) => mapping.as_ptr(),
            None => {
                let mapping = backend.map(bo.handle, bo.size())?;
                let addr = mapping.as_ptr();
                bo.mapping = Some(mapping);
                addr
            }
        };

        if bo.flags.contains(BoFlags::CACHEABLE) {
            let access = if for_write {
                CpuAccess::ReadWrite
            } else {
                CpuAccess::Read
            };
            if let Err(e) = backend.begin_cpu_access(bo.prime_fd.as_fd(), access) {
                tracing::debug!(handle = %bo.handle, error = %e, "begin cpu access failed");
            }
            bo.cpu_access = Some(access);
        }

        if self.config.tracing.mapping_events {
            observability::trace_map(bo.handle, bo.size(), for_write);
        }
        Ok(addr)
    }

    /// End CPU access to `bo` and drop its mapping.
    pub fn unmap(&self, bo: &mut BufferObject) {
        let backend = self.registry.backend();

        if let Some(access) = bo.cpu_access.take() {
            if let Err(e) = backend.end_cpu_access(bo.prime_fd.as_fd(), access) {
                tracing::debug!(handle = %bo.handle, error = %e, "end cpu access failed");
            }
        }

        match bo.mapping.take() {
            Some(mapping) => {
                if let Err(e) = backend.unmap(bo.handle, mapping) {
                    tracing::warn!(handle = %bo.handle, error = %e, "unmap failed");
                }
                if self.config.tracing.mapping_events {
                    observability::trace_unmap(bo.handle);
                }
            }
            None => tracing::debug!(handle = %bo.handle, "unmap of unmapped buffer ignored"),
        }
    }

    /// Release `bo`: unmap it if needed, then drop its handle reference.
    pub fn release(&self, mut bo: BufferObject) -> ReleaseOutcome {
        let _span = self
            .config
            .tracing
            .release_spans
            .then(|| observability::span_release(bo.handle).entered());

        // Unmap before the registry may close the object.
        if bo.mapping.is_some() {
            self.unmap(&mut bo);
        }

        let outcome = self.registry.release(bo.handle);
        self.metrics.record_released();
        tracing::debug!(handle = %bo.handle, ?outcome, "buffer released");
        outcome
    }
}

impl<B: DeviceMemoryBackend> std::fmt::Debug for BufferAllocator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferAllocator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

/// Placement flags implied by format and usage.
pub fn bo_flags(format: PixelFormat, usage: Usage) -> BoFlags {
    let mut flags = BoFlags::empty();
    if usage.cpu_reads_often() || format == PixelFormat::VendorNv12_10 {
        flags |= BoFlags::CACHEABLE;
    }
    if usage.wants_contiguous() {
        flags |= BoFlags::CONTIGUOUS;
    }
    if usage.is_protected() {
        flags |= BoFlags::SECURE;
    }
    flags
}

/// Debug name `<tid>_<size>_<hh:mm:ss.mmm>` in UTC.
pub fn dmabuf_name(size: usize) -> String {
    let tid = rustix::thread::gettid().as_raw_nonzero().get();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs() % 86_400;
    format!(
        "{}_{}_{:02}:{:02}:{:02}.{:03}",
        tid,
        size,
        secs / 3600,
        secs / 60 % 60,
        secs % 60,
        now.subsec_millis()
    )
}
