//! Device memory backend interface.
//!
//! The allocator never talks to the kernel directly. Creating, importing,
//! exporting, mapping and closing device memory objects goes through a
//! [`DeviceMemoryBackend`]. A DRM driver implements it on top of GEM ioctls
//! and PRIME; [`MemfdBackend`] implements it with anonymous shared memory so
//! the lifecycle logic can run anywhere.
//!
//! # Reference counting
//!
//! Backends do **not** reference count. `close` forgets the object as soon
//! as it is called, and importing a descriptor whose object is already known
//! returns the existing handle. The
//! [`SharedHandleRegistry`](crate::registry::SharedHandleRegistry) owns the
//! counts and decides when `close` is safe.
//!
//! # Example
//!
//! ```rust,ignore
//! use gralloc_drm::backend::{BoFlags, DeviceMemoryBackend, MemfdBackend};
//!
//! let backend = MemfdBackend::new();
//! let handle = backend.create(4096, BoFlags::CACHEABLE)?;
//! let fd = backend.export_foreign(handle)?;
//! assert_eq!(backend.import_foreign(fd.as_fd(), BoFlags::empty(), 4096)?, handle);
//! backend.close(handle)?;
//! ```

mod memfd;

pub use memfd::MemfdBackend;

use crate::error::Result;
use rustix::fd::{BorrowedFd, OwnedFd};
use std::fmt;
use std::ptr::NonNull;

// ============================================================================
// Handles and flags
// ============================================================================

/// Kernel-assigned identifier of a device memory object.
///
/// Two handles with the same value denote the same object within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(pub u32);

impl DeviceHandle {
    /// Raw handle value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Placement flags passed to create and import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BoFlags(u32);

impl BoFlags {
    /// Physically contiguous memory.
    pub const CONTIGUOUS: Self = Self(1 << 0);
    /// CPU-cached mapping; needs sync barriers around CPU access.
    pub const CACHEABLE: Self = Self(1 << 1);
    /// Secure (protected) memory.
    pub const SECURE: Self = Self(1 << 3);

    /// No flags.
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if no flag is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for BoFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for BoFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Direction of a CPU access window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuAccess {
    /// CPU reads only.
    Read,
    /// CPU reads and writes.
    ReadWrite,
}

// ============================================================================
// Mapping
// ============================================================================

/// A CPU mapping of a device memory object.
///
/// This is a plain address range. It does not unmap on drop; the owner
/// hands it back to [`DeviceMemoryBackend::unmap`].
#[derive(Debug)]
pub struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: a Mapping is an address range into shared memory; access is
// coordinated by the owning buffer object.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    /// Wrap a mapped range.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes until the
    /// mapping is passed back to the backend's `unmap`.
    pub unsafe fn from_raw(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Start address.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Mapped length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length mapping.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the mapped bytes mutably.
    ///
    /// # Safety
    ///
    /// No other reference to the mapped range may be live, in this process
    /// or any other, for the lifetime of the returned slice.
    #[inline]
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: upheld by the caller and by `from_raw`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

// ============================================================================
// Backend trait
// ============================================================================

/// Operations on device memory objects.
///
/// Every method may block on kernel I/O. The registry calls `create`,
/// `import_foreign`, `export_foreign` and `close` while holding its lock.
pub trait DeviceMemoryBackend: Send + Sync {
    /// Create a new object of `size` bytes.
    fn create(&self, size: usize, flags: BoFlags) -> Result<DeviceHandle>;

    /// Resolve a foreign descriptor to a handle, creating one if the object
    /// is not yet known. Must return the existing handle for a known object.
    fn import_foreign(&self, fd: BorrowedFd<'_>, flags: BoFlags, size: usize)
    -> Result<DeviceHandle>;

    /// Export a process-transferable descriptor for `handle`.
    fn export_foreign(&self, handle: DeviceHandle) -> Result<OwnedFd>;

    /// Map `size` bytes of the object into the process.
    fn map(&self, handle: DeviceHandle, size: usize) -> Result<Mapping>;

    /// Undo a [`map`](Self::map).
    fn unmap(&self, handle: DeviceHandle, mapping: Mapping) -> Result<()>;

    /// Forget the object. Only safe when no other reference exists.
    fn close(&self, handle: DeviceHandle) -> Result<()>;

    /// Cache barrier before the CPU touches a cacheable buffer.
    fn begin_cpu_access(&self, fd: BorrowedFd<'_>, access: CpuAccess) -> Result<()>;

    /// Cache barrier after the CPU is done with a cacheable buffer.
    fn end_cpu_access(&self, fd: BorrowedFd<'_>, access: CpuAccess) -> Result<()>;

    /// Attach a debug name to an exported descriptor.
    fn set_name(&self, _fd: BorrowedFd<'_>, _name: &str) -> Result<()> {
        Ok(())
    }

    /// Physical address of a contiguous object, if the backend knows it.
    fn physical_address(&self, _handle: DeviceHandle) -> Result<Option<u64>> {
        Ok(None)
    }
}

impl<B: DeviceMemoryBackend + ?Sized> DeviceMemoryBackend for std::sync::Arc<B> {
    fn create(&self, size: usize, flags: BoFlags) -> Result<DeviceHandle> {
        (**self).create(size, flags)
    }

    fn import_foreign(
        &self,
        fd: BorrowedFd<'_>,
        flags: BoFlags,
        size: usize,
    ) -> Result<DeviceHandle> {
        (**self).import_foreign(fd, flags, size)
    }

    fn export_foreign(&self, handle: DeviceHandle) -> Result<OwnedFd> {
        (**self).export_foreign(handle)
    }

    fn map(&self, handle: DeviceHandle, size: usize) -> Result<Mapping> {
        (**self).map(handle, size)
    }

    fn unmap(&self, handle: DeviceHandle, mapping: Mapping) -> Result<()> {
        (**self).unmap(handle, mapping)
    }

    fn close(&self, handle: DeviceHandle) -> Result<()> {
        (**self).close(handle)
    }

    fn begin_cpu_access(&self, fd: BorrowedFd<'_>, access: CpuAccess) -> Result<()> {
        (**self).begin_cpu_access(fd, access)
    }

    fn end_cpu_access(&self, fd: BorrowedFd<'_>, access: CpuAccess) -> Result<()> {
        (**self).end_cpu_access(fd, access)
    }

    fn set_name(&self, fd: BorrowedFd<'_>, name: &str) -> Result<()> {
        (**self).set_name(fd, name)
    }

    fn physical_address(&self, handle: DeviceHandle) -> Result<Option<u64>> {
        (**self).physical_address(handle)
    }
}
