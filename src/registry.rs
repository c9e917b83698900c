//! Reference-counted registry of device handles.
//!
//! Several buffer objects may share one device memory object: the same
//! foreign descriptor imported twice, or an allocation exported and imported
//! back. Backends close an object as soon as anyone asks, so the registry
//! keeps one count per handle and calls `close` only when the last
//! reference goes away.
//!
//! # Locking
//!
//! One mutex guards the count table **and** every backend call that creates,
//! imports, exports or closes an object. An entry is inserted only after the
//! backend call succeeded, and it is removed in the same critical section
//! that closes the object, so no thread can ever observe a count of zero or
//! resolve an import to a handle that is being closed.
//!
//! ```text
//! import(fd) ──┐                       ┌── release(h): 2 -> 1
//!              ├── lock ── backend ────┤
//! create()  ───┘                       └── release(h): 1 -> 0, close(h)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use gralloc_drm::backend::{BoFlags, MemfdBackend};
//! use gralloc_drm::registry::{ReleaseOutcome, SharedHandleRegistry};
//! use std::sync::Arc;
//!
//! let registry = SharedHandleRegistry::new(Arc::new(MemfdBackend::new()));
//! let (handle, fd) = registry.create_exportable(4096, BoFlags::empty())?;
//! assert_eq!(registry.import(fd.as_fd(), BoFlags::empty(), 4096)?, handle);
//!
//! assert_eq!(registry.release(handle), ReleaseOutcome::Decremented { remaining: 1 });
//! assert_eq!(registry.release(handle), ReleaseOutcome::Closed);
//! ```

use crate::backend::{BoFlags, DeviceHandle, DeviceMemoryBackend};
use crate::error::Result;
use crate::observability;
use rustix::fd::{BorrowedFd, OwnedFd};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Result of releasing one reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Other references remain.
    Decremented {
        /// References left after this release.
        remaining: u32,
    },
    /// This was the last reference; the backend object was closed.
    Closed,
    /// The handle was not tracked. Nothing was done.
    Untracked,
}

type Table = HashMap<DeviceHandle, u32>;

/// Per-handle reference counts, shared by all buffers of one allocator.
pub struct SharedHandleRegistry<B: DeviceMemoryBackend> {
    backend: Arc<B>,
    entries: Mutex<Table>,
}

impl<B: DeviceMemoryBackend> SharedHandleRegistry<B> {
    /// Create an empty registry over `backend`.
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The backend this registry serializes.
    #[inline]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    // Every critical section commits its table mutation last, so a
    // poisoned table is still consistent.
    fn lock(&self) -> MutexGuard<'_, Table> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(table: &mut Table, handle: DeviceHandle) -> u32 {
        let count = table.entry(handle).or_insert(0);
        *count += 1;
        let count = *count;
        observability::record_tracked_handles(table.len());
        count
    }

    /// Create a new device object and track it with a count of one.
    pub fn create_new(&self, size: usize, flags: BoFlags) -> Result<DeviceHandle> {
        let mut table = self.lock();
        let handle = self.backend.create(size, flags)?;
        let count = Self::track(&mut table, handle);
        tracing::debug!(handle = %handle, size, count, "device object created");
        Ok(handle)
    }

    /// Create a new device object and export a foreign descriptor for it.
    ///
    /// If the export fails the object is closed again before the lock is
    /// released, and no entry is left behind.
    pub fn create_exportable(&self, size: usize, flags: BoFlags) -> Result<(DeviceHandle, OwnedFd)> {
        let mut table = self.lock();
        let handle = self.backend.create(size, flags)?;

        let fd = match self.backend.export_foreign(handle) {
            Ok(fd) => fd,
            Err(e) => {
                tracing::error!(handle = %handle, error = %e, "export failed, closing new object");
                if let Err(close_err) = self.backend.close(handle) {
                    tracing::error!(handle = %handle, error = %close_err, "close after failed export");
                }
                return Err(e);
            }
        };

        let count = Self::track(&mut table, handle);
        tracing::debug!(handle = %handle, size, count, "device object created and exported");
        Ok((handle, fd))
    }

    /// Import a foreign descriptor.
    ///
    /// Resolves to an already tracked handle when the descriptor refers to
    /// a known object; the count is incremented either way.
    pub fn import(&self, fd: BorrowedFd<'_>, flags: BoFlags, size: usize) -> Result<DeviceHandle> {
        let mut table = self.lock();
        let handle = self.backend.import_foreign(fd, flags, size)?;
        let count = Self::track(&mut table, handle);
        tracing::debug!(handle = %handle, size, count, "foreign descriptor imported");
        Ok(handle)
    }

    /// Export a foreign descriptor for a tracked handle.
    pub fn export(&self, handle: DeviceHandle) -> Result<OwnedFd> {
        let _table = self.lock();
        let fd = self.backend.export_foreign(handle)?;
        tracing::debug!(handle = %handle, "device object exported");
        Ok(fd)
    }

    /// Drop one reference to `handle`, closing the object on the last one.
    ///
    /// Releasing an untracked handle is logged and ignored.
    pub fn release(&self, handle: DeviceHandle) -> ReleaseOutcome {
        let mut table = self.lock();

        let Some(count) = table.get_mut(&handle) else {
            tracing::warn!(handle = %handle, "release of untracked device handle ignored");
            return ReleaseOutcome::Untracked;
        };

        if *count > 1 {
            *count -= 1;
            let remaining = *count;
            tracing::debug!(handle = %handle, remaining, "device handle reference dropped");
            return ReleaseOutcome::Decremented { remaining };
        }

        // Last reference: close while still holding the lock.
        if let Err(e) = self.backend.close(handle) {
            tracing::error!(handle = %handle, error = %e, "closing device object failed");
        }
        table.remove(&handle);
        observability::record_tracked_handles(table.len());
        observability::record_device_object_closed();
        tracing::debug!(handle = %handle, "device object closed");
        ReleaseOutcome::Closed
    }

    /// Current count for `handle`, zero if untracked.
    pub fn ref_count(&self, handle: DeviceHandle) -> u32 {
        self.lock().get(&handle).copied().unwrap_or(0)
    }

    /// Number of distinct tracked handles.
    pub fn tracked_count(&self) -> usize {
        self.lock().len()
    }
}

impl<B: DeviceMemoryBackend> std::fmt::Debug for SharedHandleRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHandleRegistry")
            .field("tracked", &self.tracked_count())
            .finish()
    }
}
