//! Device memory backend on Linux memfd.
//!
//! Each device object is an anonymous `memfd_create` file. Exported
//! descriptors are duplicates of that file, so importing them back resolves
//! through `(st_dev, st_ino)` to the handle that already owns the file,
//! mirroring how PRIME import finds an existing GEM object.

use super::{BoFlags, CpuAccess, DeviceHandle, DeviceMemoryBackend, Mapping};
use crate::error::{Error, Result};
use rustix::fd::{AsFd, BorrowedFd, OwnedFd};
use rustix::fs::MemfdFlags;
use rustix::mm::{MapFlags, ProtFlags};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Identity of the file behind a descriptor.
type InodeKey = (u64, u64);

struct DeviceObject {
    fd: OwnedFd,
    key: InodeKey,
    size: usize,
    flags: BoFlags,
    name: Option<String>,
}

#[derive(Default)]
struct Objects {
    next_handle: u32,
    by_handle: HashMap<DeviceHandle, DeviceObject>,
    by_inode: HashMap<InodeKey, DeviceHandle>,
}

impl Objects {
    fn get(&self, handle: DeviceHandle) -> Result<&DeviceObject> {
        self.by_handle
            .get(&handle)
            .ok_or_else(|| Error::BackendAllocationFailed(format!("unknown handle {handle}")))
    }

    fn insert(
        &mut self,
        fd: OwnedFd,
        key: InodeKey,
        size: usize,
        flags: BoFlags,
    ) -> Result<DeviceHandle> {
        self.next_handle = self.next_handle.checked_add(1).ok_or_else(|| {
            Error::BackendAllocationFailed("device handle space exhausted".into())
        })?;
        let handle = DeviceHandle(self.next_handle);
        self.by_inode.insert(key, handle);
        self.by_handle.insert(
            handle,
            DeviceObject {
                fd,
                key,
                size,
                flags,
                name: None,
            },
        );
        Ok(handle)
    }
}

/// Reference backend storing device objects in memfd files.
///
/// Handles are assigned from 1 upwards and never reused; creation fails once
/// the handle space is exhausted.
#[derive(Default)]
pub struct MemfdBackend {
    objects: Mutex<Objects>,
}

impl MemfdBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Objects> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live device objects.
    pub fn object_count(&self) -> usize {
        self.lock().by_handle.len()
    }

    /// True if `handle` names a live object.
    pub fn is_live(&self, handle: DeviceHandle) -> bool {
        self.lock().by_handle.contains_key(&handle)
    }

    /// Debug name attached to the object, if any.
    pub fn name(&self, handle: DeviceHandle) -> Option<String> {
        self.lock()
            .by_handle
            .get(&handle)
            .and_then(|obj| obj.name.clone())
    }

    /// Flags the object was created or imported with.
    pub fn flags(&self, handle: DeviceHandle) -> Option<BoFlags> {
        self.lock().by_handle.get(&handle).map(|obj| obj.flags)
    }

    fn inode_key(fd: BorrowedFd<'_>) -> Result<(InodeKey, usize)> {
        let stat = rustix::fs::fstat(fd)?;
        let size = usize::try_from(stat.st_size).unwrap_or(0);
        Ok(((stat.st_dev as u64, stat.st_ino as u64), size))
    }
}

impl DeviceMemoryBackend for MemfdBackend {
    fn create(&self, size: usize, flags: BoFlags) -> Result<DeviceHandle> {
        if size == 0 {
            return Err(Error::BackendAllocationFailed(
                "size must be greater than 0".into(),
            ));
        }

        let fd = rustix::fs::memfd_create(c"gralloc-bo", MemfdFlags::CLOEXEC)?;
        rustix::fs::ftruncate(&fd, size as u64)?;
        let (key, _) = Self::inode_key(fd.as_fd())?;

        let handle = self.lock().insert(fd, key, size, flags)?;
        tracing::trace!(handle = %handle, size, "memfd object created");
        Ok(handle)
    }

    fn import_foreign(
        &self,
        fd: BorrowedFd<'_>,
        flags: BoFlags,
        size: usize,
    ) -> Result<DeviceHandle> {
        let (key, actual) = Self::inode_key(fd)?;
        let mut objects = self.lock();

        if let Some(&handle) = objects.by_inode.get(&key) {
            tracing::trace!(handle = %handle, "foreign descriptor resolves to known object");
            return Ok(handle);
        }

        if actual < size {
            return Err(Error::BackendAllocationFailed(format!(
                "foreign descriptor holds {actual} bytes, {size} required"
            )));
        }

        let owned = fd.try_clone_to_owned()?;
        let handle = objects.insert(owned, key, actual, flags)?;
        tracing::trace!(handle = %handle, size = actual, "memfd object imported");
        Ok(handle)
    }

    fn export_foreign(&self, handle: DeviceHandle) -> Result<OwnedFd> {
        let objects = self.lock();
        Ok(objects.get(handle)?.fd.try_clone()?)
    }

    fn map(&self, handle: DeviceHandle, size: usize) -> Result<Mapping> {
        let objects = self.lock();
        let obj = objects.get(handle)?;
        if size > obj.size {
            return Err(Error::MapFailed(format!(
                "mapping {size} bytes of a {} byte object",
                obj.size
            )));
        }

        // SAFETY: fresh shared mapping of a file we own; no existing memory is touched.
        let ptr = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &obj.fd,
                0,
            )
        }
        .map_err(|e| Error::MapFailed(format!("mmap failed: {e}")))?;

        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| Error::MapFailed("mmap returned null".into()))?;

        // SAFETY: the range stays mapped until `unmap` receives it.
        Ok(unsafe { Mapping::from_raw(ptr, size) })
    }

    fn unmap(&self, _handle: DeviceHandle, mapping: Mapping) -> Result<()> {
        // SAFETY: `mapping` came from `map` and is consumed here.
        unsafe { rustix::mm::munmap(mapping.as_ptr().cast(), mapping.len())? };
        Ok(())
    }

    fn close(&self, handle: DeviceHandle) -> Result<()> {
        let mut objects = self.lock();
        let obj = objects
            .by_handle
            .remove(&handle)
            .ok_or_else(|| Error::BackendAllocationFailed(format!("unknown handle {handle}")))?;
        objects.by_inode.remove(&obj.key);
        tracing::trace!(handle = %handle, "memfd object closed");
        Ok(())
    }

    fn begin_cpu_access(&self, _fd: BorrowedFd<'_>, access: CpuAccess) -> Result<()> {
        tracing::trace!(?access, "begin cpu access (coherent, no-op)");
        Ok(())
    }

    fn end_cpu_access(&self, _fd: BorrowedFd<'_>, access: CpuAccess) -> Result<()> {
        tracing::trace!(?access, "end cpu access (coherent, no-op)");
        Ok(())
    }

    fn set_name(&self, fd: BorrowedFd<'_>, name: &str) -> Result<()> {
        let (key, _) = Self::inode_key(fd)?;
        let mut objects = self.lock();
        let handle = objects.by_inode.get(&key).copied();
        if let Some(obj) = handle.and_then(|h| objects.by_handle.get_mut(&h)) {
            obj.name = Some(name.to_string());
        }
        Ok(())
    }
}
