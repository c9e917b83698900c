//! Shared helpers for integration tests.

#![allow(dead_code)]

use gralloc_drm::backend::{
    BoFlags, CpuAccess, DeviceHandle, DeviceMemoryBackend, Mapping, MemfdBackend,
};
use gralloc_drm::error::{Error, Result};
use rustix::fd::{BorrowedFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// One backend call, in the order it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Create(DeviceHandle),
    Import(DeviceHandle),
    Export(DeviceHandle),
    Map(DeviceHandle),
    Unmap(DeviceHandle),
    Close(DeviceHandle),
    Begin(CpuAccess),
    End(CpuAccess),
    Name(String),
}

/// Memfd backend that records every call and can inject failures.
#[derive(Default)]
pub struct RecordingBackend {
    inner: MemfdBackend,
    events: Mutex<Vec<Event>>,
    pub fail_create: AtomicBool,
    pub fail_export: AtomicBool,
    pub fail_map: AtomicBool,
    pub fail_barriers: AtomicBool,
    pub physical_address: Option<u64>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_physical_address(addr: u64) -> Self {
        Self {
            physical_address: Some(addr),
            ..Self::default()
        }
    }

    fn push(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    pub fn closes_of(&self, handle: DeviceHandle) -> usize {
        self.count(|e| *e == Event::Close(handle))
    }

    pub fn device_calls(&self) -> usize {
        self.count(|e| {
            matches!(
                e,
                Event::Create(_) | Event::Import(_) | Event::Export(_) | Event::Close(_)
            )
        })
    }

    pub fn is_live(&self, handle: DeviceHandle) -> bool {
        self.inner.is_live(handle)
    }

    pub fn object_count(&self) -> usize {
        self.inner.object_count()
    }

    pub fn name(&self, handle: DeviceHandle) -> Option<String> {
        self.inner.name(handle)
    }

    fn injected(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::BackendAllocationFailed(format!("injected {what} failure")));
        }
        Ok(())
    }
}

impl DeviceMemoryBackend for RecordingBackend {
    fn create(&self, size: usize, flags: BoFlags) -> Result<DeviceHandle> {
        Self::injected(&self.fail_create, "create")?;
        let handle = self.inner.create(size, flags)?;
        self.push(Event::Create(handle));
        Ok(handle)
    }

    fn import_foreign(
        &self,
        fd: BorrowedFd<'_>,
        flags: BoFlags,
        size: usize,
    ) -> Result<DeviceHandle> {
        let handle = self.inner.import_foreign(fd, flags, size)?;
        self.push(Event::Import(handle));
        Ok(handle)
    }

    fn export_foreign(&self, handle: DeviceHandle) -> Result<OwnedFd> {
        Self::injected(&self.fail_export, "export")?;
        let fd = self.inner.export_foreign(handle)?;
        self.push(Event::Export(handle));
        Ok(fd)
    }

    fn map(&self, handle: DeviceHandle, size: usize) -> Result<Mapping> {
        if self.fail_map.load(Ordering::SeqCst) {
            return Err(Error::MapFailed("injected map failure".into()));
        }
        let mapping = self.inner.map(handle, size)?;
        self.push(Event::Map(handle));
        Ok(mapping)
    }

    fn unmap(&self, handle: DeviceHandle, mapping: Mapping) -> Result<()> {
        self.inner.unmap(handle, mapping)?;
        self.push(Event::Unmap(handle));
        Ok(())
    }

    fn close(&self, handle: DeviceHandle) -> Result<()> {
        self.push(Event::Close(handle));
        self.inner.close(handle)
    }

    fn begin_cpu_access(&self, fd: BorrowedFd<'_>, access: CpuAccess) -> Result<()> {
        self.push(Event::Begin(access));
        Self::injected(&self.fail_barriers, "barrier")?;
        self.inner.begin_cpu_access(fd, access)
    }

    fn end_cpu_access(&self, fd: BorrowedFd<'_>, access: CpuAccess) -> Result<()> {
        self.push(Event::End(access));
        Self::injected(&self.fail_barriers, "barrier")?;
        self.inner.end_cpu_access(fd, access)
    }

    fn set_name(&self, fd: BorrowedFd<'_>, name: &str) -> Result<()> {
        self.push(Event::Name(name.to_string()));
        self.inner.set_name(fd, name)
    }

    fn physical_address(&self, _handle: DeviceHandle) -> Result<Option<u64>> {
        Ok(self.physical_address)
    }
}

/// Install a test subscriber when `RUST_LOG` is set.
pub fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_some() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}
