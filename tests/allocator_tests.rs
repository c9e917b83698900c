//! End-to-end allocate, import, map and release.

mod common;

use common::{Event, RecordingBackend};
use gralloc_drm::backend::CpuAccess;
use gralloc_drm::format::AfbcModifiers;
use gralloc_drm::prelude::*;
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn recording(config: AllocatorConfig) -> (Arc<RecordingBackend>, BufferAllocator<RecordingBackend>) {
    common::init_tracing();
    let backend = Arc::new(RecordingBackend::new());
    let allocator = BufferAllocator::with_config(backend.clone(), config);
    (backend, allocator)
}

fn rgba(width: u32, height: u32, usage: u32) -> BufferRequest {
    BufferRequest::new(PixelFormat::Rgba8888, width, height, Usage::new(usage))
}

// ============================================================================
// Allocate and import
// ============================================================================

#[test]
fn test_allocate_reports_attributes() {
    let allocator = BufferAllocator::new(Arc::new(MemfdBackend::new()));
    let bo = allocator.allocate(rgba(1920, 1080, Usage::HW_RENDER)).unwrap();

    let attrs = bo.attributes();
    assert_eq!(attrs.width, 1920);
    assert_eq!(attrs.height, 1080);
    assert_eq!(attrs.format, PixelFormat::Rgba8888);
    assert_eq!(attrs.pixel_stride, 1920);
    assert_eq!(attrs.byte_stride, 7680);
    assert_eq!(attrs.size, 8_294_400);
    assert_eq!(bo.alloc_type(), AllocType::Uncompressed);

    assert_eq!(allocator.registry().ref_count(bo.handle()), 1);
    assert_eq!(allocator.release(bo), ReleaseOutcome::Closed);
    assert_eq!(allocator.backend().object_count(), 0);
}

#[test]
fn test_import_of_own_export_shares_handle() {
    let (backend, allocator) = recording(AllocatorConfig::default());
    let bo = allocator.allocate(rgba(64, 64, Usage::HW_TEXTURE)).unwrap();

    let fd = bo.prime_fd().try_clone_to_owned().unwrap();
    let shared = allocator
        .allocate(rgba(64, 64, Usage::HW_COMPOSER).with_prime_fd(fd))
        .unwrap();

    assert_eq!(shared.handle(), bo.handle());
    assert_eq!(allocator.registry().ref_count(bo.handle()), 2);
    assert_eq!(allocator.registry().tracked_count(), 1);

    let handle = bo.handle();
    assert_eq!(
        allocator.release(bo),
        ReleaseOutcome::Decremented { remaining: 1 }
    );
    assert_eq!(backend.closes_of(handle), 0);
    assert_eq!(allocator.release(shared), ReleaseOutcome::Closed);
    assert_eq!(backend.closes_of(handle), 1);
}

#[test]
fn test_import_across_allocators() {
    let producer = BufferAllocator::new(Arc::new(MemfdBackend::new()));
    let consumer = BufferAllocator::new(Arc::new(MemfdBackend::new()));

    let bo = producer.allocate(rgba(32, 32, Usage::HW_RENDER)).unwrap();
    let fd = bo.prime_fd().try_clone_to_owned().unwrap();
    let imported = consumer
        .allocate(rgba(32, 32, Usage::HW_TEXTURE).with_prime_fd(fd))
        .unwrap();

    assert_eq!(imported.size(), bo.size());
    assert_eq!(consumer.backend().object_count(), 1);

    assert_eq!(consumer.release(imported), ReleaseOutcome::Closed);
    assert_eq!(producer.backend().object_count(), 1);
    assert_eq!(producer.release(bo), ReleaseOutcome::Closed);
}

#[test]
fn test_import_of_too_small_descriptor_fails() {
    let allocator = BufferAllocator::new(Arc::new(MemfdBackend::new()));
    let small = allocator.allocate(rgba(16, 16, Usage::HW_RENDER)).unwrap();
    let fd = small.prime_fd().try_clone_to_owned().unwrap();

    let other = BufferAllocator::new(Arc::new(MemfdBackend::new()));
    let err = other
        .allocate(rgba(1920, 1080, Usage::HW_RENDER).with_prime_fd(fd))
        .unwrap_err();
    assert!(matches!(err, Error::BackendAllocationFailed(_)));
    assert_eq!(other.registry().tracked_count(), 0);

    assert_eq!(allocator.release(small), ReleaseOutcome::Closed);
}

// ============================================================================
// Failure paths
// ============================================================================

#[test]
fn test_geometry_failure_makes_no_device_call() {
    let (backend, allocator) = recording(AllocatorConfig::default());

    let request = BufferRequest::new(PixelFormat::Raw10, 6, 8, Usage::new(Usage::HW_CAMERA_WRITE));
    let err = allocator.allocate(request).unwrap_err();
    assert!(matches!(err, Error::InvalidDimensions { .. }));

    let request = BufferRequest::new(PixelFormat::Rgba8888, 0, 8, Usage::empty());
    assert!(allocator.allocate(request).unwrap_err().is_geometry());

    assert_eq!(backend.device_calls(), 0);
    assert!(backend.events().is_empty());
}

#[test]
fn test_failed_create_and_export_leave_no_entries() {
    let (backend, allocator) = recording(AllocatorConfig::default());

    backend.fail_create.store(true, Ordering::SeqCst);
    assert!(allocator.allocate(rgba(64, 64, Usage::HW_RENDER)).is_err());
    backend.fail_create.store(false, Ordering::SeqCst);

    backend.fail_export.store(true, Ordering::SeqCst);
    let err = allocator.allocate(rgba(64, 64, Usage::HW_RENDER)).unwrap_err();
    assert!(matches!(err, Error::BackendAllocationFailed(_)));

    assert_eq!(allocator.registry().tracked_count(), 0);
    assert_eq!(backend.object_count(), 0);
    assert_eq!(backend.count(|e| matches!(e, Event::Close(_))), 1);
}

// ============================================================================
// AFBC header prefill
// ============================================================================

fn afbc_rgba_for_cpu() -> BufferRequest {
    rgba(64, 64, Usage::HW_RENDER | Usage::SW_READ_OFTEN)
        .with_internal_format(InternalFormat::afbc(PixelFormat::Rgba8888, AfbcModifiers::BASIC))
}

#[test]
fn test_prefilled_headers_are_visible_through_map() {
    let (_backend, allocator) = recording(AllocatorConfig::default());
    let mut bo = allocator.allocate(afbc_rgba_for_cpu()).unwrap();
    assert_eq!(bo.alloc_type(), AllocType::Afbc);
    assert!(!bo.is_mapped());

    let headers = bo.geometry().afbc.unwrap();
    assert_eq!(headers.block_count, 16);
    assert_eq!(headers.body_offset, 1024);

    let ptr = allocator.map(&mut bo, Rect::new(0, 0, 64, 64), false).unwrap();
    // SAFETY: the mapping covers the whole buffer and is held until unmap.
    let bytes = unsafe { std::slice::from_raw_parts(ptr, headers.body_offset) };

    let word = |i: usize| u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
    for block in 0..headers.block_count {
        let base = block * 4;
        assert_eq!(word(base), 1024, "block {block}");
        assert_eq!(word(base + 1), 1);
        assert_eq!(word(base + 2), 0);
        assert_eq!(word(base + 3), 0);
    }
    // Past the last header the region stays zeroed.
    assert!(bytes[headers.block_count * 16..].iter().all(|&b| b == 0));

    allocator.unmap(&mut bo);
    assert_eq!(allocator.release(bo), ReleaseOutcome::Closed);
}

#[test]
fn test_prefill_disabled_leaves_headers_zeroed() {
    let (backend, allocator) = recording(AllocatorConfig::default().with_init_afbc_headers(false));
    let mut bo = allocator.allocate(afbc_rgba_for_cpu()).unwrap();
    assert_eq!(backend.count(|e| matches!(e, Event::Map(_))), 0);

    let ptr = allocator.map(&mut bo, Rect::new(0, 0, 16, 16), false).unwrap();
    // SAFETY: the mapping covers at least the header region.
    let bytes = unsafe { std::slice::from_raw_parts(ptr, 16) };
    assert!(bytes.iter().all(|&b| b == 0));

    let _ = allocator.release(bo);
}

#[test]
fn test_prefill_map_failure_releases_handle() {
    let (backend, allocator) = recording(AllocatorConfig::default());
    backend.fail_map.store(true, Ordering::SeqCst);

    let err = allocator.allocate(afbc_rgba_for_cpu()).unwrap_err();
    assert!(matches!(err, Error::MapFailed(_)));

    assert_eq!(allocator.registry().tracked_count(), 0);
    assert_eq!(backend.object_count(), 0);
    let created = backend
        .events()
        .into_iter()
        .find_map(|e| match e {
            Event::Create(h) => Some(h),
            _ => None,
        })
        .unwrap();
    assert_eq!(backend.closes_of(created), 1);
}

#[test]
fn test_imported_afbc_is_not_prefilled() {
    let (backend, allocator) = recording(AllocatorConfig::default());
    let bo = allocator.allocate(afbc_rgba_for_cpu()).unwrap();
    let maps_after_alloc = backend.count(|e| matches!(e, Event::Map(_)));
    assert_eq!(maps_after_alloc, 1);

    let fd = bo.prime_fd().try_clone_to_owned().unwrap();
    let imported = allocator.allocate(afbc_rgba_for_cpu().with_prime_fd(fd)).unwrap();
    assert_eq!(backend.count(|e| matches!(e, Event::Map(_))), maps_after_alloc);

    let _ = allocator.release(imported);
    let _ = allocator.release(bo);
}

#[test]
fn test_gpu_only_afbc_from_usage_is_prefilled() {
    let (backend, allocator) = recording(AllocatorConfig::default());
    let usage = Usage::new(Usage::HW_RENDER | Usage::HW_TEXTURE)
        .with_vendor_request(Usage::VENDOR_USE_AFBC);
    let mut bo = allocator
        .allocate(BufferRequest::new(PixelFormat::Rgba8888, 64, 64, usage))
        .unwrap();
    assert!(bo.internal_format().is_afbc());
    assert_eq!(backend.count(|e| matches!(e, Event::Map(_))), 1);
    assert_eq!(backend.count(|e| matches!(e, Event::Unmap(_))), 1);

    let headers = bo.geometry().afbc.unwrap();
    let ptr = allocator.map(&mut bo, Rect::new(0, 0, 64, 64), false).unwrap();
    // SAFETY: the mapping covers the whole buffer and is held until unmap.
    let bytes = unsafe { std::slice::from_raw_parts(ptr, headers.body_offset) };
    assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 1024);
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1);

    allocator.unmap(&mut bo);
    assert_eq!(allocator.release(bo), ReleaseOutcome::Closed);
}

#[test]
fn test_protected_afbc_is_not_prefilled() {
    let (backend, allocator) = recording(AllocatorConfig::default());
    let request = rgba(64, 64, Usage::HW_RENDER | Usage::PROTECTED)
        .with_internal_format(InternalFormat::afbc(PixelFormat::Rgba8888, AfbcModifiers::BASIC));

    let bo = allocator.allocate(request).unwrap();
    assert_eq!(bo.alloc_type(), AllocType::Afbc);
    assert!(bo.flags().contains(BoFlags::SECURE));
    assert_eq!(backend.count(|e| matches!(e, Event::Map(_))), 0);

    assert_eq!(allocator.release(bo), ReleaseOutcome::Closed);
}

// ============================================================================
// Mapping
// ============================================================================

#[test]
fn test_protected_buffer_cannot_be_mapped() {
    let (backend, allocator) = recording(AllocatorConfig::default());
    let mut bo = allocator
        .allocate(rgba(64, 64, Usage::HW_RENDER | Usage::PROTECTED))
        .unwrap();
    assert!(bo.flags().contains(BoFlags::SECURE));

    let err = allocator
        .map(&mut bo, Rect::new(0, 0, 64, 64), false)
        .unwrap_err();
    assert!(matches!(err, Error::MapFailed(_)));
    assert!(!bo.is_mapped());
    assert_eq!(backend.count(|e| matches!(e, Event::Map(_))), 0);

    let _ = allocator.release(bo);
}

#[test]
fn test_map_rect_outside_buffer() {
    let (_backend, allocator) = recording(AllocatorConfig::default());
    let mut bo = allocator
        .allocate(rgba(64, 64, Usage::SW_READ_RARELY))
        .unwrap();

    let err = allocator
        .map(&mut bo, Rect::new(32, 0, 64, 64), false)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidDimensions { .. }));
    assert!(!bo.is_mapped());

    let _ = allocator.release(bo);
}

#[test]
fn test_cacheable_map_runs_barriers() {
    let (backend, allocator) = recording(AllocatorConfig::minimal());
    let mut bo = allocator
        .allocate(rgba(64, 64, Usage::SW_READ_OFTEN | Usage::SW_WRITE_OFTEN))
        .unwrap();
    assert!(bo.flags().contains(BoFlags::CACHEABLE));

    let first = allocator.map(&mut bo, Rect::new(0, 0, 64, 64), true).unwrap();
    allocator.unmap(&mut bo);
    let second = allocator.map(&mut bo, Rect::new(0, 0, 8, 8), false).unwrap();
    assert!(!first.is_null() && !second.is_null());
    allocator.unmap(&mut bo);

    let barriers: Vec<Event> = backend
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Begin(_) | Event::End(_)))
        .collect();
    assert_eq!(
        barriers,
        vec![
            Event::Begin(CpuAccess::ReadWrite),
            Event::End(CpuAccess::ReadWrite),
            Event::Begin(CpuAccess::Read),
            Event::End(CpuAccess::Read),
        ]
    );

    let _ = allocator.release(bo);
}

#[test]
fn test_uncached_map_skips_barriers() {
    let (backend, allocator) = recording(AllocatorConfig::minimal());
    let mut bo = allocator.allocate(rgba(64, 64, Usage::SW_READ_RARELY)).unwrap();

    allocator.map(&mut bo, Rect::new(0, 0, 64, 64), false).unwrap();
    allocator.unmap(&mut bo);

    assert_eq!(
        backend.count(|e| matches!(e, Event::Begin(_) | Event::End(_))),
        0
    );
    let _ = allocator.release(bo);
}

#[test]
fn test_barrier_failure_does_not_fail_map() {
    let (backend, allocator) = recording(AllocatorConfig::minimal());
    backend.fail_barriers.store(true, Ordering::SeqCst);

    let mut bo = allocator.allocate(rgba(64, 64, Usage::SW_READ_OFTEN)).unwrap();
    assert!(allocator.map(&mut bo, Rect::new(0, 0, 64, 64), false).is_ok());
    assert!(bo.is_mapped());
    allocator.unmap(&mut bo);
    assert!(!bo.is_mapped());

    let _ = allocator.release(bo);
}

#[test]
fn test_repeated_map_reuses_mapping() {
    let (backend, allocator) = recording(AllocatorConfig::minimal());
    let mut bo = allocator.allocate(rgba(64, 64, Usage::SW_READ_RARELY)).unwrap();

    let a = allocator.map(&mut bo, Rect::new(0, 0, 64, 64), false).unwrap();
    let b = allocator.map(&mut bo, Rect::new(0, 0, 32, 32), false).unwrap();
    assert_eq!(a, b);
    assert_eq!(backend.count(|e| matches!(e, Event::Map(_))), 1);

    let _ = allocator.release(bo);
}

#[test]
fn test_release_unmaps_before_close() {
    let (backend, allocator) = recording(AllocatorConfig::minimal());
    let mut bo = allocator.allocate(rgba(64, 64, Usage::SW_WRITE_OFTEN)).unwrap();
    let handle = bo.handle();

    let ptr = allocator.map(&mut bo, Rect::new(0, 0, 64, 64), true).unwrap();
    // SAFETY: the buffer is mapped writable and at least one byte long.
    unsafe { ptr.write(0xAB) };

    assert_eq!(allocator.release(bo), ReleaseOutcome::Closed);

    let events = backend.events();
    let unmap = events.iter().position(|e| *e == Event::Unmap(handle)).unwrap();
    let close = events.iter().position(|e| *e == Event::Close(handle)).unwrap();
    assert!(unmap < close);
}

// ============================================================================
// Optional backend calls
// ============================================================================

#[test]
fn test_fresh_allocations_are_named() {
    let (backend, allocator) = recording(AllocatorConfig::default());
    let bo = allocator.allocate(rgba(64, 64, Usage::HW_RENDER)).unwrap();

    let name = backend.name(bo.handle()).unwrap();
    assert!(name.contains(&format!("_{}_", bo.size())));
    assert_eq!(backend.count(|e| matches!(e, Event::Name(_))), 1);

    // Imports are not renamed.
    let fd = bo.prime_fd().try_clone_to_owned().unwrap();
    let shared = allocator
        .allocate(rgba(64, 64, Usage::HW_RENDER).with_prime_fd(fd))
        .unwrap();
    assert_eq!(backend.count(|e| matches!(e, Event::Name(_))), 1);

    let _ = allocator.release(shared);
    let _ = allocator.release(bo);
}

#[test]
fn test_naming_can_be_disabled() {
    let (backend, allocator) = recording(AllocatorConfig::default().with_name_dma_bufs(false));
    let bo = allocator.allocate(rgba(64, 64, Usage::HW_RENDER)).unwrap();
    assert_eq!(backend.count(|e| matches!(e, Event::Name(_))), 0);
    assert!(backend.name(bo.handle()).is_none());
    let _ = allocator.release(bo);
}

#[test]
fn test_physical_address_for_contiguous_buffers() {
    common::init_tracing();
    let backend = Arc::new(RecordingBackend::with_physical_address(0x8000_0000));
    let allocator = BufferAllocator::new(backend.clone());

    let usage = Usage::new(Usage::HW_RENDER).with_vendor_request(Usage::VENDOR_PHYSICALLY_CONTIGUOUS);
    let contiguous = allocator
        .allocate(BufferRequest::new(PixelFormat::Nv12, 64, 64, usage))
        .unwrap();
    assert!(contiguous.flags().contains(BoFlags::CONTIGUOUS));
    assert_eq!(contiguous.physical_address(), Some(0x8000_0000));

    let plain = allocator.allocate(rgba(64, 64, Usage::HW_RENDER)).unwrap();
    assert_eq!(plain.physical_address(), None);

    let _ = allocator.release(contiguous);
    let _ = allocator.release(plain);

    let quiet = BufferAllocator::with_config(
        backend,
        AllocatorConfig::default().with_query_physical_address(false),
    );
    let bo = quiet
        .allocate(BufferRequest::new(PixelFormat::Nv12, 64, 64, usage))
        .unwrap();
    assert_eq!(bo.physical_address(), None);
    let _ = quiet.release(bo);
}

// ============================================================================
// Format selection and configuration
// ============================================================================

#[test]
fn test_implementation_defined_resolves_by_usage() {
    let allocator = BufferAllocator::new(Arc::new(MemfdBackend::new()));

    let camera = allocator
        .allocate(BufferRequest::new(
            PixelFormat::ImplementationDefined,
            640,
            480,
            Usage::new(Usage::HW_CAMERA_WRITE),
        ))
        .unwrap();
    assert_eq!(camera.internal_format().base, PixelFormat::Nv12);
    assert_eq!(camera.format(), PixelFormat::ImplementationDefined);

    let display = allocator
        .allocate(BufferRequest::new(
            PixelFormat::ImplementationDefined,
            640,
            480,
            Usage::new(Usage::HW_COMPOSER),
        ))
        .unwrap();
    assert_eq!(display.internal_format().base, PixelFormat::Rgba8888);
    assert_eq!(display.byte_stride(), 2560);

    let _ = allocator.release(camera);
    let _ = allocator.release(display);
}

#[test]
fn test_video_row_padding_config() {
    let request = || {
        BufferRequest::new(PixelFormat::Nv12, 64, 64, Usage::new(Usage::HW_TEXTURE))
            .with_internal_format(InternalFormat::afbc(PixelFormat::Nv12, AfbcModifiers::BASIC))
    };

    let plain = BufferAllocator::new(Arc::new(MemfdBackend::new()));
    let bo = plain.allocate(request()).unwrap();
    assert_eq!(bo.internal_height(), 64);
    let _ = plain.release(bo);

    let video = BufferAllocator::with_config(Arc::new(MemfdBackend::new()), AllocatorConfig::video());
    let bo = video.allocate(request()).unwrap();
    assert_eq!(bo.internal_height(), 80);
    let _ = video.release(bo);
}

#[test]
fn test_afbc_selected_from_usage() {
    let allocator = BufferAllocator::new(Arc::new(MemfdBackend::new()));
    let usage = Usage::new(Usage::HW_RENDER | Usage::HW_TEXTURE)
        .with_vendor_request(Usage::VENDOR_USE_AFBC);

    let bo = allocator
        .allocate(BufferRequest::new(PixelFormat::Rgba8888, 100, 50, usage))
        .unwrap();
    assert!(bo.internal_format().is_afbc());
    assert_eq!(bo.alloc_type(), AllocType::Afbc);
    assert_eq!((bo.internal_width(), bo.internal_height()), (112, 64));
    assert_eq!(bo.size(), 448 * 64 + 1024);

    let _ = allocator.release(bo);
}
