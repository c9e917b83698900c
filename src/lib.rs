//! # gralloc-drm
//!
//! Graphics buffer allocation on top of a DRM-style device memory manager.
//!
//! The crate does two things:
//!
//! - **Geometry**: computes stride and size for every supported pixel
//!   format, including AFBC compressed layouts. Pure functions, no I/O.
//! - **Shared handle lifecycle**: tracks how many buffer objects refer to
//!   each device memory object so that an object shared by several buffers
//!   (imported twice, exported and imported back, raced across threads) is
//!   closed exactly once, after its last release.
//!
//! ## Features
//!
//! - **Unified allocate/import**: a request with a foreign descriptor is
//!   imported, one without is freshly allocated and exported
//! - **AFBC layouts**: basic, wide-block, padded and tiled-header modes
//! - **Pluggable backend**: the kernel transport is a trait; a memfd backend
//!   is included
//! - **Observability**: `tracing` spans and `metrics` counters
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gralloc_drm::prelude::*;
//! use std::sync::Arc;
//!
//! let allocator = BufferAllocator::new(Arc::new(MemfdBackend::new()));
//!
//! let bo = allocator.allocate(BufferRequest::new(
//!     PixelFormat::Nv12,
//!     1920,
//!     1080,
//!     Usage::new(Usage::HW_TEXTURE),
//! ))?;
//!
//! // Share with another process, which imports it back.
//! let fd = bo.prime_fd().try_clone_to_owned()?;
//! let shared = allocator.allocate(
//!     BufferRequest::new(PixelFormat::Nv12, 1920, 1080, Usage::new(Usage::HW_COMPOSER))
//!         .with_prime_fd(fd),
//! )?;
//! assert_eq!(shared.handle(), bo.handle());
//!
//! allocator.release(bo);
//! allocator.release(shared); // closes the device object
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod allocator;
pub mod backend;
pub mod config;
pub mod error;
pub mod format;
pub mod geometry;
pub mod observability;
pub mod registry;
pub mod usage;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::allocator::{BufferAllocator, BufferAttributes, BufferObject, BufferRequest, Rect};
    pub use crate::backend::{BoFlags, DeviceHandle, DeviceMemoryBackend, MemfdBackend};
    pub use crate::config::AllocatorConfig;
    pub use crate::error::{Error, Result};
    pub use crate::format::{AllocType, InternalFormat, PixelFormat};
    pub use crate::geometry::BufferGeometry;
    pub use crate::registry::{ReleaseOutcome, SharedHandleRegistry};
    pub use crate::usage::Usage;
}

pub use error::{Error, Result};
