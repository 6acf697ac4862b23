//! # storalloc
//!
//! Mapped-range GPU buffer sub-allocation for Rust game engines.
//!
//! ## Features
//!
//! - Storage buffers behind an opaque backend trait ([`StorageBackend`])
//! - CPU-mapped ranges, at most one live map per storage
//! - Linear (bump) sub-allocation inside a mapped range, reclaimed in bulk on unmap
//! - Handle + generation liveness: use-after-unmap is a typed error, not a dangling read
//! - Per-frame geometry streams (vertex / index / entity-id) with typed pushes
//! - Debug line batches written straight into mapped memory
//! - RAM-backed dummy backend for tests and headless runs
//! - Optional Vulkan backend (`gpu-vulkan` feature)
//!
//! ## Quick Start
//!
//! ```rust
//! use storalloc::{DummyBackend, MapFlags, StorageAllocator, StorageUsage};
//!
//! let mut alloc = StorageAllocator::new(DummyBackend::new());
//! let storage = alloc.create_storage(1024, StorageUsage::VERTEX)?;
//!
//! // Map a window, carve a reservation, write, release.
//! let map = alloc.map(storage, 0, 1024, MapFlags::WRITE)?;
//! let mut range = alloc.alloc(map, 256)?;
//! alloc.write(&mut range, &[7u8; 64])?;
//! alloc.unmap(storage)?;
//!
//! // Unmapping killed every handle into the range.
//! assert!(alloc.alloc(map, 1).is_err());
//! # Ok::<(), storalloc::StorageError>(())
//! ```

// Forwards to the log crate when the `log` feature is on and compiles to
// nothing otherwise. `$level` is one of trace/debug/info/warn/error.
macro_rules! storage_log {
    ($level:ident, $($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::$level!(target: "storalloc", $($arg)*);
    }};
}

pub mod api;
pub mod gpu;
pub mod streams;

mod storage;
mod util;

#[cfg(feature = "debug")]
pub mod debug;

// Re-export public API at crate root for convenience
pub use api::alloc::StorageAllocator;
pub use api::config::StreamConfig;
pub use api::scope::MapGuard;
pub use api::stats::StorageStats;

pub use gpu::dummy::{DummyBackend, FlushRecord};
pub use gpu::traits::{MapFlags, Mapping, Rid, StorageBackend, StorageError, StorageUsage};

pub use storage::map::AllocRange;
pub use storage::table::{MapId, StorageId};

pub use streams::frame::{FrameStreams, StreamKind, StreamSpan, MAX_STREAMS};
pub use streams::lines::{LineBatch, LineDraw, LineVertex};

#[cfg(feature = "gpu-vulkan")]
pub use gpu::vulkan::VulkanBackend;
