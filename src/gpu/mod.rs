//! Storage buffer backends
//!
//! The allocator reaches buffers only through [`StorageBackend`]; backends
//! own the actual GPU (or in-memory) resources and mint the opaque [`Rid`]s.
//!
//! ## Backends
//! - `dummy`: RAM-backed buffers, always compiled, used by tests
//! - `vulkan`: via the `ash` crate (enable the `gpu-vulkan` feature)

// Always present for API stability: traits define the interface
pub mod traits;
pub use traits::{MapFlags, Mapping, Rid, StorageBackend, StorageError, StorageUsage};

// Dummy backend for testing (always available)
pub mod dummy;
pub use dummy::{DummyBackend, FlushRecord};

// Backend implementations are conditionally compiled
#[cfg(feature = "gpu-vulkan")]
pub mod vulkan;
