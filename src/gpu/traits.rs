//! Storage backend traits and types
//!
//! This module defines the storage interface WITHOUT pulling in any backend-specific
//! dependencies. The allocator layer depends on these traits, not on implementations.

use std::fmt;
use std::ptr::NonNull;

/// Errors that can occur during storage allocation and mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A reservation did not fit in the remaining mapped space
    OutOfSpace {
        /// Bytes requested
        requested: usize,
        /// Bytes left between the head and the map capacity
        remaining: usize,
    },
    /// Handle refers to a storage or map that no longer exists
    StaleHandle,
    /// Storage already has a live map range
    AlreadyMapped,
    /// Storage has no live map range
    NotMapped,
    /// Storage cannot be destroyed while mapped
    MapStillLive,
    /// Window does not fit inside the storage
    OutOfBounds {
        /// Window start in bytes
        offset: usize,
        /// Window length in bytes
        size: usize,
        /// Storage size in bytes
        capacity: usize,
    },
    /// Zero or otherwise invalid size
    InvalidSize,
    /// Usage or access flags the backend cannot honor
    UnsupportedUsage,
    /// Backend-specific failure (opaque)
    Backend(String),
    /// Stream table is full
    StreamLimit,
    /// Stream kind is already registered
    DuplicateStream,
    /// Stream kind is not registered
    UnknownStream,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::OutOfSpace { requested, remaining } => {
                write!(f, "Out of mapped space: requested {} bytes, {} remaining", requested, remaining)
            }
            StorageError::StaleHandle => write!(f, "Stale storage or map handle"),
            StorageError::AlreadyMapped => write!(f, "Storage already has a live map range"),
            StorageError::NotMapped => write!(f, "Storage has no live map range"),
            StorageError::MapStillLive => write!(f, "Storage cannot be destroyed while mapped"),
            StorageError::OutOfBounds { offset, size, capacity } => {
                write!(f, "Window [{}, {}) exceeds storage size {}", offset, offset + size, capacity)
            }
            StorageError::InvalidSize => write!(f, "Invalid size"),
            StorageError::UnsupportedUsage => write!(f, "Unsupported usage or access flags"),
            StorageError::Backend(msg) => write!(f, "Backend error: {}", msg),
            StorageError::StreamLimit => write!(f, "Stream table is full"),
            StorageError::DuplicateStream => write!(f, "Stream kind is already registered"),
            StorageError::UnknownStream => write!(f, "Stream kind is not registered"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Opaque backend identifier for a storage buffer
///
/// The backend mints these; the allocator never interprets the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rid(u64);

impl Rid {
    /// Wrap a raw backend identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw backend identifier.
    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

/// Storage buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageUsage {
    pub bits: u32,
}

impl StorageUsage {
    pub const VERTEX: Self = Self { bits: 0x0001 };
    pub const INDEX: Self = Self { bits: 0x0002 };
    pub const UNIFORM: Self = Self { bits: 0x0004 };
    pub const STAGING: Self = Self { bits: 0x0008 };
    /// Contents are rewritten every frame
    pub const DYNAMIC: Self = Self { bits: 0x0010 };
    /// Mapping stays live across frames; coherent memory preferred
    pub const PERSISTENT: Self = Self { bits: 0x0020 };

    /// No flags set.
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Check whether all flags in `other` are set.
    pub const fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    /// Check whether no flags are set.
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }
}

impl std::ops::BitOr for StorageUsage {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self { bits: self.bits | rhs.bits }
    }
}

/// CPU access flags for a map range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapFlags {
    pub bits: u32,
}

impl MapFlags {
    pub const READ: Self = Self { bits: 0x0001 };
    pub const WRITE: Self = Self { bits: 0x0002 };
    /// Previous contents of the window may be discarded
    pub const INVALIDATE: Self = Self { bits: 0x0004 };
    /// Caller synchronizes against in-flight GPU reads
    pub const UNSYNCHRONIZED: Self = Self { bits: 0x0008 };

    /// No flags set.
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Check whether all flags in `other` are set.
    pub const fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }
}

impl std::ops::BitOr for MapFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self { bits: self.bits | rhs.bits }
    }
}

/// A live CPU mapping handed out by a backend
#[derive(Debug)]
pub struct Mapping {
    /// Base pointer of the mapped window
    pub ptr: NonNull<u8>,
    /// Usable bytes behind `ptr`; at least the requested window size
    ///
    /// Backends may round the window up for alignment, so this can
    /// exceed the size passed to [`StorageBackend::map_buffer`].
    pub capacity: usize,
}

/// Storage buffer backend - buffer creation, map/unmap, and flush primitives
///
/// Implementations own the actual GPU (or in-memory) buffers and hand out
/// opaque [`Rid`]s. The allocator layer guarantees at most one live mapping
/// per rid and never passes a rid it has already destroyed.
///
/// A backend failure here is fatal for the affected operation; the allocator
/// reports it and does not retry.
pub trait StorageBackend {
    /// Create a buffer of `size` bytes.
    fn create_buffer(&mut self, size: usize, usage: StorageUsage) -> Result<Rid, StorageError>;

    /// Destroy a buffer. Must tolerate being called with a mapped buffer
    /// during teardown.
    fn destroy_buffer(&mut self, rid: Rid);

    /// Map `size` bytes starting at `offset` for CPU access.
    ///
    /// The returned pointer stays valid until [`unmap_buffer`](Self::unmap_buffer)
    /// or [`destroy_buffer`](Self::destroy_buffer) is called for `rid`.
    fn map_buffer(
        &mut self,
        rid: Rid,
        offset: usize,
        size: usize,
        flags: MapFlags,
    ) -> Result<Mapping, StorageError>;

    /// Make CPU writes in `[offset, offset + size)` visible to the GPU.
    fn flush_range(&mut self, rid: Rid, offset: usize, size: usize) -> Result<(), StorageError>;

    /// Release the live mapping for `rid`.
    fn unmap_buffer(&mut self, rid: Rid) -> Result<(), StorageError>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for &mut B {
    fn create_buffer(&mut self, size: usize, usage: StorageUsage) -> Result<Rid, StorageError> {
        (**self).create_buffer(size, usage)
    }

    fn destroy_buffer(&mut self, rid: Rid) {
        (**self).destroy_buffer(rid)
    }

    fn map_buffer(
        &mut self,
        rid: Rid,
        offset: usize,
        size: usize,
        flags: MapFlags,
    ) -> Result<Mapping, StorageError> {
        (**self).map_buffer(rid, offset, size, flags)
    }

    fn flush_range(&mut self, rid: Rid, offset: usize, size: usize) -> Result<(), StorageError> {
        (**self).flush_range(rid, offset, size)
    }

    fn unmap_buffer(&mut self, rid: Rid) -> Result<(), StorageError> {
        (**self).unmap_buffer(rid)
    }
}
