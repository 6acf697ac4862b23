//! Dummy storage backend for testing
//!
//! Buffers are plain `Vec<u8>` in RAM, so the whole map/alloc/unmap cycle
//! runs without GPU hardware and tests can read committed contents back.

use std::collections::HashMap;
use std::ptr::NonNull;

use super::traits::{MapFlags, Mapping, Rid, StorageBackend, StorageError, StorageUsage};
use crate::util::size::align_up;

/// A flush recorded by [`DummyBackend::flush_range`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushRecord {
    pub rid: Rid,
    pub offset: usize,
    pub size: usize,
}

#[derive(Debug)]
struct DummyBuffer {
    data: Vec<u8>,
    usage: StorageUsage,
    mapped: bool,
}

/// In-memory storage backend for tests and headless runs
///
/// Map windows can be rounded up to a configurable granularity, which makes
/// the returned capacity exceed the requested size the way real drivers do.
#[derive(Debug)]
pub struct DummyBackend {
    // Vec heap storage does not move when the map rehashes, so mapping
    // pointers stay valid for the lifetime of the buffer.
    buffers: HashMap<u64, DummyBuffer>,
    next_rid: u64,
    map_granularity: usize,
    flushes: Vec<FlushRecord>,
    fail_next_create: bool,
    fail_next_map: bool,
}

impl DummyBackend {
    /// Create a backend that maps windows at byte granularity.
    pub fn new() -> Self {
        Self::with_granularity(1)
    }

    /// Create a backend that rounds map windows up to `granularity` bytes.
    ///
    /// `granularity` must be a power of two.
    pub fn with_granularity(granularity: usize) -> Self {
        assert!(granularity.is_power_of_two());
        Self {
            buffers: HashMap::new(),
            next_rid: 1,
            map_granularity: granularity,
            flushes: Vec::new(),
            fail_next_create: false,
            fail_next_map: false,
        }
    }

    /// Make the next `create_buffer` call fail with a backend error.
    pub fn fail_next_create(&mut self) {
        self.fail_next_create = true;
    }

    /// Make the next `map_buffer` call fail with a backend error.
    pub fn fail_next_map(&mut self) {
        self.fail_next_map = true;
    }

    /// Committed contents of a buffer, if it still exists.
    pub fn contents(&self, rid: Rid) -> Option<&[u8]> {
        self.buffers.get(&rid.to_raw()).map(|b| b.data.as_slice())
    }

    /// Usage flags a buffer was created with.
    pub fn usage_of(&self, rid: Rid) -> Option<StorageUsage> {
        self.buffers.get(&rid.to_raw()).map(|b| b.usage)
    }

    /// Whether the backend currently holds a live mapping for `rid`.
    pub fn is_buffer_mapped(&self, rid: Rid) -> bool {
        self.buffers.get(&rid.to_raw()).map_or(false, |b| b.mapped)
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Every flush issued so far, in order.
    pub fn flushes(&self) -> &[FlushRecord] {
        &self.flushes
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for DummyBackend {
    fn create_buffer(&mut self, size: usize, usage: StorageUsage) -> Result<Rid, StorageError> {
        if self.fail_next_create {
            self.fail_next_create = false;
            return Err(StorageError::Backend("simulated create failure".to_string()));
        }
        if size == 0 {
            return Err(StorageError::InvalidSize);
        }

        let rid = Rid::new(self.next_rid);
        self.next_rid += 1;
        self.buffers.insert(
            rid.to_raw(),
            DummyBuffer {
                data: vec![0u8; size],
                usage,
                mapped: false,
            },
        );
        Ok(rid)
    }

    fn destroy_buffer(&mut self, rid: Rid) {
        self.buffers.remove(&rid.to_raw());
    }

    fn map_buffer(
        &mut self,
        rid: Rid,
        offset: usize,
        size: usize,
        flags: MapFlags,
    ) -> Result<Mapping, StorageError> {
        if self.fail_next_map {
            self.fail_next_map = false;
            return Err(StorageError::Backend("simulated map failure".to_string()));
        }

        if !flags.contains(MapFlags::READ) && !flags.contains(MapFlags::WRITE) {
            return Err(StorageError::UnsupportedUsage);
        }
        let buffer = self
            .buffers
            .get_mut(&rid.to_raw())
            .ok_or_else(|| StorageError::Backend("no such buffer".to_string()))?;
        if buffer.mapped {
            return Err(StorageError::Backend("buffer already mapped".to_string()));
        }
        if offset.checked_add(size).map_or(true, |end| end > buffer.data.len()) {
            return Err(StorageError::OutOfBounds {
                offset,
                size,
                capacity: buffer.data.len(),
            });
        }

        // Round the window up like a real driver would, but never past
        // the end of the buffer.
        let capacity = align_up(size, self.map_granularity).min(buffer.data.len() - offset);
        debug_assert!(capacity >= size);

        let window = &mut buffer.data[offset..offset + capacity];
        #[cfg(feature = "debug")]
        if flags.contains(MapFlags::INVALIDATE) {
            crate::debug::poison::poison_invalidated(window);
        }

        let ptr = NonNull::new(window.as_mut_ptr())
            .ok_or_else(|| StorageError::Backend("null mapping".to_string()))?;
        buffer.mapped = true;
        Ok(Mapping { ptr, capacity })
    }

    fn flush_range(&mut self, rid: Rid, offset: usize, size: usize) -> Result<(), StorageError> {
        let buffer = self
            .buffers
            .get(&rid.to_raw())
            .ok_or_else(|| StorageError::Backend("no such buffer".to_string()))?;
        if !buffer.mapped {
            return Err(StorageError::NotMapped);
        }
        if offset.checked_add(size).map_or(true, |end| end > buffer.data.len()) {
            return Err(StorageError::OutOfBounds {
                offset,
                size,
                capacity: buffer.data.len(),
            });
        }
        self.flushes.push(FlushRecord { rid, offset, size });
        Ok(())
    }

    fn unmap_buffer(&mut self, rid: Rid) -> Result<(), StorageError> {
        let buffer = self
            .buffers
            .get_mut(&rid.to_raw())
            .ok_or_else(|| StorageError::Backend("no such buffer".to_string()))?;
        if !buffer.mapped {
            return Err(StorageError::NotMapped);
        }
        buffer.mapped = false;
        Ok(())
    }
}
