//! Map scope guards for RAII-style map ranges.

use crate::gpu::traits::{StorageBackend, StorageError};
use crate::storage::map::AllocRange;
use crate::storage::table::{MapId, StorageId};
use super::alloc::StorageAllocator;

/// A guard that holds a live map range and releases it on drop.
///
/// Borrows the allocator exclusively, so reservations go through the guard
/// while it is alive. Dropping the guard unmaps the storage; use
/// [`finish`](MapGuard::finish) instead to observe flush errors.
///
/// # Example
///
/// ```
/// use storalloc::{DummyBackend, MapFlags, StorageAllocator, StorageUsage};
///
/// let mut alloc = StorageAllocator::new(DummyBackend::new());
/// let storage = alloc.create_storage(256, StorageUsage::VERTEX)?;
///
/// {
///     let mut scope = alloc.map_scope(storage, 0, 256, MapFlags::WRITE)?;
///     let mut range = scope.alloc(16)?;
///     scope.write(&mut range, &[1u8; 16])?;
/// } // unmapped here
///
/// assert!(!alloc.is_mapped(storage));
/// # Ok::<(), storalloc::StorageError>(())
/// ```
pub struct MapGuard<'a, B: StorageBackend> {
    alloc: &'a mut StorageAllocator<B>,
    storage: StorageId,
    map: MapId,
    released: bool,
}

impl<'a, B: StorageBackend> MapGuard<'a, B> {
    /// Create a guard for an already-mapped storage.
    pub(crate) fn new(alloc: &'a mut StorageAllocator<B>, storage: StorageId, map: MapId) -> Self {
        Self { alloc, storage, map, released: false }
    }

    /// Handle of the guarded map range.
    pub fn map_id(&self) -> MapId {
        self.map
    }

    /// Handle of the mapped storage.
    pub fn storage_id(&self) -> StorageId {
        self.storage
    }

    /// Reserve `size` bytes from the head of the guarded range.
    pub fn alloc(&mut self, size: usize) -> Result<AllocRange, StorageError> {
        self.alloc.alloc(self.map, size)
    }

    /// Claim the next `size` bytes of a reservation as a writable span.
    pub fn suballoc(
        &mut self,
        range: &mut AllocRange,
        size: usize,
    ) -> Result<&mut [u8], StorageError> {
        self.alloc.suballoc(range, size)
    }

    /// Copy `bytes` into the next span of a reservation.
    pub fn write(&mut self, range: &mut AllocRange, bytes: &[u8]) -> Result<usize, StorageError> {
        self.alloc.write(range, bytes)
    }

    /// Bytes left between the head and the capacity of the guarded range.
    pub fn remaining(&self) -> Result<usize, StorageError> {
        self.alloc.map_remaining(self.map)
    }

    /// Unmap now and report the flush result.
    pub fn finish(mut self) -> Result<(), StorageError> {
        self.released = true;
        self.alloc.unmap(self.storage)
    }
}

impl<'a, B: StorageBackend> Drop for MapGuard<'a, B> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(_err) = self.alloc.unmap(self.storage) {
                storage_log!(error, "map scope failed to unmap: {}", _err);
            }
        }
    }
}
