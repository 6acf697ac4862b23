//! The main allocator type.

use crate::api::scope::MapGuard;
use crate::api::stats::StorageStats;
use crate::gpu::traits::{MapFlags, Rid, StorageBackend, StorageError, StorageUsage};
use crate::storage::map::{AllocRange, MapState};
use crate::storage::table::{MapId, StorageId, StorageTable};

/// Linear sub-allocator over mapped storage ranges.
///
/// Owns the storage buffers it creates through its backend. Each storage can
/// carry at most one live map range; reservations are carved from the map by
/// advancing a head cursor and the whole range is reclaimed on unmap. There
/// is no per-reservation free.
///
/// All operations take `&mut self`; the allocator is single-threaded by
/// design and does no internal locking.
///
/// # Example
///
/// ```
/// use storalloc::{DummyBackend, MapFlags, StorageAllocator, StorageUsage};
///
/// let mut alloc = StorageAllocator::new(DummyBackend::new());
/// let storage = alloc.create_storage(1024, StorageUsage::VERTEX)?;
/// let map = alloc.map(storage, 0, 1024, MapFlags::WRITE)?;
///
/// let mut verts = alloc.alloc(map, 64)?;
/// alloc.write(&mut verts, &[7u8; 64])?;
///
/// alloc.unmap(storage)?;
/// alloc.destroy_storage(storage)?;
/// # Ok::<(), storalloc::StorageError>(())
/// ```
pub struct StorageAllocator<B: StorageBackend> {
    backend: B,
    table: StorageTable,
    stats: StorageStats,
}

impl<B: StorageBackend> StorageAllocator<B> {
    /// Create an allocator over the given backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            table: StorageTable::new(),
            stats: StorageStats::new(),
        }
    }

    /// Shared access to the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Exclusive access to the backend.
    ///
    /// Bypassing the allocator for rids it owns invalidates its bookkeeping;
    /// intended for backend-specific queries and test setup.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Statistics accumulated since construction.
    pub fn stats(&self) -> &StorageStats {
        &self.stats
    }

    // ==================== Storage Lifecycle ====================

    /// Create a storage buffer of `size` bytes.
    ///
    /// A backend refusal is fatal for the call and reported as-is; the
    /// allocator does not retry or fall back.
    pub fn create_storage(
        &mut self,
        size: usize,
        usage: StorageUsage,
    ) -> Result<StorageId, StorageError> {
        if size == 0 {
            return Err(StorageError::InvalidSize);
        }
        if usage.is_empty() {
            return Err(StorageError::UnsupportedUsage);
        }
        let rid = match self.backend.create_buffer(size, usage) {
            Ok(rid) => rid,
            Err(err) => {
                storage_log!(error, "storage creation failed ({} bytes): {}", size, err);
                return Err(err);
            }
        };
        let id = self.table.insert(rid, size, usage);
        self.stats.storages_created += 1;
        storage_log!(debug, "created storage {:?} ({} bytes)", id, size);
        Ok(id)
    }

    /// Destroy a storage buffer.
    ///
    /// Fails with [`StorageError::MapStillLive`] while a map range is open
    /// and with [`StorageError::StaleHandle`] if `id` is already dead.
    pub fn destroy_storage(&mut self, id: StorageId) -> Result<(), StorageError> {
        let rid = match self.table.remove(id) {
            Ok(rid) => rid,
            Err(err) => {
                storage_log!(error, "cannot destroy storage {:?}: {}", id, err);
                return Err(err);
            }
        };
        self.backend.destroy_buffer(rid);
        self.stats.storages_destroyed += 1;
        storage_log!(debug, "destroyed storage {:?}", id);
        Ok(())
    }

    /// Check if a storage handle is still valid.
    pub fn is_valid(&self, id: StorageId) -> bool {
        self.table.is_valid(id)
    }

    /// Backend rid of a storage, for draw submission.
    pub fn rid(&self, id: StorageId) -> Result<Rid, StorageError> {
        Ok(self.table.slot(id)?.rid)
    }

    /// Size of a storage in bytes.
    pub fn storage_size(&self, id: StorageId) -> Result<usize, StorageError> {
        Ok(self.table.slot(id)?.size)
    }

    /// Usage flags a storage was created with.
    pub fn usage(&self, id: StorageId) -> Result<StorageUsage, StorageError> {
        Ok(self.table.slot(id)?.usage)
    }

    /// Whether a storage currently has a live map range.
    ///
    /// Returns false for stale handles.
    pub fn is_mapped(&self, id: StorageId) -> bool {
        self.table.slot(id).map_or(false, |slot| slot.map.is_some())
    }

    /// Number of live storages.
    pub fn storage_count(&self) -> usize {
        self.table.live_count()
    }

    // ==================== Map Ranges ====================

    /// Map `size` bytes of a storage starting at `offset` for CPU access.
    ///
    /// The backend may round the window up; the extra space is usable and
    /// visible through [`map_capacity`](Self::map_capacity). At most one map
    /// range can be live per storage.
    pub fn map(
        &mut self,
        id: StorageId,
        offset: usize,
        size: usize,
        flags: MapFlags,
    ) -> Result<MapId, StorageError> {
        if size == 0 {
            return Err(StorageError::InvalidSize);
        }
        if !flags.contains(MapFlags::READ) && !flags.contains(MapFlags::WRITE) {
            return Err(StorageError::UnsupportedUsage);
        }
        let slot = self.table.slot(id)?;
        if slot.map.is_some() {
            storage_log!(error, "storage {:?} is already mapped", id);
            return Err(StorageError::AlreadyMapped);
        }
        let end = offset.checked_add(size).ok_or(StorageError::OutOfBounds {
            offset,
            size,
            capacity: slot.size,
        })?;
        if end > slot.size {
            return Err(StorageError::OutOfBounds { offset, size, capacity: slot.size });
        }
        let rid = slot.rid;

        let mapping = self.backend.map_buffer(rid, offset, size, flags)?;
        if mapping.capacity < size {
            let _ = self.backend.unmap_buffer(rid);
            return Err(StorageError::Backend(
                "backend mapped fewer bytes than requested".to_string(),
            ));
        }

        let state = MapState::new(mapping.ptr, offset, size, mapping.capacity, flags);
        let map = self.table.attach_map(id, state)?;
        self.stats.maps += 1;
        storage_log!(
            debug,
            "mapped storage {:?} window [{}, {}) capacity {}",
            id,
            offset,
            end,
            mapping.capacity
        );
        Ok(map)
    }

    /// Release the live map range of a storage.
    ///
    /// Writes carved so far are flushed to the backend before the mapping is
    /// released. Reservations and map handles pointing into the range are
    /// dead afterwards. Unmapping an unmapped storage fails with
    /// [`StorageError::NotMapped`] and affects nothing else.
    pub fn unmap(&mut self, id: StorageId) -> Result<(), StorageError> {
        let rid = self.table.slot(id)?.rid;
        let map = match self.table.detach_map(id) {
            Ok(map) => map,
            Err(err) => {
                storage_log!(error, "cannot unmap storage {:?}: {}", id, err);
                return Err(err);
            }
        };

        let mut flushed = Ok(());
        if map.flags().contains(MapFlags::WRITE) && map.head() > 0 {
            flushed = self.backend.flush_range(rid, map.offset(), map.head());
        }
        let unmapped = self.backend.unmap_buffer(rid);

        self.stats.unmaps += 1;
        self.stats.peak_map_used = self.stats.peak_map_used.max(map.head());
        storage_log!(debug, "unmapped storage {:?} after {} bytes", id, map.head());
        flushed.and(unmapped)
    }

    /// Map a storage and release the range when the guard drops.
    pub fn map_scope(
        &mut self,
        id: StorageId,
        offset: usize,
        size: usize,
        flags: MapFlags,
    ) -> Result<MapGuard<'_, B>, StorageError> {
        let map = self.map(id, offset, size, flags)?;
        Ok(MapGuard::new(self, id, map))
    }

    /// Head cursor of a live map range.
    pub fn map_head(&self, map: MapId) -> Result<usize, StorageError> {
        Ok(self.table.map_state(map)?.head())
    }

    /// Bytes left between the head and the capacity of a live map range.
    pub fn map_remaining(&self, map: MapId) -> Result<usize, StorageError> {
        Ok(self.table.map_state(map)?.remaining())
    }

    /// Window size requested at map time.
    pub fn map_size(&self, map: MapId) -> Result<usize, StorageError> {
        Ok(self.table.map_state(map)?.size())
    }

    /// Usable bytes of a live map range; at least [`map_size`](Self::map_size).
    pub fn map_capacity(&self, map: MapId) -> Result<usize, StorageError> {
        Ok(self.table.map_state(map)?.capacity())
    }

    /// Backend rid behind a live map range, for draw submission.
    pub fn map_rid(&self, map: MapId) -> Result<Rid, StorageError> {
        self.table.map_rid(map)
    }

    // ==================== Reservations ====================

    /// Reserve `size` bytes from the head of a map range.
    ///
    /// The reservation owns `[start, start + size)` of the mapped window and
    /// carries its own cursor for sub-allocation. On failure the head does
    /// not move and the range stays usable for smaller requests.
    pub fn alloc(&mut self, map: MapId, size: usize) -> Result<AllocRange, StorageError> {
        let state = self.table.map_state_mut(map)?;
        match state.carve(size) {
            Ok(start) => {
                self.stats.reservations += 1;
                self.stats.bytes_reserved += size as u64;
                Ok(AllocRange::new(map, start, size))
            }
            Err(err) => {
                self.stats.failed_allocs += 1;
                storage_log!(warn, "reservation of {} bytes failed: {}", size, err);
                Err(err)
            }
        }
    }

    /// Claim the next `size` bytes of a reservation as a writable span.
    ///
    /// The span borrows the allocator, so the map range cannot be released
    /// while it is alive. Fails with [`StorageError::StaleHandle`] once the
    /// underlying range has been unmapped.
    pub fn suballoc(
        &mut self,
        range: &mut AllocRange,
        size: usize,
    ) -> Result<&mut [u8], StorageError> {
        // Validate the handle before the cursor moves.
        self.table.map_state(range.map_id())?;
        let at = match range.bump(size) {
            Ok(at) => at,
            Err(err) => {
                self.stats.failed_allocs += 1;
                storage_log!(warn, "sub-allocation of {} bytes failed: {}", size, err);
                return Err(err);
            }
        };
        self.stats.bytes_written += size as u64;

        let offset = range.start() + at;
        let state = self.table.map_state_mut(range.map_id())?;
        Ok(state.span_mut(offset, size))
    }

    /// Copy `bytes` into the next span of a reservation.
    ///
    /// Returns the write position relative to the map range.
    pub fn write(&mut self, range: &mut AllocRange, bytes: &[u8]) -> Result<usize, StorageError> {
        let offset = range.offset_in_map();
        let span = self.suballoc(range, bytes.len())?;
        span.copy_from_slice(bytes);
        Ok(offset)
    }
}

impl<B: StorageBackend> Drop for StorageAllocator<B> {
    fn drop(&mut self) {
        for (rid, mapped) in self.table.take_all() {
            if mapped {
                let _ = self.backend.unmap_buffer(rid);
            }
            self.backend.destroy_buffer(rid);
        }
    }
}
