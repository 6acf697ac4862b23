//! Map range state and bump-cursor reservations.
//!
//! A map range owns a CPU-visible window into a storage buffer. Space is
//! handed out by advancing a head cursor; nothing is freed individually and
//! the whole window is reclaimed when the range is released.

use std::ptr::NonNull;

use crate::gpu::traits::{MapFlags, StorageError};
use super::table::MapId;

/// Bookkeeping for one live map range.
///
/// `capacity` is what the backend actually mapped and may exceed the
/// requested `size`; the head cursor runs over the full capacity.
#[derive(Debug)]
pub(crate) struct MapState {
    ptr: NonNull<u8>,
    offset: usize,
    size: usize,
    capacity: usize,
    head: usize,
    flags: MapFlags,
}

impl MapState {
    pub(crate) fn new(
        ptr: NonNull<u8>,
        offset: usize,
        size: usize,
        capacity: usize,
        flags: MapFlags,
    ) -> Self {
        debug_assert!(capacity >= size);
        Self { ptr, offset, size, capacity, head: 0, flags }
    }

    /// Window start within the storage buffer.
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    /// Window size as requested at map time.
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Usable bytes behind the mapping.
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current head cursor.
    pub(crate) fn head(&self) -> usize {
        self.head
    }

    /// Bytes left between the head and the capacity.
    pub(crate) fn remaining(&self) -> usize {
        self.capacity - self.head
    }

    pub(crate) fn flags(&self) -> MapFlags {
        self.flags
    }

    /// Advance the head by `size` bytes and return the old head.
    ///
    /// The head never moves on failure.
    pub(crate) fn carve(&mut self, size: usize) -> Result<usize, StorageError> {
        let new_head = self
            .head
            .checked_add(size)
            .filter(|&h| h <= self.capacity)
            .ok_or(StorageError::OutOfSpace {
                requested: size,
                remaining: self.capacity - self.head,
            })?;
        let start = self.head;
        self.head = new_head;
        Ok(start)
    }

    /// Borrow `[offset, offset + len)` of the mapped window.
    ///
    /// Callers must have bounds-checked the window against the capacity.
    pub(crate) fn span_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        debug_assert!(offset.checked_add(len).is_some_and(|end| end <= self.capacity));
        // SAFETY: the window lies inside the live mapping, which stays valid
        // until the range is released, and the returned borrow keeps the
        // allocator (and with it this MapState) mutably borrowed for as long
        // as the slice lives. Cursors only move forward, so windows handed
        // out by carve are disjoint.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), len) }
    }
}

/// A reservation carved from the head of a live map range.
///
/// Holds its own bump cursor so sub-allocations can be carved out of the
/// reservation without touching the parent map. Not `Clone`: every byte of
/// the reservation has exactly one owner.
#[derive(Debug)]
pub struct AllocRange {
    map: MapId,
    start: usize,
    head: usize,
    capacity: usize,
}

impl AllocRange {
    pub(crate) fn new(map: MapId, start: usize, capacity: usize) -> Self {
        Self { map, start, head: 0, capacity }
    }

    /// The map range this reservation was carved from.
    pub fn map_id(&self) -> MapId {
        self.map
    }

    /// Reservation start, relative to the map range.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Sub-allocation cursor, relative to the reservation start.
    pub fn head_pointer(&self) -> usize {
        self.head
    }

    /// Total bytes reserved.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes not yet claimed by sub-allocations.
    pub fn remaining(&self) -> usize {
        self.capacity - self.head
    }

    /// Current cursor position, relative to the map range.
    pub fn offset_in_map(&self) -> usize {
        self.start + self.head
    }

    /// Advance the cursor by `size` bytes and return the old cursor.
    ///
    /// The cursor never moves on failure.
    pub(crate) fn bump(&mut self, size: usize) -> Result<usize, StorageError> {
        let new_head = self
            .head
            .checked_add(size)
            .filter(|&h| h <= self.capacity)
            .ok_or(StorageError::OutOfSpace {
                requested: size,
                remaining: self.capacity - self.head,
            })?;
        let at = self.head;
        self.head = new_head;
        Ok(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state(bytes: &mut [u8]) -> MapState {
        let len = bytes.len();
        let ptr = NonNull::new(bytes.as_mut_ptr()).unwrap();
        MapState::new(ptr, 0, len, len, MapFlags::WRITE)
    }

    #[test]
    fn test_carve_advances_head() {
        let mut bytes = vec![0u8; 128];
        let mut state = test_state(&mut bytes);

        assert_eq!(state.carve(64).unwrap(), 0);
        assert_eq!(state.carve(64).unwrap(), 64);
        assert_eq!(state.head(), 128);
        assert_eq!(state.remaining(), 0);
    }

    #[test]
    fn test_carve_failure_leaves_head() {
        let mut bytes = vec![0u8; 100];
        let mut state = test_state(&mut bytes);

        state.carve(90).unwrap();
        let err = state.carve(20).unwrap_err();
        assert_eq!(err, StorageError::OutOfSpace { requested: 20, remaining: 10 });
        assert_eq!(state.head(), 90);

        // A smaller request still fits afterwards.
        assert_eq!(state.carve(10).unwrap(), 90);
    }

    #[test]
    fn test_carve_zero_is_empty() {
        let mut bytes = vec![0u8; 16];
        let mut state = test_state(&mut bytes);

        state.carve(8).unwrap();
        assert_eq!(state.carve(0).unwrap(), 8);
        assert_eq!(state.head(), 8);
    }

    #[test]
    fn test_span_writes_land() {
        let mut bytes = vec![0u8; 32];
        {
            let mut state = test_state(&mut bytes);
            state.span_mut(4, 4).copy_from_slice(&[1, 2, 3, 4]);
        }
        assert_eq!(&bytes[4..8], &[1, 2, 3, 4]);
        assert_eq!(bytes[3], 0);
        assert_eq!(bytes[8], 0);
    }

    #[test]
    fn test_bump_within_reservation() {
        let mut range = AllocRange::new(MapId::dangling(), 256, 64);

        assert_eq!(range.bump(16).unwrap(), 0);
        assert_eq!(range.bump(16).unwrap(), 16);
        assert_eq!(range.head_pointer(), 32);
        assert_eq!(range.offset_in_map(), 288);
        assert_eq!(range.remaining(), 32);

        let err = range.bump(33).unwrap_err();
        assert_eq!(err, StorageError::OutOfSpace { requested: 33, remaining: 32 });
        assert_eq!(range.head_pointer(), 32);
    }
}
