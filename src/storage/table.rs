//! Storage slot table with generation-checked handles.
//!
//! Handles are an index plus a generation counter. Destroying a storage (or
//! releasing a map range) bumps the matching counter, so handles held past
//! that point fail validation instead of touching recycled slots.

use crate::gpu::traits::{Rid, StorageError, StorageUsage};
use super::map::MapState;

/// Generation counter for handle validation.
type Generation = u32;

/// Handle to a storage buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageId {
    index: u32,
    generation: Generation,
}

impl StorageId {
    /// Create a dangling handle (for default initialization).
    pub const fn dangling() -> Self {
        Self { index: u32::MAX, generation: 0 }
    }

    /// Check if this is a dangling/invalid handle.
    pub fn is_dangling(&self) -> bool {
        self.index == u32::MAX
    }

    /// Get the raw index (for debugging).
    pub fn raw_index(&self) -> u32 {
        self.index
    }

    /// Get the generation (for debugging).
    pub fn raw_generation(&self) -> u32 {
        self.generation
    }
}

impl Default for StorageId {
    fn default() -> Self {
        Self::dangling()
    }
}

/// Handle to a live map range on a storage buffer.
///
/// Dies when the range is released; a later map of the same storage yields
/// a fresh handle and the old one keeps failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapId {
    index: u32,
    generation: Generation,
}

impl MapId {
    /// Create a dangling handle (for default initialization).
    pub const fn dangling() -> Self {
        Self { index: u32::MAX, generation: 0 }
    }

    /// Check if this is a dangling/invalid handle.
    pub fn is_dangling(&self) -> bool {
        self.index == u32::MAX
    }

    /// Get the raw index (for debugging).
    pub fn raw_index(&self) -> u32 {
        self.index
    }

    /// Get the generation (for debugging).
    pub fn raw_generation(&self) -> u32 {
        self.generation
    }
}

impl Default for MapId {
    fn default() -> Self {
        Self::dangling()
    }
}

/// Internal slot for one storage buffer.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) rid: Rid,
    pub(crate) size: usize,
    pub(crate) usage: StorageUsage,
    /// Storage generation, bumped when the slot is recycled
    generation: Generation,
    /// Map generation, bumped on every map of this slot
    map_generation: Generation,
    in_use: bool,
    pub(crate) map: Option<MapState>,
}

/// Slot table with free-list recycling.
pub(crate) struct StorageTable {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
}

impl StorageTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Number of live storages.
    pub(crate) fn live_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Register a freshly created buffer and return its handle.
    pub(crate) fn insert(&mut self, rid: Rid, size: usize, usage: StorageUsage) -> StorageId {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.rid = rid;
            slot.size = size;
            slot.usage = usage;
            slot.generation = slot.generation.wrapping_add(1);
            slot.in_use = true;
            slot.map = None;
            StorageId { index, generation: slot.generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                rid,
                size,
                usage,
                generation: 1,
                map_generation: 0,
                in_use: true,
                map: None,
            });
            StorageId { index, generation: 1 }
        }
    }

    /// Unregister a storage and return the rid to destroy.
    ///
    /// Fails with [`StorageError::MapStillLive`] while a map range exists.
    pub(crate) fn remove(&mut self, id: StorageId) -> Result<Rid, StorageError> {
        let slot = self.slot_mut(id)?;
        if slot.map.is_some() {
            return Err(StorageError::MapStillLive);
        }
        slot.in_use = false;
        let rid = slot.rid;
        self.free_list.push(id.index);
        Ok(rid)
    }

    pub(crate) fn slot(&self, id: StorageId) -> Result<&Slot, StorageError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.in_use && slot.generation == id.generation)
            .ok_or(StorageError::StaleHandle)
    }

    pub(crate) fn slot_mut(&mut self, id: StorageId) -> Result<&mut Slot, StorageError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.in_use && slot.generation == id.generation)
            .ok_or(StorageError::StaleHandle)
    }

    /// Check if a storage handle is still valid.
    pub(crate) fn is_valid(&self, id: StorageId) -> bool {
        self.slot(id).is_ok()
    }

    /// Attach a map range to a storage and return its handle.
    pub(crate) fn attach_map(
        &mut self,
        id: StorageId,
        state: MapState,
    ) -> Result<MapId, StorageError> {
        let index = id.index;
        let slot = self.slot_mut(id)?;
        if slot.map.is_some() {
            return Err(StorageError::AlreadyMapped);
        }
        slot.map_generation = slot.map_generation.wrapping_add(1);
        slot.map = Some(state);
        Ok(MapId { index, generation: slot.map_generation })
    }

    /// Detach the live map range from a storage.
    pub(crate) fn detach_map(&mut self, id: StorageId) -> Result<MapState, StorageError> {
        let slot = self.slot_mut(id)?;
        slot.map.take().ok_or(StorageError::NotMapped)
    }

    pub(crate) fn map_state(&self, id: MapId) -> Result<&MapState, StorageError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.in_use && slot.map_generation == id.generation)
            .and_then(|slot| slot.map.as_ref())
            .ok_or(StorageError::StaleHandle)
    }

    pub(crate) fn map_state_mut(&mut self, id: MapId) -> Result<&mut MapState, StorageError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.in_use && slot.map_generation == id.generation)
            .and_then(|slot| slot.map.as_mut())
            .ok_or(StorageError::StaleHandle)
    }

    /// Rid behind a live map range, for backend calls.
    pub(crate) fn map_rid(&self, id: MapId) -> Result<Rid, StorageError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.in_use && slot.map_generation == id.generation && slot.map.is_some())
            .map(|slot| slot.rid)
            .ok_or(StorageError::StaleHandle)
    }

    /// Tear the whole table down, yielding what must be released.
    pub(crate) fn take_all(&mut self) -> Vec<(Rid, bool)> {
        let live = self
            .slots
            .iter()
            .filter(|slot| slot.in_use)
            .map(|slot| (slot.rid, slot.map.is_some()))
            .collect();
        self.slots.clear();
        self.free_list.clear();
        live
    }
}
