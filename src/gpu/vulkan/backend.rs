//! [`StorageBackend`] implementation on top of ash.

use std::collections::HashMap;
use std::sync::Arc;

use super::super::traits::{MapFlags, Mapping, Rid, StorageBackend, StorageError, StorageUsage};
use super::buffer::VulkanBuffer;

/// Vulkan storage backend.
///
/// Each storage is one `VkBuffer` with its own `VkDeviceMemory` allocation
/// in host-visible memory, so map windows come straight from `vkMapMemory`.
///
/// The backend borrows nothing from the caller: it clones the device handle
/// and snapshots the physical-device memory properties at construction.
pub struct VulkanBackend {
    device: Arc<ash::Device>,
    memory_properties: ash::vk::PhysicalDeviceMemoryProperties,
    non_coherent_atom_size: u64,
    buffers: HashMap<u64, VulkanBuffer>,
    next_rid: u64,
}

impl VulkanBackend {
    /// Create a backend for `device`.
    ///
    /// `instance` and `physical_device` are only used to query memory
    /// properties; the backend keeps no reference to them.
    pub fn new(
        device: Arc<ash::Device>,
        instance: &ash::Instance,
        physical_device: ash::vk::PhysicalDevice,
    ) -> Self {
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let limits = unsafe { instance.get_physical_device_properties(physical_device).limits };
        Self {
            device,
            memory_properties,
            non_coherent_atom_size: limits.non_coherent_atom_size.max(1),
            buffers: HashMap::new(),
            next_rid: 1,
        }
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Raw Vulkan buffer handle for `rid`, e.g. for binding at draw time.
    pub fn vk_buffer(&self, rid: Rid) -> Option<ash::vk::Buffer> {
        self.buffers.get(&rid.to_raw()).map(|b| b.vk_buffer)
    }

    fn buffer(&self, rid: Rid) -> Result<&VulkanBuffer, StorageError> {
        self.buffers
            .get(&rid.to_raw())
            .ok_or_else(|| StorageError::Backend(format!("no buffer for rid {}", rid.to_raw())))
    }

    fn buffer_mut(&mut self, rid: Rid) -> Result<&mut VulkanBuffer, StorageError> {
        self.buffers
            .get_mut(&rid.to_raw())
            .ok_or_else(|| StorageError::Backend(format!("no buffer for rid {}", rid.to_raw())))
    }
}

impl StorageBackend for VulkanBackend {
    fn create_buffer(&mut self, size: usize, usage: StorageUsage) -> Result<Rid, StorageError> {
        if size == 0 {
            return Err(StorageError::InvalidSize);
        }
        let buffer = VulkanBuffer::new(
            self.device.clone(),
            &self.memory_properties,
            self.non_coherent_atom_size,
            size,
            usage,
        )?;
        let rid = Rid::new(self.next_rid);
        self.next_rid += 1;
        self.buffers.insert(rid.to_raw(), buffer);
        Ok(rid)
    }

    fn destroy_buffer(&mut self, rid: Rid) {
        // VulkanBuffer::drop unmaps if a mapping is still live.
        self.buffers.remove(&rid.to_raw());
    }

    fn map_buffer(
        &mut self,
        rid: Rid,
        offset: usize,
        size: usize,
        flags: MapFlags,
    ) -> Result<Mapping, StorageError> {
        if size == 0 {
            return Err(StorageError::InvalidSize);
        }
        if !flags.contains(MapFlags::READ) && !flags.contains(MapFlags::WRITE) {
            return Err(StorageError::UnsupportedUsage);
        }
        let buffer = self.buffer_mut(rid)?;
        if offset
            .checked_add(size)
            .map_or(true, |end| end > buffer.size())
        {
            return Err(StorageError::OutOfBounds {
                offset,
                size,
                capacity: buffer.size(),
            });
        }

        let (ptr, capacity) = buffer.map(offset, size)?;
        // Non-coherent memory must be invalidated before reading GPU writes.
        if flags.contains(MapFlags::READ) {
            if let Err(e) = buffer.invalidate(offset, size) {
                let _ = buffer.unmap();
                return Err(e);
            }
        }
        Ok(Mapping { ptr, capacity })
    }

    fn flush_range(&mut self, rid: Rid, offset: usize, size: usize) -> Result<(), StorageError> {
        self.buffer(rid)?.flush(offset, size)
    }

    fn unmap_buffer(&mut self, rid: Rid) -> Result<(), StorageError> {
        self.buffer_mut(rid)?.unmap()
    }
}
