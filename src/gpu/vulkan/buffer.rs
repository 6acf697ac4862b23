//! Vulkan buffer with its backing device memory.

use std::ptr::NonNull;
use std::sync::Arc;

use super::super::traits::{StorageError, StorageUsage};

/// A Vulkan buffer bound to one dedicated device-memory allocation.
///
/// The memory is always host-visible so the whole buffer can be mapped;
/// host-coherent memory is preferred, in which case flushes are no-ops.
pub struct VulkanBuffer {
    /// Raw Vulkan buffer handle
    pub vk_buffer: ash::vk::Buffer,
    /// Raw Vulkan device memory handle
    pub vk_memory: ash::vk::DeviceMemory,
    size: usize,
    memory_size: u64,
    atom_size: u64,
    host_coherent: bool,
    mapped: bool,
    device: Arc<ash::Device>,
}

impl VulkanBuffer {
    /// Create a buffer of `size` bytes in host-visible memory.
    ///
    /// `atom_size` is the device's `nonCoherentAtomSize`; flush and
    /// invalidate ranges are rounded to it.
    pub fn new(
        device: Arc<ash::Device>,
        memory_properties: &ash::vk::PhysicalDeviceMemoryProperties,
        atom_size: u64,
        size: usize,
        usage: StorageUsage,
    ) -> Result<Self, StorageError> {
        let vk_usage = buffer_usage_flags(usage);
        if vk_usage.is_empty() {
            return Err(StorageError::UnsupportedUsage);
        }

        let buffer_info = ash::vk::BufferCreateInfo::builder()
            .size(size as u64)
            .usage(vk_usage)
            .sharing_mode(ash::vk::SharingMode::EXCLUSIVE);

        let vk_buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(|e| StorageError::Backend(format!("vkCreateBuffer: {}", e)))?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(vk_buffer) };

        let (memory_type_index, host_coherent) =
            match find_memory_type(memory_properties, requirements.memory_type_bits) {
                Some(found) => found,
                None => {
                    unsafe { device.destroy_buffer(vk_buffer, None) };
                    return Err(StorageError::UnsupportedUsage);
                }
            };

        let alloc_info = ash::vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let vk_memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(vk_buffer, None) };
                return Err(StorageError::Backend(format!("vkAllocateMemory: {}", e)));
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(vk_buffer, vk_memory, 0) } {
            unsafe {
                device.free_memory(vk_memory, None);
                device.destroy_buffer(vk_buffer, None);
            }
            return Err(StorageError::Backend(format!("vkBindBufferMemory: {}", e)));
        }

        Ok(Self {
            vk_buffer,
            vk_memory,
            size,
            memory_size: requirements.size,
            atom_size: atom_size.max(1),
            host_coherent,
            mapped: false,
            device,
        })
    }

    /// Buffer size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether a CPU mapping is currently live.
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Map `size` bytes starting at `offset`.
    ///
    /// The mapped window is widened to `nonCoherentAtomSize` boundaries so
    /// flush and invalidate ranges stay inside it. Returns the pointer at
    /// `offset` and the usable capacity, which may exceed `size` up to the
    /// end of the buffer.
    pub(crate) fn map(
        &mut self,
        offset: usize,
        size: usize,
    ) -> Result<(NonNull<u8>, usize), StorageError> {
        if self.mapped {
            return Err(StorageError::Backend("buffer already mapped".to_string()));
        }
        let start = offset as u64 / self.atom_size * self.atom_size;
        let end = (offset as u64 + size as u64 + self.atom_size - 1) / self.atom_size
            * self.atom_size;
        let end = end.min(self.memory_size);

        let base = unsafe {
            self.device
                .map_memory(
                    self.vk_memory,
                    start,
                    end - start,
                    ash::vk::MemoryMapFlags::empty(),
                )
                .map_err(|e| StorageError::Backend(format!("vkMapMemory: {}", e)))?
        };
        let base = NonNull::new(base as *mut u8)
            .ok_or_else(|| StorageError::Backend("vkMapMemory returned null".to_string()))?;

        let ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(offset - start as usize)) };
        let capacity = (end.min(self.size as u64) - offset as u64) as usize;
        self.mapped = true;
        Ok((ptr, capacity))
    }

    /// Release the live mapping.
    pub(crate) fn unmap(&mut self) -> Result<(), StorageError> {
        if !self.mapped {
            return Err(StorageError::NotMapped);
        }
        unsafe { self.device.unmap_memory(self.vk_memory) };
        self.mapped = false;
        Ok(())
    }

    /// Make CPU writes in `[offset, offset + size)` visible to the GPU.
    ///
    /// Host-coherent memory needs no flush.
    pub(crate) fn flush(&self, offset: usize, size: usize) -> Result<(), StorageError> {
        if !self.mapped {
            return Err(StorageError::NotMapped);
        }
        if self.host_coherent {
            return Ok(());
        }

        let range = self.coherency_range(offset, size);
        unsafe {
            self.device
                .flush_mapped_memory_ranges(&[range])
                .map_err(|e| StorageError::Backend(format!("vkFlushMappedMemoryRanges: {}", e)))
        }
    }

    /// Make GPU writes in `[offset, offset + size)` visible to the CPU.
    ///
    /// Host-coherent memory needs no invalidate.
    pub(crate) fn invalidate(&self, offset: usize, size: usize) -> Result<(), StorageError> {
        if !self.mapped {
            return Err(StorageError::NotMapped);
        }
        if self.host_coherent {
            return Ok(());
        }

        let range = self.coherency_range(offset, size);
        unsafe {
            self.device
                .invalidate_mapped_memory_ranges(&[range])
                .map_err(|e| {
                    StorageError::Backend(format!("vkInvalidateMappedMemoryRanges: {}", e))
                })
        }
    }

    /// Mapped-memory range covering `[offset, offset + size)`.
    ///
    /// Flush and invalidate ranges must be `nonCoherentAtomSize`-aligned or
    /// reach the end of the allocation, so the window is widened to atom
    /// boundaries and clamped to the allocation size.
    fn coherency_range(&self, offset: usize, size: usize) -> ash::vk::MappedMemoryRange {
        let start = offset as u64 / self.atom_size * self.atom_size;
        let end = (offset as u64 + size as u64 + self.atom_size - 1) / self.atom_size
            * self.atom_size;
        let end = end.min(self.memory_size);

        ash::vk::MappedMemoryRange::builder()
            .memory(self.vk_memory)
            .offset(start)
            .size(end - start)
            .build()
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.mapped {
                self.device.unmap_memory(self.vk_memory);
            }
            self.device.free_memory(self.vk_memory, None);
            self.device.destroy_buffer(self.vk_buffer, None);
        }
    }
}

/// Translate storage usage flags into Vulkan buffer usage.
fn buffer_usage_flags(usage: StorageUsage) -> ash::vk::BufferUsageFlags {
    let mut flags = ash::vk::BufferUsageFlags::empty();
    if usage.contains(StorageUsage::VERTEX) {
        flags |= ash::vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(StorageUsage::INDEX) {
        flags |= ash::vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(StorageUsage::UNIFORM) {
        flags |= ash::vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(StorageUsage::STAGING) {
        flags |= ash::vk::BufferUsageFlags::TRANSFER_SRC;
    }
    flags
}

/// Find a host-visible memory type allowed by `type_filter`.
///
/// Returns the type index and whether it is host-coherent; coherent memory
/// is preferred so unmap needs no flush.
fn find_memory_type(
    memory_properties: &ash::vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
) -> Option<(u32, bool)> {
    let required = ash::vk::MemoryPropertyFlags::HOST_VISIBLE;
    let preferred = required | ash::vk::MemoryPropertyFlags::HOST_COHERENT;
    let types = &memory_properties.memory_types[..memory_properties.memory_type_count as usize];

    for (i, mem_type) in types.iter().enumerate() {
        if type_filter & (1 << i) != 0 && mem_type.property_flags.contains(preferred) {
            return Some((i as u32, true));
        }
    }
    for (i, mem_type) in types.iter().enumerate() {
        if type_filter & (1 << i) != 0 && mem_type.property_flags.contains(required) {
            return Some((i as u32, false));
        }
    }
    None
}
