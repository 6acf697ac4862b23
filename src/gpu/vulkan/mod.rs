//! Vulkan storage backend
//!
//! Implements [`StorageBackend`](super::traits::StorageBackend) on top of
//! the ash crate: one `VkBuffer` plus its own `VkDeviceMemory` per storage,
//! host-visible so map ranges can be handed to the CPU.

pub mod backend;
pub mod buffer;

pub use backend::VulkanBackend;
pub use buffer::VulkanBuffer;
