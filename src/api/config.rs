//! Frame stream configuration.

use crate::gpu::traits::MapFlags;
use crate::util::size::{kb, mb};

/// Configuration for [`FrameStreams`](crate::FrameStreams).
///
/// Sizes are per-frame budgets; a stream that runs out mid-frame reports
/// [`StorageError::OutOfSpace`](crate::StorageError::OutOfSpace) rather
/// than growing.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Vertex stream size in bytes (default: 8 MB)
    pub vertex_bytes: usize,

    /// Index stream size in bytes (default: 4 MB)
    pub index_bytes: usize,

    /// Entity id stream size in bytes (default: 1 MB)
    pub entity_id_bytes: usize,

    /// Access flags used when streams are mapped each frame
    pub map_flags: MapFlags,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            vertex_bytes: mb(8),
            index_bytes: mb(4),
            entity_id_bytes: mb(1),
            map_flags: MapFlags::WRITE | MapFlags::INVALIDATE,
        }
    }
}

impl StreamConfig {
    /// Create a minimal config for testing or constrained environments.
    pub fn minimal() -> Self {
        Self {
            vertex_bytes: kb(64),
            index_bytes: kb(32),
            entity_id_bytes: kb(16),
            map_flags: MapFlags::WRITE | MapFlags::INVALIDATE,
        }
    }

    /// Builder pattern: set vertex stream size.
    pub fn with_vertex_bytes(mut self, size: usize) -> Self {
        self.vertex_bytes = size;
        self
    }

    /// Builder pattern: set index stream size.
    pub fn with_index_bytes(mut self, size: usize) -> Self {
        self.index_bytes = size;
        self
    }

    /// Builder pattern: set entity id stream size.
    pub fn with_entity_id_bytes(mut self, size: usize) -> Self {
        self.entity_id_bytes = size;
        self
    }

    /// Builder pattern: set map access flags.
    pub fn with_map_flags(mut self, flags: MapFlags) -> Self {
        self.map_flags = flags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.vertex_bytes, mb(8));
        assert!(config.map_flags.contains(MapFlags::WRITE));
    }

    #[test]
    fn test_builders() {
        let config = StreamConfig::minimal()
            .with_vertex_bytes(kb(128))
            .with_map_flags(MapFlags::WRITE);
        assert_eq!(config.vertex_bytes, kb(128));
        assert_eq!(config.index_bytes, kb(32));
        assert!(!config.map_flags.contains(MapFlags::INVALIDATE));
    }
}
