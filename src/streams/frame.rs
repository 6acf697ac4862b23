//! Per-frame geometry streams.
//!
//! Owns one storage buffer per stream kind and runs them all through a
//! map / write / unmap cycle each frame. Draw code pushes typed data and
//! gets back spans it can hand to the GPU after the frame is committed.

use arrayvec::ArrayVec;
use bytemuck::Pod;

use crate::api::alloc::StorageAllocator;
use crate::api::config::StreamConfig;
use crate::gpu::traits::{MapFlags, Rid, StorageBackend, StorageError, StorageUsage};
use crate::storage::map::AllocRange;
use crate::storage::table::{MapId, StorageId};

/// Upper bound on registered streams.
pub const MAX_STREAMS: usize = 8;

/// What a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Vertex attributes
    Vertex,
    /// Index data
    Index,
    /// Per-instance entity ids for picking
    EntityId,
    /// Application-defined stream
    Custom(u8),
}

/// A span committed into a stream during the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpan {
    /// Byte offset of the span within the stream's map range
    pub offset: usize,
    /// Span length in bytes
    pub len: usize,
    /// Offset divided by the element stride, for draw calls
    pub base_index: u32,
}

struct Stream {
    kind: StreamKind,
    storage: StorageId,
    bytes: usize,
    map: Option<MapId>,
}

/// Frame-scoped streaming over a fixed set of storage buffers.
///
/// Streams are registered up front (vertex, index and entity-id streams are
/// always present) and each [`begin_frame`](FrameStreams::begin_frame) maps
/// them for writing. Pushes carve spans out of the mapped windows; nothing
/// is retained across frames and every stream starts the next frame empty.
///
/// # Example
///
/// ```
/// use storalloc::{DummyBackend, FrameStreams, StreamConfig, StreamKind};
///
/// let mut streams = FrameStreams::new(DummyBackend::new(), &StreamConfig::minimal())?;
///
/// streams.begin_frame()?;
/// let span = streams.push(StreamKind::Vertex, &[0.0f32, 1.0, 0.5])?;
/// assert_eq!(span.len, 12);
/// streams.end_frame()?;
/// # Ok::<(), storalloc::StorageError>(())
/// ```
pub struct FrameStreams<B: StorageBackend> {
    alloc: StorageAllocator<B>,
    streams: ArrayVec<Stream, MAX_STREAMS>,
    map_flags: MapFlags,
    frame: u64,
    open: bool,
}

impl<B: StorageBackend> FrameStreams<B> {
    /// Create the stream set with the vertex, index and entity-id streams.
    pub fn new(backend: B, config: &StreamConfig) -> Result<Self, StorageError> {
        let mut streams = Self {
            alloc: StorageAllocator::new(backend),
            streams: ArrayVec::new(),
            map_flags: config.map_flags,
            frame: 0,
            open: false,
        };
        streams.register(
            StreamKind::Vertex,
            config.vertex_bytes,
            StorageUsage::VERTEX | StorageUsage::DYNAMIC,
        )?;
        streams.register(
            StreamKind::Index,
            config.index_bytes,
            StorageUsage::INDEX | StorageUsage::DYNAMIC,
        )?;
        streams.register(
            StreamKind::EntityId,
            config.entity_id_bytes,
            StorageUsage::VERTEX | StorageUsage::DYNAMIC,
        )?;
        Ok(streams)
    }

    /// Register an additional stream.
    ///
    /// Streams cannot be added while a frame is open. The table holds at
    /// most [`MAX_STREAMS`] entries.
    pub fn register(
        &mut self,
        kind: StreamKind,
        bytes: usize,
        usage: StorageUsage,
    ) -> Result<(), StorageError> {
        if self.open {
            return Err(StorageError::AlreadyMapped);
        }
        if self.streams.iter().any(|s| s.kind == kind) {
            return Err(StorageError::DuplicateStream);
        }
        if self.streams.is_full() {
            return Err(StorageError::StreamLimit);
        }
        let storage = self.alloc.create_storage(bytes, usage)?;
        self.streams
            .try_push(Stream { kind, storage, bytes, map: None })
            .map_err(|_| StorageError::StreamLimit)
    }

    /// Map every stream for the coming frame.
    ///
    /// If one stream fails to map, those already mapped are released and
    /// the error is reported; the frame is not open afterwards.
    pub fn begin_frame(&mut self) -> Result<(), StorageError> {
        if self.open {
            return Err(StorageError::AlreadyMapped);
        }
        for i in 0..self.streams.len() {
            let (storage, bytes) = (self.streams[i].storage, self.streams[i].bytes);
            match self.alloc.map(storage, 0, bytes, self.map_flags) {
                Ok(map) => self.streams[i].map = Some(map),
                Err(err) => {
                    for mapped in &mut self.streams[..i] {
                        mapped.map = None;
                        let _ = self.alloc.unmap(mapped.storage);
                    }
                    storage_log!(error, "frame {} failed to open: {}", self.frame, err);
                    return Err(err);
                }
            }
        }
        self.frame += 1;
        self.open = true;
        Ok(())
    }

    /// Commit the frame: flush and unmap every stream.
    ///
    /// All spans and reservations handed out this frame are dead afterwards.
    /// The first backend error is reported, but every stream is released
    /// either way.
    pub fn end_frame(&mut self) -> Result<(), StorageError> {
        if !self.open {
            return Err(StorageError::NotMapped);
        }
        let mut first_err = None;
        for stream in &mut self.streams {
            stream.map = None;
            if let Err(err) = self.alloc.unmap(stream.storage) {
                first_err.get_or_insert(err);
            }
        }
        self.open = false;
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Reserve `size` bytes of a stream for piecewise writing.
    pub fn reserve(&mut self, kind: StreamKind, size: usize) -> Result<AllocRange, StorageError> {
        let map = self.stream_map(kind)?;
        self.alloc.alloc(map, size)
    }

    /// Push a slice of Pod elements and return the committed span.
    ///
    /// Elements land back to back at the stream head. A stream should carry
    /// one element type per frame, otherwise `base_index` is meaningless.
    pub fn push<T: Pod>(&mut self, kind: StreamKind, items: &[T]) -> Result<StreamSpan, StorageError> {
        let stride = std::mem::size_of::<T>();
        if stride == 0 {
            return Err(StorageError::InvalidSize);
        }
        let bytes: &[u8] = bytemuck::cast_slice(items);

        let map = self.stream_map(kind)?;
        let mut range = self.alloc.alloc(map, bytes.len())?;
        let offset = self.alloc.write(&mut range, bytes)?;
        debug_assert!(offset % stride == 0, "mixed strides pushed into one stream");

        Ok(StreamSpan {
            offset,
            len: bytes.len(),
            base_index: (offset / stride) as u32,
        })
    }

    /// Storage handle of a stream.
    pub fn storage(&self, kind: StreamKind) -> Result<StorageId, StorageError> {
        Ok(self.stream(kind)?.storage)
    }

    /// Backend rid of a stream, for draw submission.
    pub fn rid(&self, kind: StreamKind) -> Result<Rid, StorageError> {
        self.alloc.rid(self.stream(kind)?.storage)
    }

    /// Map handle of a stream in the open frame.
    pub fn map_id(&self, kind: StreamKind) -> Result<MapId, StorageError> {
        self.stream_map(kind)
    }

    /// Bytes left in a stream for the open frame.
    pub fn remaining(&self, kind: StreamKind) -> Result<usize, StorageError> {
        self.alloc.map_remaining(self.stream_map(kind)?)
    }

    /// Frames opened so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Whether a frame is currently open.
    pub fn is_frame_open(&self) -> bool {
        self.open
    }

    /// Number of registered streams.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Shared access to the underlying allocator.
    pub fn allocator(&self) -> &StorageAllocator<B> {
        &self.alloc
    }

    /// Exclusive access to the underlying allocator.
    pub fn allocator_mut(&mut self) -> &mut StorageAllocator<B> {
        &mut self.alloc
    }

    fn stream(&self, kind: StreamKind) -> Result<&Stream, StorageError> {
        self.streams
            .iter()
            .find(|s| s.kind == kind)
            .ok_or(StorageError::UnknownStream)
    }

    fn stream_map(&self, kind: StreamKind) -> Result<MapId, StorageError> {
        self.stream(kind)?.map.ok_or(StorageError::NotMapped)
    }
}

impl<B: StorageBackend> Drop for FrameStreams<B> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.end_frame();
        }
        for stream in &self.streams {
            let _ = self.alloc.destroy_storage(stream.storage);
        }
    }
}
