//! Debug line batches written straight into the vertex stream.
//!
//! Lines go into mapped storage as they are pushed; there is no CPU-side
//! staging copy. A batch reserves its whole budget up front, so overflow is
//! reported at push time and never spills into neighbouring data.

use bytemuck::{Pod, Zeroable};

use crate::gpu::traits::{StorageBackend, StorageError};
use crate::storage::map::AllocRange;
use super::frame::{FrameStreams, StreamKind};

/// One endpoint of a debug line.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [u8; 4],
}

/// Draw parameters for a finished batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineDraw {
    /// First vertex of the batch within the vertex stream
    pub first_vertex: u32,
    /// Number of vertices to draw (two per line)
    pub vertex_count: u32,
}

/// A budgeted batch of debug lines for the open frame.
///
/// # Example
///
/// ```
/// use storalloc::{DummyBackend, FrameStreams, LineBatch, StreamConfig};
///
/// let mut streams = FrameStreams::new(DummyBackend::new(), &StreamConfig::minimal())?;
/// streams.begin_frame()?;
///
/// let mut batch = LineBatch::begin(&mut streams, 64)?;
/// batch.push(&mut streams, [0.0; 3], [1.0, 0.0, 0.0], [255, 0, 0, 255])?;
/// let draw = batch.finish();
/// assert_eq!(draw.vertex_count, 2);
///
/// streams.end_frame()?;
/// # Ok::<(), storalloc::StorageError>(())
/// ```
#[derive(Debug)]
pub struct LineBatch {
    range: AllocRange,
    lines: u32,
    max_lines: u32,
}

impl LineBatch {
    /// Reserve space for up to `max_lines` lines in the vertex stream.
    pub fn begin<B: StorageBackend>(
        streams: &mut FrameStreams<B>,
        max_lines: u32,
    ) -> Result<Self, StorageError> {
        let bytes = max_lines as usize * 2 * std::mem::size_of::<LineVertex>();
        let range = streams.reserve(StreamKind::Vertex, bytes)?;
        Ok(Self { range, lines: 0, max_lines })
    }

    /// Append one line. Fails once the batch budget is used up.
    pub fn push<B: StorageBackend>(
        &mut self,
        streams: &mut FrameStreams<B>,
        from: [f32; 3],
        to: [f32; 3],
        color: [u8; 4],
    ) -> Result<(), StorageError> {
        let endpoints = [
            LineVertex { position: from, color },
            LineVertex { position: to, color },
        ];
        streams
            .allocator_mut()
            .write(&mut self.range, bytemuck::cast_slice(&endpoints))?;
        self.lines += 1;
        Ok(())
    }

    /// Lines pushed so far.
    pub fn line_count(&self) -> u32 {
        self.lines
    }

    /// Lines left in the budget.
    pub fn remaining(&self) -> u32 {
        self.max_lines - self.lines
    }

    /// Close the batch and return its draw parameters.
    pub fn finish(self) -> LineDraw {
        LineDraw {
            first_vertex: (self.range.start() / std::mem::size_of::<LineVertex>()) as u32,
            vertex_count: self.lines * 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::config::StreamConfig;
    use crate::gpu::dummy::DummyBackend;

    const RED: [u8; 4] = [255, 0, 0, 255];

    fn open_streams() -> FrameStreams<DummyBackend> {
        let mut streams = FrameStreams::new(DummyBackend::new(), &StreamConfig::minimal()).unwrap();
        streams.begin_frame().unwrap();
        streams
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<LineVertex>(), 16);
    }

    #[test]
    fn test_lines_land_in_stream() {
        let mut streams = open_streams();
        let mut batch = LineBatch::begin(&mut streams, 8).unwrap();

        batch
            .push(&mut streams, [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], RED)
            .unwrap();
        batch
            .push(&mut streams, [0.0, 1.0, 0.0], [0.0, 0.0, 1.0], RED)
            .unwrap();
        assert_eq!(batch.line_count(), 2);

        let draw = batch.finish();
        assert_eq!(draw.first_vertex, 0);
        assert_eq!(draw.vertex_count, 4);

        let rid = streams.rid(StreamKind::Vertex).unwrap();
        streams.end_frame().unwrap();

        let expected = [
            LineVertex { position: [0.0, 0.0, 0.0], color: RED },
            LineVertex { position: [1.0, 0.0, 0.0], color: RED },
            LineVertex { position: [0.0, 1.0, 0.0], color: RED },
            LineVertex { position: [0.0, 0.0, 1.0], color: RED },
        ];
        let contents = streams.allocator().backend().contents(rid).unwrap();
        assert_eq!(&contents[0..64], bytemuck::cast_slice(&expected));
    }

    #[test]
    fn test_budget_is_enforced() {
        let mut streams = open_streams();
        let mut batch = LineBatch::begin(&mut streams, 2).unwrap();

        batch.push(&mut streams, [0.0; 3], [1.0; 3], RED).unwrap();
        batch.push(&mut streams, [0.0; 3], [2.0; 3], RED).unwrap();
        assert_eq!(batch.remaining(), 0);

        let err = batch.push(&mut streams, [0.0; 3], [3.0; 3], RED).unwrap_err();
        assert_eq!(err, StorageError::OutOfSpace { requested: 32, remaining: 0 });
        assert_eq!(batch.line_count(), 2);

        let draw = batch.finish();
        assert_eq!(draw.vertex_count, 4);
    }

    #[test]
    fn test_batch_after_other_geometry() {
        let mut streams = open_streams();
        streams.push(StreamKind::Vertex, &[0u8; 32]).unwrap();

        let batch = LineBatch::begin(&mut streams, 4).unwrap();
        let draw = batch.finish();
        // 32 bytes ahead of the batch = two LineVertex slots.
        assert_eq!(draw.first_vertex, 2);
        assert_eq!(draw.vertex_count, 0);
    }
}
