//! Frame streaming example
//!
//! Simulates a render loop that pushes vertices, indices and picking ids
//! through mapped storage every frame.

use bytemuck::{Pod, Zeroable};
use storalloc::{DummyBackend, FrameStreams, StorageError, StreamConfig, StreamKind};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    uv: [f32; 2],
}

struct Entity {
    id: u32,
    center: [f32; 2],
    velocity: [f32; 2],
}

impl Entity {
    fn update(&mut self, dt: f32) {
        self.center[0] += self.velocity[0] * dt;
        self.center[1] += self.velocity[1] * dt;

        // Bounce off the world border
        for axis in 0..2 {
            if self.center[axis].abs() > 50.0 {
                self.velocity[axis] = -self.velocity[axis];
            }
        }
    }

    fn quad(&self) -> [Vertex; 4] {
        let [x, y] = self.center;
        [
            Vertex { position: [x - 0.5, y - 0.5, 0.0], uv: [0.0, 0.0] },
            Vertex { position: [x + 0.5, y - 0.5, 0.0], uv: [1.0, 0.0] },
            Vertex { position: [x - 0.5, y + 0.5, 0.0], uv: [0.0, 1.0] },
            Vertex { position: [x + 0.5, y + 0.5, 0.0], uv: [1.0, 1.0] },
        ]
    }
}

fn main() -> Result<(), StorageError> {
    let mut streams = FrameStreams::new(DummyBackend::new(), &StreamConfig::default())?;

    let mut entities: Vec<Entity> = (0..200)
        .map(|i| Entity {
            id: i,
            center: [(i % 20) as f32 * 2.0 - 20.0, (i / 20) as f32 * 2.0 - 10.0],
            velocity: [(i % 7) as f32 - 3.0, (i % 5) as f32 - 2.0],
        })
        .collect();

    println!("Streaming {} entities...", entities.len());

    let dt = 1.0 / 60.0;
    for frame in 0..120 {
        for entity in &mut entities {
            entity.update(dt);
        }

        streams.begin_frame()?;

        let mut draws = 0;
        for entity in &entities {
            let verts = streams.push(StreamKind::Vertex, &entity.quad())?;
            let indices = streams.push(StreamKind::Index, &[0u16, 1, 2, 2, 1, 3])?;
            streams.push(StreamKind::EntityId, &[entity.id; 4])?;

            // A real renderer would record a draw call here:
            // draw_indexed(indices.base_index.., vertex_offset: verts.base_index)
            let _ = (verts, indices);
            draws += 1;
        }

        let vertex_left = streams.remaining(StreamKind::Vertex)?;
        streams.end_frame()?;

        if (frame + 1) % 30 == 0 {
            println!(
                "frame {:3}: {} draws, {} vertex bytes left",
                frame + 1,
                draws,
                vertex_left
            );
        }
    }

    println!("\n{}", streams.allocator().stats());
    Ok(())
}
