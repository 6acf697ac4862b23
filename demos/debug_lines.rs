//! Debug line example
//!
//! Draws a ground grid and world axes as a budgeted line batch written
//! straight into the vertex stream.

use storalloc::{DummyBackend, FrameStreams, LineBatch, StorageError, StreamConfig, StreamKind};

const GRAY: [u8; 4] = [128, 128, 128, 255];
const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

fn main() -> Result<(), StorageError> {
    let mut streams = FrameStreams::new(DummyBackend::new(), &StreamConfig::minimal())?;
    streams.begin_frame()?;

    // Scene geometry goes first; the batch lands behind it.
    streams.push(StreamKind::Vertex, &[0u8; 256])?;

    let mut batch = LineBatch::begin(&mut streams, 24)?;

    // Ground grid on the XZ plane, 10 x 10 cells.
    for i in 0..=10 {
        let t = i as f32 - 5.0;
        batch.push(&mut streams, [t, 0.0, -5.0], [t, 0.0, 5.0], GRAY)?;
        batch.push(&mut streams, [-5.0, 0.0, t], [5.0, 0.0, t], GRAY)?;
    }
    println!("grid: {} lines, {} left in budget", batch.line_count(), batch.remaining());

    // World axes.
    batch.push(&mut streams, [0.0; 3], [2.0, 0.0, 0.0], RED)?;
    batch.push(&mut streams, [0.0; 3], [0.0, 2.0, 0.0], GREEN)?;

    // The budget is spent; the z axis does not fit.
    match batch.push(&mut streams, [0.0; 3], [0.0, 0.0, 2.0], BLUE) {
        Err(err) => println!("z axis dropped: {}", err),
        Ok(()) => unreachable!(),
    }

    let draw = batch.finish();
    println!(
        "draw: first_vertex={} vertex_count={}",
        draw.first_vertex, draw.vertex_count
    );

    streams.end_frame()?;
    println!("\n{}", streams.allocator().stats());
    Ok(())
}
