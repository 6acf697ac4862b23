//! Integration tests for storalloc.

use bytemuck::{Pod, Zeroable};
use storalloc::{
    DummyBackend, FrameStreams, LineBatch, MapFlags, StorageAllocator, StorageError,
    StorageUsage, StreamConfig, StreamKind,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct MeshVertex {
    position: [f32; 3],
    uv: [f32; 2],
}

fn quad_vertices(z: f32) -> [MeshVertex; 4] {
    [
        MeshVertex { position: [0.0, 0.0, z], uv: [0.0, 0.0] },
        MeshVertex { position: [1.0, 0.0, z], uv: [1.0, 0.0] },
        MeshVertex { position: [0.0, 1.0, z], uv: [0.0, 1.0] },
        MeshVertex { position: [1.0, 1.0, z], uv: [1.0, 1.0] },
    ]
}

#[test]
fn test_full_map_cycle() {
    let mut alloc = StorageAllocator::new(DummyBackend::new());
    let storage = alloc
        .create_storage(1024, StorageUsage::VERTEX | StorageUsage::DYNAMIC)
        .unwrap();

    let map = alloc.map(storage, 0, 1024, MapFlags::WRITE).unwrap();

    let a = alloc.alloc(map, 64).unwrap();
    let mut b = alloc.alloc(map, 64).unwrap();
    assert_eq!(a.start(), 0);
    assert_eq!(b.start(), 64);

    // An oversized request fails and leaves the head where it was.
    let err = alloc.alloc(map, 1000).unwrap_err();
    assert_eq!(err, StorageError::OutOfSpace { requested: 1000, remaining: 896 });
    assert_eq!(alloc.map_head(map).unwrap(), 128);

    alloc.unmap(storage).unwrap();

    // Every handle into the released range is dead.
    assert_eq!(alloc.alloc(map, 64).unwrap_err(), StorageError::StaleHandle);
    assert_eq!(alloc.suballoc(&mut b, 8).unwrap_err(), StorageError::StaleHandle);
    assert_eq!(alloc.unmap(storage).unwrap_err(), StorageError::NotMapped);

    alloc.destroy_storage(storage).unwrap();
}

#[test]
fn test_rounded_map_capacity_is_usable() {
    let mut alloc = StorageAllocator::new(DummyBackend::with_granularity(256));
    let id = alloc.create_storage(1024, StorageUsage::VERTEX).unwrap();

    let map = alloc.map(id, 0, 100, MapFlags::WRITE).unwrap();
    assert_eq!(alloc.map_size(map).unwrap(), 100);
    assert_eq!(alloc.map_capacity(map).unwrap(), 256);

    // Reservations may use the rounded-up space.
    alloc.alloc(map, 256).unwrap();
    let err = alloc.alloc(map, 1).unwrap_err();
    assert_eq!(err, StorageError::OutOfSpace { requested: 1, remaining: 0 });

    alloc.unmap(id).unwrap();
}

#[test]
fn test_reservation_cursors_are_independent() {
    let mut alloc = StorageAllocator::new(DummyBackend::new());
    let id = alloc.create_storage(256, StorageUsage::VERTEX).unwrap();
    let map = alloc.map(id, 0, 256, MapFlags::WRITE).unwrap();

    let mut a = alloc.alloc(map, 128).unwrap();
    let mut b = alloc.alloc(map, 128).unwrap();

    // Writing through b does not move a's cursor.
    alloc.write(&mut b, &[2u8; 64]).unwrap();
    assert_eq!(a.head_pointer(), 0);
    assert_eq!(b.head_pointer(), 64);

    alloc.write(&mut a, &[1u8; 128]).unwrap();
    assert_eq!(
        alloc.suballoc(&mut a, 1).unwrap_err(),
        StorageError::OutOfSpace { requested: 1, remaining: 0 }
    );
    alloc.write(&mut b, &[3u8; 64]).unwrap();

    let rid = alloc.rid(id).unwrap();
    alloc.unmap(id).unwrap();
    let contents = alloc.backend().contents(rid).unwrap();
    assert_eq!(&contents[0..128], &[1u8; 128]);
    assert_eq!(&contents[128..192], &[2u8; 64]);
    assert_eq!(&contents[192..256], &[3u8; 64]);
}

#[test]
fn test_windowed_map_lands_at_absolute_offset() {
    let mut alloc = StorageAllocator::new(DummyBackend::new());
    let id = alloc.create_storage(1024, StorageUsage::STAGING).unwrap();

    let map = alloc.map(id, 256, 512, MapFlags::WRITE).unwrap();
    let mut range = alloc.alloc(map, 64).unwrap();
    let offset = alloc.write(&mut range, &[0x5A; 64]).unwrap();
    assert_eq!(offset, 0);

    let rid = alloc.rid(id).unwrap();
    alloc.unmap(id).unwrap();

    // The window starts 256 bytes into the buffer.
    let contents = alloc.backend().contents(rid).unwrap();
    assert_eq!(&contents[256..320], &[0x5A; 64]);
    assert!(contents[..256].iter().all(|&b| b == 0));

    let flushes = alloc.backend().flushes();
    assert_eq!(flushes.len(), 1);
    assert_eq!(flushes[0].offset, 256);
    assert_eq!(flushes[0].size, 64);
}

#[test]
fn test_unmap_only_touches_its_storage() {
    let mut alloc = StorageAllocator::new(DummyBackend::new());
    let a = alloc.create_storage(256, StorageUsage::VERTEX).unwrap();
    let b = alloc.create_storage(256, StorageUsage::INDEX).unwrap();

    let map_a = alloc.map(a, 0, 256, MapFlags::WRITE).unwrap();
    alloc.map(b, 0, 256, MapFlags::WRITE).unwrap();

    alloc.unmap(b).unwrap();
    assert_eq!(alloc.unmap(b).unwrap_err(), StorageError::NotMapped);

    // The failed unmap left a's range untouched.
    let mut range = alloc.alloc(map_a, 64).unwrap();
    alloc.write(&mut range, &[1u8; 64]).unwrap();
    alloc.unmap(a).unwrap();
}

#[test]
fn test_destroy_semantics() {
    let mut alloc = StorageAllocator::new(DummyBackend::new());
    let id = alloc.create_storage(128, StorageUsage::VERTEX).unwrap();
    alloc.map(id, 0, 128, MapFlags::WRITE).unwrap();

    // Mapped storages cannot be destroyed.
    assert_eq!(alloc.destroy_storage(id).unwrap_err(), StorageError::MapStillLive);
    assert!(alloc.is_valid(id));

    alloc.unmap(id).unwrap();
    alloc.destroy_storage(id).unwrap();
    assert!(!alloc.is_valid(id));
    assert_eq!(alloc.backend().buffer_count(), 0);
}

#[test]
fn test_destroyed_slot_recycled_with_fresh_generation() {
    let mut alloc = StorageAllocator::new(DummyBackend::new());
    let first = alloc.create_storage(128, StorageUsage::VERTEX).unwrap();
    alloc.destroy_storage(first).unwrap();

    let second = alloc.create_storage(256, StorageUsage::INDEX).unwrap();
    assert_ne!(first, second);
    assert!(!alloc.is_valid(first));
    assert!(alloc.is_valid(second));
    assert_eq!(alloc.storage_size(first).unwrap_err(), StorageError::StaleHandle);
    assert_eq!(alloc.storage_size(second).unwrap(), 256);
}

#[test]
fn test_map_scope_commits_on_drop() {
    let mut alloc = StorageAllocator::new(DummyBackend::new());
    let storage = alloc.create_storage(512, StorageUsage::STAGING).unwrap();
    let rid = alloc.rid(storage).unwrap();

    {
        let mut scope = alloc.map_scope(storage, 0, 512, MapFlags::WRITE).unwrap();
        let mut range = scope.alloc(32).unwrap();
        scope.write(&mut range, &[0xEE; 32]).unwrap();
    }

    assert!(!alloc.is_mapped(storage));
    assert_eq!(&alloc.backend().contents(rid).unwrap()[0..32], &[0xEE; 32]);
    assert_eq!(alloc.backend().flushes().len(), 1);
}

#[test]
fn test_mesh_upload_with_entity_ids() {
    let mut streams = FrameStreams::new(DummyBackend::new(), &StreamConfig::minimal()).unwrap();
    streams.begin_frame().unwrap();

    // First mesh: a quad, six indices, one picking id per vertex.
    let verts = streams.push(StreamKind::Vertex, &quad_vertices(0.0)).unwrap();
    let indices = streams.push(StreamKind::Index, &[0u16, 1, 2, 2, 1, 3]).unwrap();
    let ids = streams.push(StreamKind::EntityId, &[7u32; 4]).unwrap();
    assert_eq!(verts.base_index, 0);
    assert_eq!(indices.len, 12);
    assert_eq!(ids.base_index, 0);

    // Second mesh lands behind the first in every stream.
    let verts2 = streams.push(StreamKind::Vertex, &quad_vertices(1.0)).unwrap();
    let ids2 = streams.push(StreamKind::EntityId, &[8u32; 4]).unwrap();
    assert_eq!(verts2.offset, 80);
    assert_eq!(verts2.base_index, 4);
    assert_eq!(ids2.base_index, 4);

    let vertex_rid = streams.rid(StreamKind::Vertex).unwrap();
    let index_rid = streams.rid(StreamKind::Index).unwrap();
    let id_rid = streams.rid(StreamKind::EntityId).unwrap();
    streams.end_frame().unwrap();

    let backend = streams.allocator().backend();
    let vertex_bytes = backend.contents(vertex_rid).unwrap();
    assert_eq!(&vertex_bytes[0..80], bytemuck::cast_slice(&quad_vertices(0.0)));
    assert_eq!(&vertex_bytes[80..160], bytemuck::cast_slice(&quad_vertices(1.0)));
    let index_bytes = backend.contents(index_rid).unwrap();
    assert_eq!(&index_bytes[0..12], bytemuck::cast_slice(&[0u16, 1, 2, 2, 1, 3]));
    let id_bytes = backend.contents(id_rid).unwrap();
    assert_eq!(&id_bytes[0..32], bytemuck::cast_slice(&[7u32, 7, 7, 7, 8, 8, 8, 8]));
}

#[test]
fn test_frame_stream_cycling() {
    let mut streams = FrameStreams::new(DummyBackend::new(), &StreamConfig::minimal()).unwrap();
    let rid_before = streams.rid(StreamKind::Vertex).unwrap();

    streams.begin_frame().unwrap();
    let stale_map = streams.map_id(StreamKind::Vertex).unwrap();
    let first = streams.push(StreamKind::Vertex, &[1.0f32; 4]).unwrap();
    streams.end_frame().unwrap();

    streams.begin_frame().unwrap();
    let second = streams.push(StreamKind::Vertex, &[2.0f32; 4]).unwrap();

    // Same storage across frames, fresh map range and cursor.
    assert_eq!(streams.rid(StreamKind::Vertex).unwrap(), rid_before);
    assert_eq!(first.offset, 0);
    assert_eq!(second.offset, 0);
    assert_eq!(
        streams.allocator_mut().alloc(stale_map, 16).unwrap_err(),
        StorageError::StaleHandle
    );

    streams.end_frame().unwrap();
    assert_eq!(streams.frame(), 2);
}

#[test]
fn test_line_batch_draw_parameters() {
    let mut streams = FrameStreams::new(DummyBackend::new(), &StreamConfig::minimal()).unwrap();
    streams.begin_frame().unwrap();

    // 64 bytes of mesh data ahead of the batch (four 16-byte line slots).
    streams.push(StreamKind::Vertex, &[0u8; 64]).unwrap();

    let mut batch = LineBatch::begin(&mut streams, 4).unwrap();
    batch
        .push(&mut streams, [0.0; 3], [1.0, 0.0, 0.0], [255, 0, 0, 255])
        .unwrap();
    batch
        .push(&mut streams, [0.0; 3], [0.0, 1.0, 0.0], [0, 255, 0, 255])
        .unwrap();
    assert_eq!(batch.remaining(), 2);

    let draw = batch.finish();
    assert_eq!(draw.first_vertex, 4);
    assert_eq!(draw.vertex_count, 4);

    // Later pushes land behind the whole reserved budget.
    let span = streams.push(StreamKind::Vertex, &[0u8; 16]).unwrap();
    assert_eq!(span.offset, 64 + 4 * 2 * 16);
    streams.end_frame().unwrap();
}

#[test]
fn test_stress_rapid_map_cycling() {
    let mut alloc = StorageAllocator::new(DummyBackend::new());
    let id = alloc
        .create_storage(4096, StorageUsage::VERTEX | StorageUsage::DYNAMIC)
        .unwrap();

    for i in 0..1000u64 {
        let map = alloc.map(id, 0, 4096, MapFlags::WRITE).unwrap();
        let mut range = alloc.alloc(map, 256).unwrap();
        alloc.write(&mut range, &[(i % 251) as u8; 256]).unwrap();
        alloc.unmap(id).unwrap();
    }

    let stats = alloc.stats();
    assert_eq!(stats.maps, 1000);
    assert_eq!(stats.unmaps, 1000);
    assert_eq!(stats.reservations, 1000);
    assert_eq!(stats.bytes_written, 256 * 1000);
    assert_eq!(stats.live_maps(), 0);
}

#[test]
fn test_stress_many_frames() {
    let mut streams = FrameStreams::new(DummyBackend::new(), &StreamConfig::minimal()).unwrap();

    for frame in 0..100u32 {
        streams.begin_frame().unwrap();
        for mesh in 0..20u32 {
            let span = streams
                .push(StreamKind::Vertex, &[frame as f32, mesh as f32])
                .unwrap();
            assert_eq!(span.offset, mesh as usize * 8);
        }
        streams.push(StreamKind::EntityId, &[frame; 16]).unwrap();
        streams.end_frame().unwrap();
    }

    assert_eq!(streams.frame(), 100);
    let stats = streams.allocator().stats();
    assert_eq!(stats.live_maps(), 0);
    assert_eq!(stats.failed_allocs, 0);
}

#[test]
fn test_config_default_budgets() {
    let mut streams = FrameStreams::new(DummyBackend::new(), &StreamConfig::default()).unwrap();
    streams.begin_frame().unwrap();

    // The default vertex budget holds a large mesh in one push.
    let big = vec![0u8; 1 << 20];
    streams.push(StreamKind::Vertex, &big).unwrap();
    streams.end_frame().unwrap();
}
