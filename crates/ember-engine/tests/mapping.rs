mod common;

use ember_engine::backend::headless::HeadlessBackend;
use ember_engine::backend::{BufferDesc, MapMode};
use ember_engine::resource::ResourceRegistry;
use ember_engine::GpuError;

use common::session;

fn pattern(size: u64) -> Vec<u8> {
    (0..size).map(|i| (i * 7 % 251) as u8).collect()
}

#[test]
fn written_bytes_read_back_through_a_mapping() {
    let session = session(HeadlessBackend::new());
    let mut registry = ResourceRegistry::new();

    for size in [1u64, 16, 4096] {
        let id = registry
            .create_buffer(
                &session,
                &BufferDesc {
                    label: Some("readback"),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                },
            )
            .unwrap();
        let bytes = pattern(size);
        registry.write_buffer(&session, id, 0, &bytes).unwrap();

        let mapping = registry.map_buffer(&session, id, MapMode::Read, 0..size).unwrap();
        assert_eq!(mapping.read(), bytes, "size {size}");
        mapping.unmap();

        registry.destroy_buffer(&session, id).unwrap();
        registry.release(id).unwrap();
    }
    assert!(registry.is_empty());
}

#[test]
fn copied_bytes_read_back_through_a_mapping() {
    let session = session(HeadlessBackend::new());
    let mut registry = ResourceRegistry::new();

    for size in [16u64, 4096] {
        let bytes = pattern(size);
        let staging = registry
            .create_buffer_init(&session, Some("staging"), wgpu::BufferUsages::COPY_SRC, &bytes)
            .unwrap();
        let readback = registry
            .create_buffer(
                &session,
                &BufferDesc {
                    label: Some("readback"),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                },
            )
            .unwrap();

        registry.copy_buffer(&session, staging, 0, readback, 0, size).unwrap();
        let mapping = registry.map_buffer(&session, readback, MapMode::Read, 0..size).unwrap();
        assert_eq!(mapping.read(), bytes, "size {size}");
    }
}

#[test]
fn writes_are_rejected_while_mapped() {
    let session = session(HeadlessBackend::new());
    let mut registry = ResourceRegistry::new();
    let id = registry
        .create_buffer(
            &session,
            &BufferDesc {
                label: Some("readback"),
                size: 16,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            },
        )
        .unwrap();

    let mapping = registry.map_buffer(&session, id, MapMode::Read, 0..16).unwrap();
    std::mem::forget(mapping);
    assert_eq!(
        registry.write_buffer(&session, id, 0, &[0; 4]),
        Err(GpuError::BufferMapped("readback".into()))
    );
}
