mod common;

use ember_engine::backend::headless::HeadlessBackend;
use ember_engine::device::SessionConfig;
use ember_engine::frame::FrameOutcome;
use ember_engine::lifecycle::{Lifecycle, Phase};
use ember_engine::surface::ConfigureOutcome;
use ember_engine::AcquireFailure;

use common::{Quad, running_quad};

const DT: f32 = 1.0 / 60.0;

#[test]
fn load_render_resize_render() {
    let backend = HeadlessBackend::new();
    let probe = backend.probe();
    let mut lifecycle = Lifecycle::new(SessionConfig::default());
    let mut app = Quad::default();

    lifecycle.on_load(&mut app, backend, (), 800, 600).unwrap();
    assert_eq!(lifecycle.phase(), Phase::Running);

    let vertices = app.vertices.unwrap();
    let uploaded = lifecycle.registry().buffer_handle(vertices).unwrap().contents();
    assert_eq!(uploaded, (0u8..64).collect::<Vec<_>>());

    assert_eq!(probe.configure_count(), 1);
    let config = probe.last_configure().unwrap();
    assert_eq!((config.width, config.height), (800, 600));

    // First frame.
    probe.clear();
    assert_eq!(lifecycle.on_render_tick(&mut app, DT), Ok(FrameOutcome::Presented));
    assert_eq!(probe.submit_count(), 1);
    assert_eq!(probe.present_count(), 1);
    assert_eq!(probe.configure_count(), 0);
    assert_eq!(probe.render_passes()[0].target_size, (800, 600));

    // Resize, then the next frame renders at the new size.
    assert_eq!(
        lifecycle.on_resize(400, 300),
        Ok(ConfigureOutcome::Configured { format_changed: false })
    );
    probe.clear();
    assert_eq!(lifecycle.on_render_tick(&mut app, DT), Ok(FrameOutcome::Presented));
    assert_eq!(probe.render_passes()[0].target_size, (400, 300));
    let live = lifecycle.swapchain().unwrap().config().copied().unwrap();
    assert_eq!((live.width, live.height), (400, 300));

    lifecycle.on_close().unwrap();
    assert_eq!(lifecycle.phase(), Phase::Closed);
}

#[test]
fn outdated_surface_skips_one_frame() {
    let (mut lifecycle, mut app, probe) = running_quad(SessionConfig::default(), 800, 600);
    probe.clear();
    probe.fail_next_acquire(AcquireFailure::Outdated);

    let outcome = lifecycle.on_render_tick(&mut app, DT).unwrap();
    assert_eq!(outcome, FrameOutcome::Skipped(AcquireFailure::Outdated));
    assert_eq!(probe.configure_count(), 1);
    let config = probe.last_configure().unwrap();
    assert_eq!((config.width, config.height), (800, 600));
    assert_eq!(probe.draw_count(), 0);
    assert_eq!(probe.submit_count(), 0);

    probe.clear();
    assert_eq!(lifecycle.on_render_tick(&mut app, DT), Ok(FrameOutcome::Presented));
    assert_eq!(probe.draw_count(), 1);
    assert_eq!(probe.draws()[0].pipeline, "quad");
}

#[test]
fn uniforms_written_in_update_are_visible_to_the_frame() {
    let (mut lifecycle, mut app, _probe) = running_quad(SessionConfig::default(), 64, 64);
    lifecycle.on_render_tick(&mut app, 0.5).unwrap();
    lifecycle.on_render_tick(&mut app, 0.25).unwrap();

    let uniforms = app.uniforms.unwrap();
    let contents = lifecycle.registry().buffer_handle(uniforms).unwrap().contents();
    let time: f32 = bytemuck::pod_read_unaligned(&contents[0..4]);
    assert_eq!(time, 0.75);
}

#[test]
fn minimized_window_suspends_until_restored() {
    let (mut lifecycle, mut app, probe) = running_quad(SessionConfig::default(), 800, 600);
    probe.clear();

    assert_eq!(lifecycle.on_resize(0, 0), Ok(ConfigureOutcome::Suspended));
    assert_eq!(lifecycle.on_render_tick(&mut app, DT), Ok(FrameOutcome::Suspended));
    assert_eq!(probe.configure_count(), 0);
    assert_eq!(probe.render_pass_count(), 0);

    lifecycle.on_resize(1024, 768).unwrap();
    assert_eq!(lifecycle.on_render_tick(&mut app, DT), Ok(FrameOutcome::Presented));
    assert_eq!(probe.render_passes()[0].target_size, (1024, 768));
}

#[test]
fn present_failure_reconfigures_and_continues() {
    let (mut lifecycle, mut app, probe) = running_quad(SessionConfig::default(), 800, 600);
    probe.clear();
    probe.fail_next_present();

    assert_eq!(lifecycle.on_render_tick(&mut app, DT), Ok(FrameOutcome::PresentFailed));
    assert_eq!(probe.configure_count(), 1);
    assert_eq!(lifecycle.phase(), Phase::Running);
    assert_eq!(lifecycle.on_render_tick(&mut app, DT), Ok(FrameOutcome::Presented));
}

#[test]
fn depth_attachment_follows_the_surface() {
    let config = SessionConfig::default().with_depth(wgpu::TextureFormat::Depth32Float);
    let (mut lifecycle, mut app, probe) = running_quad(config, 320, 200);
    probe.clear();

    lifecycle.on_render_tick(&mut app, DT).unwrap();
    let pass = &probe.render_passes()[0];
    assert_eq!(pass.depth_format, Some(wgpu::TextureFormat::Depth32Float));
    assert_eq!(pass.clear_color, SessionConfig::default().clear_color);
}
