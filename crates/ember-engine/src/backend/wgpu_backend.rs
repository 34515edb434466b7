use std::future::Future;
use std::marker::PhantomData;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::mpsc;

use wgpu::util::align_to;

use super::{
    AdapterOptions, AdapterReport, Backend, BindingLayoutEntry, BufferDesc, DeviceRequest,
    MapMode, MapRange, NativeBindGroupEntry, NativeBinding, NativePass, NativePipelineDesc,
    PresentFailure, SamplerDesc, ShaderSource, SurfaceCaps, SurfaceConfig, TexelLayout,
    TextureDesc, TextureRegion, ViewDesc,
};
use crate::device::ErrorSink;
use crate::error::{AcquireFailure, GpuError, Result};
use crate::frame::Draw;
use crate::pipeline::VertexBufferLayout;

/// Native backend on top of wgpu.
///
/// `'w` is the lifetime of the window the surface presents to; the surface
/// borrows it, so the window must outlive every session created here.
#[derive(Debug, Clone, Copy)]
pub struct WgpuBackend<'w> {
    backends: wgpu::Backends,
    _window: PhantomData<&'w ()>,
}

impl WgpuBackend<'_> {
    pub fn new(backends: wgpu::Backends) -> Self {
        Self {
            backends,
            _window: PhantomData,
        }
    }
}

/// Mapped ranges must span whole words.
fn word_aligned(range: &MapRange) -> MapRange {
    range.start..align_to(range.end, wgpu::COPY_BUFFER_ALIGNMENT)
}

fn map_surface_error(err: wgpu::SurfaceError) -> AcquireFailure {
    match err {
        wgpu::SurfaceError::Timeout => AcquireFailure::Timeout,
        wgpu::SurfaceError::Outdated => AcquireFailure::Outdated,
        wgpu::SurfaceError::Lost => AcquireFailure::Lost,
        wgpu::SurfaceError::OutOfMemory => AcquireFailure::OutOfMemory,
        // Unspecified surface trouble; actual device loss arrives through the lost callback.
        wgpu::SurfaceError::Other => AcquireFailure::Lost,
    }
}

impl<'w> Backend for WgpuBackend<'w> {
    type Target = wgpu::SurfaceTarget<'w>;

    type Instance = wgpu::Instance;
    type Surface = wgpu::Surface<'w>;
    type Adapter = wgpu::Adapter;
    type Device = wgpu::Device;
    type Queue = wgpu::Queue;

    type Buffer = wgpu::Buffer;
    type Texture = wgpu::Texture;
    type TextureView = wgpu::TextureView;
    type Sampler = wgpu::Sampler;
    type ShaderModule = wgpu::ShaderModule;
    type BindGroupLayout = wgpu::BindGroupLayout;
    type BindGroup = wgpu::BindGroup;
    type Pipeline = wgpu::RenderPipeline;

    type SurfaceTexture = wgpu::SurfaceTexture;
    type Encoder = wgpu::CommandEncoder;
    type CommandBuffer = wgpu::CommandBuffer;

    fn create_instance(&self) -> Result<Self::Instance> {
        Ok(wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: self.backends,
            ..Default::default()
        }))
    }

    fn create_surface(
        &self,
        instance: &Self::Instance,
        target: Self::Target,
    ) -> Result<Self::Surface> {
        instance
            .create_surface(target)
            .map_err(|e| GpuError::SurfaceUnavailable(e.to_string()))
    }

    fn request_adapter<'a>(
        &'a self,
        instance: &'a Self::Instance,
        surface: &'a Self::Surface,
        options: AdapterOptions,
    ) -> impl Future<Output = Result<Self::Adapter>> + 'a {
        async move {
            instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: options.power_preference,
                    compatible_surface: Some(surface),
                    force_fallback_adapter: options.force_fallback_adapter,
                })
                .await
                .map_err(|e| GpuError::AdapterUnavailable(e.to_string()))
        }
    }

    fn adapter_report(&self, adapter: &Self::Adapter) -> AdapterReport {
        let info = adapter.get_info();
        AdapterReport {
            name: info.name,
            vendor: info.vendor,
            device: info.device,
            device_type: info.device_type,
            driver: info.driver,
            driver_info: info.driver_info,
            backend: info.backend,
            features: adapter.features(),
            limits: adapter.limits(),
        }
    }

    fn request_device<'a>(
        &'a self,
        adapter: &'a Self::Adapter,
        request: &'a DeviceRequest<'a>,
    ) -> impl Future<Output = Result<(Self::Device, Self::Queue)>> + 'a {
        async move {
            adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: request.label,
                    required_features: request.required_features,
                    required_limits: request.required_limits.clone(),
                    experimental_features: wgpu::ExperimentalFeatures::disabled(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    trace: wgpu::Trace::Off,
                })
                .await
                .map_err(|e| GpuError::DeviceUnavailable(e.to_string()))
        }
    }

    fn install_error_sink(&self, device: &Self::Device, sink: ErrorSink) {
        let lost = sink.clone();
        device.set_device_lost_callback(move |reason, message| {
            // Dropping the device on shutdown reports `Destroyed`; that is not a fault.
            if !matches!(reason, wgpu::DeviceLostReason::Destroyed) {
                lost.report_device_lost(format!("{reason:?}: {message}"));
            }
        });
        device.on_uncaptured_error(Arc::new(move |error: wgpu::Error| match error {
            wgpu::Error::OutOfMemory { .. } => sink.report_out_of_memory(),
            other => sink.report_uncaptured(other.to_string()),
        }));
    }

    // ── surface ───────────────────────────────────────────────────────────

    fn surface_capabilities(
        &self,
        surface: &Self::Surface,
        adapter: &Self::Adapter,
    ) -> SurfaceCaps {
        let caps = surface.get_capabilities(adapter);
        SurfaceCaps {
            formats: caps.formats,
            present_modes: caps.present_modes,
            alpha_modes: caps.alpha_modes,
        }
    }

    fn configure_surface(
        &self,
        surface: &Self::Surface,
        device: &Self::Device,
        config: &SurfaceConfig,
    ) {
        surface.configure(
            device,
            &wgpu::SurfaceConfiguration {
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                format: config.format,
                width: config.width,
                height: config.height,
                present_mode: config.present_mode,
                desired_maximum_frame_latency: config.desired_maximum_frame_latency,
                alpha_mode: config.alpha_mode,
                view_formats: vec![],
            },
        );
    }

    fn acquire(
        &self,
        surface: &Self::Surface,
    ) -> std::result::Result<Self::SurfaceTexture, AcquireFailure> {
        surface.get_current_texture().map_err(map_surface_error)
    }

    fn surface_view(&self, texture: &Self::SurfaceTexture) -> Self::TextureView {
        texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn present(&self, texture: Self::SurfaceTexture) -> std::result::Result<(), PresentFailure> {
        // wgpu reports presentation problems on the next acquisition instead.
        texture.present();
        Ok(())
    }

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(&self, device: &Self::Device, desc: &BufferDesc<'_>) -> Self::Buffer {
        // Allocations are padded to whole words so a tail write can be padded too.
        device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label,
            size: align_to(desc.size, wgpu::COPY_BUFFER_ALIGNMENT),
            usage: desc.usage,
            mapped_at_creation: false,
        })
    }

    fn write_buffer(&self, queue: &Self::Queue, buffer: &Self::Buffer, offset: u64, bytes: &[u8]) {
        let len = bytes.len() as u64;
        if len % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            queue.write_buffer(buffer, offset, bytes);
        } else {
            let mut padded = bytes.to_vec();
            padded.resize(align_to(len, wgpu::COPY_BUFFER_ALIGNMENT) as usize, 0);
            queue.write_buffer(buffer, offset, &padded);
        }
    }

    fn destroy_buffer(&self, buffer: &Self::Buffer) {
        buffer.destroy();
    }

    fn map_buffer(
        &self,
        device: &Self::Device,
        queue: &Self::Queue,
        buffer: &Self::Buffer,
        mode: MapMode,
        range: MapRange,
    ) -> Result<()> {
        // Staged writes only land on submission.
        queue.submit(std::iter::empty());

        let mode = match mode {
            MapMode::Read => wgpu::MapMode::Read,
            MapMode::Write => wgpu::MapMode::Write,
        };
        let (tx, rx) = mpsc::channel();
        buffer.slice(word_aligned(&range)).map_async(mode, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| GpuError::DeviceLost(format!("poll while mapping failed: {e}")))?;

        match rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(GpuError::DeviceLost(format!("buffer mapping failed: {e}"))),
            Err(_) => Err(GpuError::DeviceLost(
                "buffer mapping callback was dropped".to_string(),
            )),
        }
    }

    fn read_mapped(&self, buffer: &Self::Buffer, range: MapRange) -> Vec<u8> {
        let len = (range.end - range.start) as usize;
        let view = buffer.slice(word_aligned(&range)).get_mapped_range();
        view[..len].to_vec()
    }

    fn write_mapped(&self, buffer: &Self::Buffer, mapped: MapRange, offset: u64, bytes: &[u8]) {
        let mut view = buffer.slice(word_aligned(&mapped)).get_mapped_range_mut();
        let start = (offset - mapped.start) as usize;
        view[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn unmap_buffer(&self, buffer: &Self::Buffer) {
        buffer.unmap();
    }

    // ── textures, samplers, shaders, bindings, pipelines ─────────────────

    fn create_texture(&self, device: &Self::Device, desc: &TextureDesc<'_>) -> Self::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label,
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_level_count,
            sample_count: desc.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        })
    }

    fn write_texture(
        &self,
        queue: &Self::Queue,
        texture: &Self::Texture,
        region: TextureRegion,
        layout: TexelLayout,
        bytes: &[u8],
    ) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: region.mip_level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: layout.offset,
                bytes_per_row: Some(layout.bytes_per_row),
                rows_per_image: Some(layout.rows_per_image),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_texture_view(&self, texture: &Self::Texture, desc: &ViewDesc) -> Self::TextureView {
        texture.create_view(&wgpu::TextureViewDescriptor {
            format: desc.format,
            aspect: desc.aspect,
            base_mip_level: desc.base_mip_level,
            mip_level_count: desc.mip_level_count,
            base_array_layer: desc.base_array_layer,
            array_layer_count: desc.array_layer_count,
            ..Default::default()
        })
    }

    fn destroy_texture(&self, texture: &Self::Texture) {
        texture.destroy();
    }

    fn create_sampler(&self, device: &Self::Device, desc: &SamplerDesc) -> Self::Sampler {
        device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: desc.address_mode_u,
            address_mode_v: desc.address_mode_v,
            address_mode_w: desc.address_mode_w,
            mag_filter: desc.mag_filter,
            min_filter: desc.min_filter,
            mipmap_filter: desc.mipmap_filter,
            lod_min_clamp: desc.lod_min_clamp,
            lod_max_clamp: desc.lod_max_clamp,
            ..Default::default()
        })
    }

    fn create_shader_module(
        &self,
        device: &Self::Device,
        source: &ShaderSource,
    ) -> Result<Self::ShaderModule> {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: source.label.as_deref(),
            source: wgpu::ShaderSource::Wgsl(source.code.clone()),
        });

        let info = pollster::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
            .map(|m| match &m.location {
                Some(at) => format!("{}:{}: {}", at.line_number, at.line_position, m.message),
                None => m.message.clone(),
            })
            .collect();

        if errors.is_empty() {
            Ok(module)
        } else {
            Err(GpuError::ShaderCompilation(format!(
                "{}: {}",
                source.label.as_deref().unwrap_or("shader"),
                errors.join("; ")
            )))
        }
    }

    fn create_bind_group_layout(
        &self,
        device: &Self::Device,
        label: Option<&str>,
        entries: &[BindingLayoutEntry],
    ) -> Self::BindGroupLayout {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = entries
            .iter()
            .map(|e| wgpu::BindGroupLayoutEntry {
                binding: e.binding,
                visibility: e.visibility,
                ty: e.ty,
                count: None,
            })
            .collect();
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label,
            entries: &entries,
        })
    }

    fn create_bind_group(
        &self,
        device: &Self::Device,
        label: Option<&str>,
        layout: &Self::BindGroupLayout,
        entries: &[NativeBindGroupEntry<'_, Self>],
    ) -> Self::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry<'_>> = entries
            .iter()
            .map(|e| wgpu::BindGroupEntry {
                binding: e.binding,
                resource: match &e.resource {
                    NativeBinding::Buffer {
                        buffer,
                        offset,
                        size,
                    } => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer,
                        offset: *offset,
                        size: size.and_then(NonZeroU64::new),
                    }),
                    NativeBinding::TextureView(view) => wgpu::BindingResource::TextureView(view),
                    NativeBinding::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label,
            layout,
            entries: &entries,
        })
    }

    fn create_pipeline(
        &self,
        device: &Self::Device,
        desc: &NativePipelineDesc<'_, Self>,
    ) -> Self::Pipeline {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &desc.bind_group_layouts,
            immediate_size: 0,
        });

        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = desc
            .vertex_buffers
            .iter()
            .map(VertexBufferLayout::to_wgpu)
            .collect();

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: desc.module,
                entry_point: Some(desc.vertex_entry),
                buffers: &buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: desc.module,
                entry_point: Some(desc.fragment_entry),
                targets: &[Some(wgpu::ColorTargetState {
                    format: desc.color_format,
                    blend: desc.blend,
                    write_mask: desc.write_mask,
                })],
                compilation_options: Default::default(),
            }),
            primitive: desc.primitive,
            depth_stencil: desc.depth.map(|depth| wgpu::DepthStencilState {
                format: depth.format,
                depth_write_enabled: depth.write_enabled,
                depth_compare: depth.compare,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: desc.sample_count,
                ..Default::default()
            },
            multiview_mask: None,
            cache: None,
        })
    }

    // ── commands ──────────────────────────────────────────────────────────

    fn create_encoder(&self, device: &Self::Device, label: &str) -> Self::Encoder {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn encode_copy_buffer(
        &self,
        encoder: &mut Self::Encoder,
        src: &Self::Buffer,
        src_offset: u64,
        dst: &Self::Buffer,
        dst_offset: u64,
        size: u64,
    ) {
        encoder.copy_buffer_to_buffer(src, src_offset, dst, dst_offset, size);
    }

    fn encode_render_pass(&self, encoder: &mut Self::Encoder, pass: &NativePass<'_, Self>) {
        let depth_stencil_attachment =
            pass.depth
                .as_ref()
                .map(|depth| wgpu::RenderPassDepthStencilAttachment {
                    view: depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(pass.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: pass.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(pass.clear_color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        for batch in &pass.batches {
            rpass.set_pipeline(batch.pipeline);
            for (index, group) in &batch.bind_groups {
                rpass.set_bind_group(*index, *group, &[]);
            }
            for (slot, buffer) in &batch.vertex_buffers {
                rpass.set_vertex_buffer(*slot, buffer.slice(..));
            }
            if let Some((buffer, format)) = batch.index_buffer {
                rpass.set_index_buffer(buffer.slice(..), format);
            }
            for draw in batch.draws {
                match draw {
                    Draw::NonIndexed {
                        vertices,
                        instances,
                    } => rpass.draw(vertices.clone(), instances.clone()),
                    Draw::Indexed {
                        indices,
                        base_vertex,
                        instances,
                    } => rpass.draw_indexed(indices.clone(), *base_vertex, instances.clone()),
                }
            }
        }
    }

    fn finish(&self, encoder: Self::Encoder) -> Self::CommandBuffer {
        encoder.finish()
    }

    fn submit(&self, queue: &Self::Queue, command_buffer: Self::CommandBuffer) {
        queue.submit(std::iter::once(command_buffer));
    }

    fn on_submitted_work_done(&self, queue: &Self::Queue, callback: Box<dyn FnOnce() + Send>) {
        queue.on_submitted_work_done(callback);
    }

    fn poll(&self, device: &Self::Device, wait: bool) {
        let poll_type = if wait {
            wgpu::PollType::wait_indefinitely()
        } else {
            wgpu::PollType::Poll
        };
        if let Err(e) = device.poll(poll_type) {
            log::warn!("device poll failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_ranges_round_up_to_words() {
        assert_eq!(word_aligned(&(0..1)), 0..4);
        assert_eq!(word_aligned(&(8..16)), 8..16);
        assert_eq!(word_aligned(&(8..13)), 8..16);
    }

    #[test]
    fn surface_errors_map_to_acquire_classes() {
        assert_eq!(map_surface_error(wgpu::SurfaceError::Timeout), AcquireFailure::Timeout);
        assert_eq!(map_surface_error(wgpu::SurfaceError::Outdated), AcquireFailure::Outdated);
        assert_eq!(map_surface_error(wgpu::SurfaceError::Other), AcquireFailure::Lost);
        assert!(!map_surface_error(wgpu::SurfaceError::OutOfMemory).is_recoverable());
    }
}
