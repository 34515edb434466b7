use wgpu::TextureUsages;

use crate::backend::{Backend, SamplerDesc, TexelLayout, TextureDesc, TextureRegion, ViewDesc};
use crate::device::DeviceSession;
use crate::error::{GpuError, Result};

use super::image::{DecodedImage, ImageDecoder};
use super::registry::{Entry, TextureMeta, ViewMeta};
use super::{ResourceRegistry, SamplerId, TextureId, TextureViewId};

impl<B: Backend> ResourceRegistry<B> {
    // ── textures ──────────────────────────────────────────────────────────

    pub fn create_texture(&mut self, session: &DeviceSession<B>, desc: &TextureDesc<'_>) -> Result<TextureId> {
        let max = session.report().limits.max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(GpuError::InvalidTextureLayout(format!(
                "extent {}x{} is outside 1..={max}",
                desc.width, desc.height
            )));
        }
        let max_mips = 32 - desc.width.max(desc.height).leading_zeros();
        if desc.mip_level_count == 0 || desc.mip_level_count > max_mips {
            return Err(GpuError::InvalidTextureLayout(format!(
                "{} mip levels requested, extent allows 1..={max_mips}",
                desc.mip_level_count
            )));
        }
        if desc.sample_count == 0 {
            return Err(GpuError::InvalidTextureLayout("sample count must be at least 1".into()));
        }
        if desc.usage.is_empty() {
            return Err(GpuError::InvalidTextureLayout("texture usage is empty".into()));
        }

        let handle = session.backend().create_texture(session.device(), desc);
        let label = desc.label.unwrap_or("texture").to_string();
        log::trace!(
            "texture `{label}` created: {}x{} {:?}",
            desc.width,
            desc.height,
            desc.format
        );

        let meta = TextureMeta {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            usage: desc.usage,
            mip_level_count: desc.mip_level_count,
            destroyed: false,
        };
        let entry = self.entry(handle, meta, label, Vec::new());
        Ok(self.textures.insert(entry))
    }

    pub(crate) fn texture(&self, id: TextureId) -> Result<&Entry<B::Texture, TextureMeta>> {
        self.textures.get(id).ok_or(GpuError::UnknownResource("texture"))
    }

    pub fn texture_handle(&self, id: TextureId) -> Result<&B::Texture> {
        Ok(&self.texture(id)?.handle)
    }

    pub fn texture_size(&self, id: TextureId) -> Result<(u32, u32)> {
        let meta = &self.texture(id)?.meta;
        Ok((meta.width, meta.height))
    }

    /// Uploads one full mip level.
    ///
    /// `bytes_per_row` must cover a row of texels and `rows_per_image` the
    /// level's height; `bytes` must hold every row from `layout.offset` on.
    pub fn write_texture(
        &self,
        session: &DeviceSession<B>,
        id: TextureId,
        mip_level: u32,
        layout: TexelLayout,
        bytes: &[u8],
    ) -> Result<()> {
        let entry = self.texture(id)?;
        let meta = &entry.meta;
        if meta.destroyed {
            return Err(GpuError::ResourceDestroyed(entry.label.clone()));
        }
        if !meta.usage.contains(TextureUsages::COPY_DST) {
            return Err(GpuError::UsageMismatch {
                resource: entry.label.clone(),
                operation: "write_texture",
            });
        }
        if mip_level >= meta.mip_level_count {
            return Err(GpuError::InvalidTextureLayout(format!(
                "mip level {mip_level} does not exist ({} levels)",
                meta.mip_level_count
            )));
        }
        if meta.format.is_compressed() {
            return Err(GpuError::InvalidTextureLayout(format!(
                "uploads of block-compressed {:?} are not supported",
                meta.format
            )));
        }
        let texel = meta.format.block_copy_size(None).ok_or_else(|| {
            GpuError::InvalidTextureLayout(format!("{:?} has no single copy aspect", meta.format))
        })?;

        let width = (meta.width >> mip_level).max(1);
        let height = (meta.height >> mip_level).max(1);
        let row = u64::from(width) * u64::from(texel);
        if u64::from(layout.bytes_per_row) < row {
            return Err(GpuError::InvalidTextureLayout(format!(
                "bytes_per_row {} is smaller than a row of {row} bytes",
                layout.bytes_per_row
            )));
        }
        if layout.rows_per_image < height {
            return Err(GpuError::InvalidTextureLayout(format!(
                "rows_per_image {} is smaller than the height {height}",
                layout.rows_per_image
            )));
        }
        let required = u64::from(layout.bytes_per_row)
            .checked_mul(u64::from(height - 1))
            .and_then(|rows| rows.checked_add(row))
            .and_then(|span| span.checked_add(layout.offset))
            .ok_or_else(|| {
                GpuError::InvalidTextureLayout(format!(
                    "offset {} puts the upload past the addressable range",
                    layout.offset
                ))
            })?;
        if (bytes.len() as u64) < required {
            return Err(GpuError::InvalidTextureLayout(format!(
                "{} bytes supplied, layout needs {required}",
                bytes.len()
            )));
        }

        session.backend().write_texture(
            session.queue(),
            &entry.handle,
            TextureRegion {
                mip_level,
                width,
                height,
            },
            layout,
            bytes,
        );
        Ok(())
    }

    /// A view over a subrange of `texture`. The view keeps the texture alive.
    pub fn create_view(
        &mut self,
        session: &DeviceSession<B>,
        texture: TextureId,
        desc: &ViewDesc,
    ) -> Result<TextureViewId> {
        let entry = self.texture(texture)?;
        let meta = &entry.meta;
        if meta.destroyed {
            return Err(GpuError::ResourceDestroyed(entry.label.clone()));
        }

        let mip_count = desc
            .mip_level_count
            .unwrap_or(meta.mip_level_count.saturating_sub(desc.base_mip_level));
        let mip_end = desc.base_mip_level.checked_add(mip_count);
        if mip_count == 0 || mip_end.is_none_or(|end| end > meta.mip_level_count) {
            return Err(GpuError::InvalidViewRange(format!(
                "mips {}..{} of a texture with {} level(s)",
                desc.base_mip_level,
                u64::from(desc.base_mip_level) + u64::from(mip_count),
                meta.mip_level_count
            )));
        }
        let layer_count = desc.array_layer_count.unwrap_or(1);
        if desc.base_array_layer != 0 || layer_count != 1 {
            return Err(GpuError::InvalidViewRange(format!(
                "layers {}..{} of a single-layer texture",
                desc.base_array_layer,
                u64::from(desc.base_array_layer) + u64::from(layer_count)
            )));
        }
        let format = desc.format.unwrap_or(meta.format);
        if format != meta.format {
            return Err(GpuError::InvalidViewRange(format!(
                "view format {format:?} differs from texture format {:?}",
                meta.format
            )));
        }

        let handle = session
            .backend()
            .create_texture_view(&entry.handle, desc);
        let label = format!("{} view", entry.label);
        let view = ViewMeta { texture, format };
        let entry = self.entry(handle, view, label, vec![texture.into()]);
        Ok(self.views.insert(entry))
    }

    pub(crate) fn view(&self, id: TextureViewId) -> Result<&Entry<B::TextureView, ViewMeta>> {
        self.views.get(id).ok_or(GpuError::UnknownResource("texture view"))
    }

    /// The texture a view projects.
    pub fn view_texture(&self, id: TextureViewId) -> Result<TextureId> {
        Ok(self.view(id)?.meta.texture)
    }

    pub fn view_format(&self, id: TextureViewId) -> Result<wgpu::TextureFormat> {
        Ok(self.view(id)?.meta.format)
    }

    pub fn destroy_texture(&mut self, session: &DeviceSession<B>, id: TextureId) -> Result<()> {
        let entry = self
            .textures
            .get_mut(id)
            .ok_or(GpuError::UnknownResource("texture"))?;
        if !entry.meta.destroyed {
            session.backend().destroy_texture(&entry.handle);
            entry.meta.destroyed = true;
            log::trace!("texture `{}` destroyed", entry.label);
        }
        Ok(())
    }

    // ── samplers ──────────────────────────────────────────────────────────

    pub fn create_sampler(&mut self, session: &DeviceSession<B>, desc: &SamplerDesc) -> Result<SamplerId> {
        if !(desc.lod_min_clamp >= 0.0 && desc.lod_min_clamp <= desc.lod_max_clamp) {
            return Err(GpuError::InvalidViewRange(format!(
                "lod clamp {}..{} is not an ordered non-negative range",
                desc.lod_min_clamp, desc.lod_max_clamp
            )));
        }
        let handle = session.backend().create_sampler(session.device(), desc);
        let entry = self.entry(handle, (), "sampler".to_string(), Vec::new());
        Ok(self.samplers.insert(entry))
    }

    pub fn sampler_handle(&self, id: SamplerId) -> Result<&B::Sampler> {
        self.samplers
            .get(id)
            .map(|entry| &entry.handle)
            .ok_or(GpuError::UnknownResource("sampler"))
    }

    // ── images ────────────────────────────────────────────────────────────

    /// Uploads a decoded image into a new sampled texture.
    pub fn create_texture_from_image(
        &mut self,
        session: &DeviceSession<B>,
        image: &DecodedImage,
        label: Option<&str>,
    ) -> Result<TextureId> {
        let row = image.bytes_per_row()?;
        let id = self.create_texture(
            session,
            &TextureDesc {
                label,
                width: image.width,
                height: image.height,
                format: image.format,
                usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
                mip_level_count: 1,
                sample_count: 1,
            },
        )?;
        self.write_texture(
            session,
            id,
            0,
            TexelLayout {
                offset: 0,
                bytes_per_row: row,
                rows_per_image: image.height,
            },
            &image.pixels,
        )?;
        Ok(id)
    }

    /// Decodes `bytes` with `decoder` and uploads the result.
    pub fn load_texture(
        &mut self,
        session: &DeviceSession<B>,
        decoder: &impl ImageDecoder,
        bytes: &[u8],
        label: Option<&str>,
    ) -> Result<TextureId> {
        let image = decoder.decode(bytes)?;
        log::debug!(
            "decoded {}x{} {:?} image for {:?}",
            image.width,
            image.height,
            image.format,
            label
        );
        self.create_texture_from_image(session, &image, label)
    }
}
