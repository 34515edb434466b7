use wgpu::BufferUsages;

use crate::backend::{Backend, BufferDesc, MapMode, MapRange};
use crate::device::DeviceSession;
use crate::error::{GpuError, Result};

use super::registry::{BufferMeta, Entry};
use super::{BufferId, ResourceRegistry};

/// Copy and write offsets and lengths must be multiples of this.
pub const COPY_ALIGNMENT: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

/// Mapped ranges must start on a multiple of this.
pub const MAP_ALIGNMENT: u64 = wgpu::MAP_ALIGNMENT;

fn check_usage(usage: BufferUsages) -> Result<()> {
    if usage.is_empty() {
        return Err(GpuError::IllegalUsage(usage));
    }
    if usage.contains(BufferUsages::MAP_READ)
        && !(BufferUsages::MAP_READ | BufferUsages::COPY_DST).contains(usage)
    {
        return Err(GpuError::IllegalUsage(usage));
    }
    if usage.contains(BufferUsages::MAP_WRITE)
        && !(BufferUsages::MAP_WRITE | BufferUsages::COPY_SRC).contains(usage)
    {
        return Err(GpuError::IllegalUsage(usage));
    }
    Ok(())
}

fn check_bounds(size: u64, offset: u64, len: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(GpuError::BufferOverrun { size, offset, len }),
    }
}

impl<B: Backend> ResourceRegistry<B> {
    // ── buffers ───────────────────────────────────────────────────────────

    /// Allocates a buffer. Contents start zeroed.
    pub fn create_buffer(&mut self, session: &DeviceSession<B>, desc: &BufferDesc<'_>) -> Result<BufferId> {
        let max = session.report().limits.max_buffer_size;
        if desc.size == 0 || desc.size > max {
            return Err(GpuError::InvalidBufferSize {
                size: desc.size,
                max,
            });
        }
        check_usage(desc.usage)?;

        let handle = session.backend().create_buffer(session.device(), desc);
        let label = desc.label.unwrap_or("buffer").to_string();
        log::trace!("buffer `{label}` created: {} bytes, {:?}", desc.size, desc.usage);

        let meta = BufferMeta {
            size: desc.size,
            usage: desc.usage,
            destroyed: false,
            mapped: None,
        };
        let entry = self.entry(handle, meta, label, Vec::new());
        Ok(self.buffers.insert(entry))
    }

    /// Allocates a buffer holding `contents`.
    ///
    /// `COPY_DST` is added to `usage` for the upload.
    pub fn create_buffer_init(
        &mut self,
        session: &DeviceSession<B>,
        label: Option<&str>,
        usage: BufferUsages,
        contents: &[u8],
    ) -> Result<BufferId> {
        let id = self.create_buffer(
            session,
            &BufferDesc {
                label,
                size: contents.len() as u64,
                usage: usage | BufferUsages::COPY_DST,
            },
        )?;
        self.write_buffer(session, id, 0, contents)?;
        Ok(id)
    }

    pub fn buffer_size(&self, id: BufferId) -> Result<u64> {
        Ok(self.buffer(id)?.meta.size)
    }

    pub fn buffer_usage(&self, id: BufferId) -> Result<BufferUsages> {
        Ok(self.buffer(id)?.meta.usage)
    }

    /// Native handle of a live buffer.
    pub fn buffer_handle(&self, id: BufferId) -> Result<&B::Buffer> {
        Ok(&self.buffer(id)?.handle)
    }

    pub(crate) fn buffer(&self, id: BufferId) -> Result<&Entry<B::Buffer, BufferMeta>> {
        self.buffers.get(id).ok_or(GpuError::UnknownResource("buffer"))
    }

    /// Like [`buffer`](Self::buffer) but also rejects destroyed buffers.
    pub(crate) fn live_buffer(&self, id: BufferId) -> Result<&Entry<B::Buffer, BufferMeta>> {
        let entry = self.buffer(id)?;
        if entry.meta.destroyed {
            return Err(GpuError::ResourceDestroyed(entry.label.clone()));
        }
        Ok(entry)
    }

    /// Queues `bytes` for upload at `offset`.
    ///
    /// The upload is ordered before any later submission on the same queue.
    /// `offset` must be 4-byte aligned; the length must be too, unless the
    /// write ends exactly at the end of the buffer.
    pub fn write_buffer(
        &self,
        session: &DeviceSession<B>,
        id: BufferId,
        offset: u64,
        bytes: &[u8],
    ) -> Result<()> {
        let entry = self.live_buffer(id)?;
        let meta = &entry.meta;
        if meta.mapped.is_some() {
            return Err(GpuError::BufferMapped(entry.label.clone()));
        }
        if !meta.usage.contains(BufferUsages::COPY_DST) {
            return Err(GpuError::UsageMismatch {
                resource: entry.label.clone(),
                operation: "write_buffer",
            });
        }

        let len = bytes.len() as u64;
        check_bounds(meta.size, offset, len)?;
        if offset % COPY_ALIGNMENT != 0 {
            return Err(GpuError::UnalignedCopy(format!(
                "write offset {offset} is not a multiple of {COPY_ALIGNMENT}"
            )));
        }
        if len % COPY_ALIGNMENT != 0 && offset + len != meta.size {
            return Err(GpuError::UnalignedCopy(format!(
                "write of {len} bytes is not a multiple of {COPY_ALIGNMENT} and does not end the buffer"
            )));
        }
        if bytes.is_empty() {
            return Ok(());
        }

        session
            .backend()
            .write_buffer(session.queue(), &entry.handle, offset, bytes);
        Ok(())
    }

    /// Invalidates the buffer's storage. Its handle stays registered until released.
    pub fn destroy_buffer(&mut self, session: &DeviceSession<B>, id: BufferId) -> Result<()> {
        let entry = self
            .buffers
            .get_mut(id)
            .ok_or(GpuError::UnknownResource("buffer"))?;
        if entry.meta.destroyed {
            return Ok(());
        }
        session.backend().destroy_buffer(&entry.handle);
        entry.meta.destroyed = true;
        entry.meta.mapped = None;
        log::trace!("buffer `{}` destroyed", entry.label);
        Ok(())
    }

    /// Maps `range` of a buffer for host access.
    ///
    /// Blocks until the map completes; the returned guard unmaps on drop. A
    /// read mapping observes every write queued before this call.
    pub fn map_buffer<'r>(
        &'r mut self,
        session: &'r DeviceSession<B>,
        id: BufferId,
        mode: MapMode,
        range: MapRange,
    ) -> Result<BufferMapping<'r, B>> {
        let backend = session.backend();
        let entry = self
            .buffers
            .get_mut(id)
            .ok_or(GpuError::UnknownResource("buffer"))?;
        let meta = &entry.meta;
        if meta.destroyed {
            return Err(GpuError::ResourceDestroyed(entry.label.clone()));
        }
        if meta.mapped.is_some() {
            return Err(GpuError::BufferMapped(entry.label.clone()));
        }
        let (required, operation) = match mode {
            MapMode::Read => (BufferUsages::MAP_READ, "map_read"),
            MapMode::Write => (BufferUsages::MAP_WRITE, "map_write"),
        };
        if !meta.usage.contains(required) {
            return Err(GpuError::UsageMismatch {
                resource: entry.label.clone(),
                operation,
            });
        }
        if range.start >= range.end {
            return Err(GpuError::BufferOverrun {
                size: meta.size,
                offset: range.start,
                len: 0,
            });
        }
        check_bounds(meta.size, range.start, range.end - range.start)?;
        if range.start % MAP_ALIGNMENT != 0 {
            return Err(GpuError::UnalignedCopy(format!(
                "map offset {} is not a multiple of {MAP_ALIGNMENT}",
                range.start
            )));
        }

        backend.map_buffer(session.device(), session.queue(), &entry.handle, mode, range.clone())?;
        entry.meta.mapped = Some(mode);
        log::trace!("buffer `{}` mapped {:?} {:?}", entry.label, mode, range);

        Ok(BufferMapping {
            backend,
            entry,
            mode,
            range,
        })
    }

    /// Copies `size` bytes between two buffers and submits the copy.
    pub fn copy_buffer(
        &self,
        session: &DeviceSession<B>,
        src: BufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        if src == dst {
            return Err(GpuError::UsageMismatch {
                resource: self.buffer(src)?.label.clone(),
                operation: "copy_buffer onto itself",
            });
        }
        let source = self.live_buffer(src)?;
        let target = self.live_buffer(dst)?;

        for (entry, usage, operation) in [
            (source, BufferUsages::COPY_SRC, "copy_buffer source"),
            (target, BufferUsages::COPY_DST, "copy_buffer destination"),
        ] {
            if entry.meta.mapped.is_some() {
                return Err(GpuError::BufferMapped(entry.label.clone()));
            }
            if !entry.meta.usage.contains(usage) {
                return Err(GpuError::UsageMismatch {
                    resource: entry.label.clone(),
                    operation,
                });
            }
        }

        for value in [src_offset, dst_offset, size] {
            if value % COPY_ALIGNMENT != 0 {
                return Err(GpuError::UnalignedCopy(format!(
                    "copy parameter {value} is not a multiple of {COPY_ALIGNMENT}"
                )));
            }
        }
        check_bounds(source.meta.size, src_offset, size)?;
        check_bounds(target.meta.size, dst_offset, size)?;

        let backend = session.backend();
        let mut encoder = backend.create_encoder(session.device(), "ember copy encoder");
        backend.encode_copy_buffer(
            &mut encoder,
            &source.handle,
            src_offset,
            &target.handle,
            dst_offset,
            size,
        );
        backend.submit(session.queue(), backend.finish(encoder));
        Ok(())
    }

    /// Calls `callback` once everything submitted so far has completed.
    ///
    /// Delivery happens while the session is polled, for example at the
    /// next health check.
    pub fn on_submitted_work_done(
        &self,
        session: &DeviceSession<B>,
        callback: impl FnOnce() + Send + 'static,
    ) {
        session
            .backend()
            .on_submitted_work_done(session.queue(), Box::new(callback));
    }
}

/// Host access to a mapped range of a buffer. Unmaps when dropped.
pub struct BufferMapping<'r, B: Backend> {
    backend: &'r B,
    entry: &'r mut Entry<B::Buffer, BufferMeta>,
    mode: MapMode,
    range: MapRange,
}

impl<B: Backend> BufferMapping<'_, B> {
    pub fn mode(&self) -> MapMode {
        self.mode
    }

    pub fn range(&self) -> MapRange {
        self.range.clone()
    }

    /// Copies the mapped bytes out.
    pub fn read(&self) -> Vec<u8> {
        self.backend.read_mapped(&self.entry.handle, self.range.clone())
    }

    /// Writes `bytes` at `offset`, relative to the start of the mapped range.
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        if self.mode != MapMode::Write {
            return Err(GpuError::UsageMismatch {
                resource: self.entry.label.clone(),
                operation: "write through a read mapping",
            });
        }
        check_bounds(self.range.end - self.range.start, offset, bytes.len() as u64)?;
        self.backend.write_mapped(
            &self.entry.handle,
            self.range.clone(),
            self.range.start + offset,
            bytes,
        );
        Ok(())
    }

    /// Ends host access.
    pub fn unmap(self) {}
}

impl<B: Backend> Drop for BufferMapping<'_, B> {
    fn drop(&mut self) {
        if self.entry.meta.mapped.take().is_some() && !self.entry.meta.destroyed {
            self.backend.unmap_buffer(&self.entry.handle);
        }
        log::trace!("buffer `{}` unmapped", self.entry.label);
    }
}
