//! Error taxonomy for the GPU session.
//!
//! Every failure the core can report is a [`GpuError`]. Each variant belongs to
//! exactly one [`ErrorClass`]:
//! - `Fatal`: the session terminates; there is no retry path.
//! - `Recoverable`: handled inside the swapchain/frame components (reconfigure,
//!   skip one frame). These never escape a render tick.
//! - `Validation`: a caller error, reported at the call that caused it.

use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, GpuError>;

/// Severity class of a [`GpuError`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorClass {
    Fatal,
    Recoverable,
    Validation,
}

/// Outcome classes of a failed surface acquisition.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AcquireFailure {
    Timeout,
    Outdated,
    Lost,
    OutOfMemory,
    DeviceLost,
}

impl AcquireFailure {
    /// Timeout, Outdated and Lost are handled by reconfiguring the swapchain.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::Timeout | Self::Outdated | Self::Lost)
    }
}

impl From<AcquireFailure> for GpuError {
    fn from(failure: AcquireFailure) -> Self {
        match failure {
            AcquireFailure::OutOfMemory => GpuError::OutOfMemory,
            AcquireFailure::DeviceLost => {
                GpuError::DeviceLost("surface acquisition reported device loss".to_string())
            }
            recoverable => GpuError::SurfaceAcquire(recoverable),
        }
    }
}

/// Every failure the core reports.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpuError {
    // ── fatal ─────────────────────────────────────────────────────────────
    #[error("failed to create GPU instance: {0}")]
    InstanceUnavailable(String),

    #[error("failed to create surface: {0}")]
    SurfaceUnavailable(String),

    #[error("no suitable GPU adapter: {0}")]
    AdapterUnavailable(String),

    #[error("failed to create GPU device: {0}")]
    DeviceUnavailable(String),

    #[error("uncaptured device error: {0}")]
    UncapturedDeviceError(String),

    #[error("GPU out of memory")]
    OutOfMemory,

    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    #[error("pipeline depth format {pipeline:?} does not match swapchain depth format {swapchain:?}")]
    DepthFormatMismatch {
        pipeline: Option<wgpu::TextureFormat>,
        swapchain: Option<wgpu::TextureFormat>,
    },

    #[error("session was terminated by an earlier fatal error")]
    SessionTerminated,

    // ── recoverable ───────────────────────────────────────────────────────
    #[error("surface acquisition failed: {0:?}")]
    SurfaceAcquire(AcquireFailure),

    // ── validation ────────────────────────────────────────────────────────
    #[error("write of {len} bytes at offset {offset} overruns buffer of {size} bytes")]
    BufferOverrun { size: u64, offset: u64, len: u64 },

    #[error("buffer size {size} is outside 1..={max}")]
    InvalidBufferSize { size: u64, max: u64 },

    #[error("illegal usage combination {0:?}")]
    IllegalUsage(wgpu::BufferUsages),

    #[error("{resource} lacks usage required for {operation}")]
    UsageMismatch {
        resource: String,
        operation: &'static str,
    },

    #[error("{0}")]
    UnalignedCopy(String),

    #[error("invalid texture layout: {0}")]
    InvalidTextureLayout(String),

    #[error("image decoding failed: {0}")]
    ImageDecode(String),

    #[error("invalid texture view range: {0}")]
    InvalidViewRange(String),

    #[error("binding slot {binding} declared more than once")]
    DuplicateBinding { binding: u32 },

    #[error("bind group does not match its layout: {0}")]
    BindingMismatch(String),

    #[error("invalid visibility for binding {binding}: {reason}")]
    InvalidVisibility { binding: u32, reason: &'static str },

    #[error("bind group at index {index} was built for a different layout than the pipeline declares")]
    BindGroupLayoutMismatch { index: u32 },

    #[error("pipeline expects a bind group at index {index}")]
    MissingBindGroup { index: u32 },

    #[error("shader location {location} used more than once in the vertex state")]
    DuplicateShaderLocation { location: u32 },

    #[error("invalid vertex layout: {0}")]
    InvalidVertexLayout(String),

    #[error("draw range out of bounds: {0}")]
    VertexRangeOutOfBounds(String),

    #[error("pipeline color format {pipeline:?} does not match surface format {surface:?}")]
    ColorFormatMismatch {
        pipeline: wgpu::TextureFormat,
        surface: wgpu::TextureFormat,
    },

    #[error("pipelines `{depth_tested}` and `{untested}` disagree on depth testing within one pass")]
    MixedDepthPass {
        depth_tested: String,
        untested: String,
    },

    #[error("pipeline `{0}` has no explicit blend state")]
    MissingBlendState(String),

    #[error("shader compilation failed: {0}")]
    ShaderCompilation(String),

    #[error("unknown or released {0}")]
    UnknownResource(&'static str),

    #[error("{0} was destroyed")]
    ResourceDestroyed(String),

    #[error("{resource} is still referenced by {dependents} live object(s)")]
    ResourceInUse { resource: String, dependents: usize },

    #[error("{0} holds a CPU-visible mapping usage and must be destroyed before release")]
    ReleaseBeforeDestroy(String),

    #[error("{0} is mapped")]
    BufferMapped(String),

    #[error("operation `{operation}` is not valid in phase {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: &'static str,
    },
}

impl GpuError {
    /// Classifies this error according to the session's error taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            GpuError::InstanceUnavailable(_)
            | GpuError::SurfaceUnavailable(_)
            | GpuError::AdapterUnavailable(_)
            | GpuError::DeviceUnavailable(_)
            | GpuError::UncapturedDeviceError(_)
            | GpuError::OutOfMemory
            | GpuError::DeviceLost(_)
            | GpuError::DepthFormatMismatch { .. }
            | GpuError::SessionTerminated => ErrorClass::Fatal,

            GpuError::SurfaceAcquire(failure) if failure.is_recoverable() => {
                ErrorClass::Recoverable
            }
            GpuError::SurfaceAcquire(_) => ErrorClass::Fatal,

            _ => ErrorClass::Validation,
        }
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}
