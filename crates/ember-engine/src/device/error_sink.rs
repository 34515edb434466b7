use std::sync::{Arc, Mutex, PoisonError};

use crate::error::GpuError;

/// Collects uncaptured device errors and device loss reported by the backend.
///
/// Backends may deliver these from driver callbacks on any thread; the session
/// polls the sink on its own thread at tick boundaries. Only the first error of
/// each kind is kept, as it usually causes the ones that follow.
#[derive(Debug, Clone, Default)]
pub struct ErrorSink {
    device_lost: Arc<Mutex<Option<String>>>,
    uncaptured: Arc<Mutex<Option<GpuError>>>,
}

impl ErrorSink {
    pub fn report_device_lost(&self, reason: impl Into<String>) {
        let reason = reason.into();
        log::error!("device lost: {reason}");
        self.device_lost
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(reason);
    }

    pub fn report_out_of_memory(&self) {
        log::error!("uncaptured device error: out of memory");
        self.uncaptured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(GpuError::OutOfMemory);
    }

    pub fn report_uncaptured(&self, description: impl Into<String>) {
        let description = description.into();
        log::error!("uncaptured device error: {description}");
        self.uncaptured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(GpuError::UncapturedDeviceError(description));
    }

    /// Takes the pending fault, if any. Device loss takes precedence.
    pub fn poll(&self) -> Option<GpuError> {
        if let Some(reason) = self
            .device_lost
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Some(GpuError::DeviceLost(reason));
        }
        self.uncaptured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
