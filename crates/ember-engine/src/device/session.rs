use crate::backend::{AdapterOptions, AdapterReport, Backend, DeviceRequest, SurfaceCaps};
use crate::error::{GpuError, Result};

use super::{ErrorSink, SessionConfig};

/// Owns the negotiated {instance, surface, adapter, device, queue} chain.
///
/// This type is the low-level GPU context:
/// - creates the instance and the surface bound to the driver's target
/// - resolves adapter, then device and queue, strictly in that order
/// - installs the error sink that turns uncaptured device errors into fatal faults
///
/// Fields are declared in release order: dropping a session (including on a
/// fatal error path) releases queue, device, adapter, surface, then instance.
pub struct DeviceSession<B: Backend> {
    queue: B::Queue,
    device: B::Device,
    adapter: B::Adapter,
    surface: B::Surface,
    instance: B::Instance,

    backend: B,
    report: AdapterReport,
    errors: ErrorSink,
}

impl<B: Backend> DeviceSession<B> {
    /// Negotiates a session presenting to `target`.
    ///
    /// Adapter and device resolution are asynchronous; nothing depending on
    /// them runs before the corresponding future has resolved. Failure of
    /// either is fatal and releases everything created so far.
    pub async fn negotiate(backend: B, target: B::Target, config: &SessionConfig) -> Result<Self> {
        if config.backends.is_empty() {
            let err = GpuError::InstanceUnavailable("no backends enabled".into());
            log::error!("{err}");
            return Err(err);
        }
        let instance = backend.create_instance()?;
        log::debug!("instance created");

        let surface = backend.create_surface(&instance, target)?;
        log::debug!("surface created");

        let adapter = backend
            .request_adapter(
                &instance,
                &surface,
                AdapterOptions {
                    power_preference: config.power_preference,
                    force_fallback_adapter: config.force_fallback_adapter,
                },
            )
            .await
            .inspect_err(|e| log::error!("{e}"))?;

        let report = backend.adapter_report(&adapter);
        log_adapter_report(&report);

        let request = DeviceRequest {
            label: Some("ember device"),
            required_features: config.required_features,
            required_limits: config.required_limits.clone(),
        };
        let (device, queue) = backend
            .request_device(&adapter, &request)
            .await
            .inspect_err(|e| log::error!("{e}"))?;

        let errors = ErrorSink::default();
        backend.install_error_sink(&device, errors.clone());
        log::info!("device ready on {} ({:?})", report.name, report.backend);

        Ok(Self {
            queue,
            device,
            adapter,
            surface,
            instance,
            backend,
            report,
            errors,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn queue(&self) -> &B::Queue {
        &self.queue
    }

    pub fn adapter(&self) -> &B::Adapter {
        &self.adapter
    }

    pub fn surface(&self) -> &B::Surface {
        &self.surface
    }

    pub fn instance(&self) -> &B::Instance {
        &self.instance
    }

    /// Capabilities of the resolved adapter.
    pub fn report(&self) -> &AdapterReport {
        &self.report
    }

    pub fn error_sink(&self) -> &ErrorSink {
        &self.errors
    }

    pub fn surface_capabilities(&self) -> SurfaceCaps {
        self.backend.surface_capabilities(&self.surface, &self.adapter)
    }

    /// Fails with the first fault delivered by the error sink since the last check.
    pub fn check_health(&self) -> Result<()> {
        self.backend.poll(&self.device, false);
        match self.errors.poll() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// Blocks until every submission so far has completed.
    pub fn wait_idle(&self) {
        self.backend.poll(&self.device, true);
    }

    /// Releases the chain in dependency order.
    pub fn shutdown(self) {
        let Self {
            queue,
            device,
            adapter,
            surface,
            instance,
            ..
        } = self;

        drop(queue);
        log::debug!("queue released");
        drop(device);
        log::debug!("device released");
        drop(adapter);
        log::debug!("adapter released");
        drop(surface);
        log::debug!("surface released");
        drop(instance);
        log::debug!("instance released");
    }
}

fn log_adapter_report(report: &AdapterReport) {
    log::info!(
        "adapter: {} ({:?}, {:?}) vendor={:#06x} device={:#06x}",
        report.name,
        report.backend,
        report.device_type,
        report.vendor,
        report.device
    );
    if !report.driver.is_empty() {
        log::info!("driver: {} {}", report.driver, report.driver_info);
    }
    for feature in report.features.iter() {
        log::debug!("adapter feature: {feature:?}");
    }
    let limits = &report.limits;
    log::debug!(
        "limits: max_texture_dimension_2d={} max_bind_groups={} max_vertex_buffers={} max_buffer_size={}",
        limits.max_texture_dimension_2d,
        limits.max_bind_groups,
        limits.max_vertex_buffers,
        limits.max_buffer_size
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessBackend;
    use crate::error::GpuError;

    fn negotiate(backend: HeadlessBackend) -> Result<DeviceSession<HeadlessBackend>> {
        pollster::block_on(DeviceSession::negotiate(
            backend,
            (),
            &SessionConfig::default(),
        ))
    }

    #[test]
    fn negotiates_full_chain() {
        let session = negotiate(HeadlessBackend::new()).unwrap();
        assert_eq!(session.report().backend, wgpu::Backend::Noop);
        assert!(session.check_health().is_ok());
    }

    #[test]
    fn adapter_failure_is_fatal_and_releases_partial_chain() {
        let backend = HeadlessBackend::new();
        let probe = backend.probe();
        probe.fail_adapter("no compatible GPU");

        let err = negotiate(backend).err().unwrap();
        assert!(matches!(err, GpuError::AdapterUnavailable(_)));
        assert!(err.is_fatal());
        assert_eq!(probe.released_labels(), vec!["surface", "instance"]);
    }

    #[test]
    fn empty_backend_set_fails_before_any_handle_exists() {
        let backend = HeadlessBackend::new();
        let probe = backend.probe();
        let config = SessionConfig {
            backends: wgpu::Backends::empty(),
            ..SessionConfig::default()
        };
        let err = pollster::block_on(DeviceSession::negotiate(backend, (), &config))
            .err()
            .unwrap();
        assert!(matches!(err, GpuError::InstanceUnavailable(_)));
        assert!(err.is_fatal());
        assert!(probe.released_labels().is_empty());
    }

    #[test]
    fn device_failure_is_fatal() {
        let backend = HeadlessBackend::new();
        backend.probe().fail_device("limits exceeded");
        let err = negotiate(backend).err().unwrap();
        assert!(matches!(err, GpuError::DeviceUnavailable(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn uncaptured_error_surfaces_on_health_check() {
        let backend = HeadlessBackend::new();
        let probe = backend.probe();
        let session = negotiate(backend).unwrap();

        probe.inject_uncaptured_error("pipeline validation failed");
        let err = session.check_health().unwrap_err();
        assert!(matches!(err, GpuError::UncapturedDeviceError(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn shutdown_releases_in_reverse_negotiation_order() {
        let backend = HeadlessBackend::new();
        let probe = backend.probe();
        negotiate(backend).unwrap().shutdown();
        assert_eq!(
            probe.released_labels(),
            vec!["queue", "device", "adapter", "surface", "instance"]
        );
    }
}
