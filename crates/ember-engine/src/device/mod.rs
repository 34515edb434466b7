//! GPU session negotiation.
//!
//! This module is responsible for:
//! - creating the instance and the surface for the driver's target
//! - resolving adapter, device and queue in order
//! - collecting uncaptured device errors for the lifecycle to poll

mod error_sink;
mod init;
mod session;

pub use error_sink::ErrorSink;
pub use init::SessionConfig;
pub use session::DeviceSession;
