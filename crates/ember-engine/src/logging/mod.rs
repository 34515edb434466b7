//! Logger initialization.
//!
//! Everything in the engine logs through the `log` facade; this module only
//! installs `env_logger` as the backend, once.

mod init;

pub use init::{DEFAULT_FILTER, LoggingConfig, init_logging};
