//! Logging for wiremesh binaries
//!
//! ```no_run
//! use wiremesh_observability::{init_logging, LoggingConfig};
//!
//! let _guard = init_logging(&LoggingConfig::default()).unwrap();
//! tracing::info!("ready");
//! ```

pub mod config;
pub mod error;
pub mod logging;

pub use config::{FileLoggingConfig, LogFormat, LogLevel, LoggingConfig, RotationStrategy};
pub use error::{ObservabilityError, Result};
pub use logging::{build_filter, init_logging, LogGuard};
