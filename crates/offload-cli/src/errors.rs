//! Top-level error type for the wrapper runtime.

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("no real compiler configured; set OFFLOAD_COMPILER")]
    NoCompiler,
    #[error("cannot exec '{compiler}': {source}")]
    Exec {
        compiler: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}
