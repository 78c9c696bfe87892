//! Environment-driven configuration.
//!
//! The wrapper deliberately has no configuration files: build systems invoke
//! it thousands of times per minute and every invocation must behave
//! identically. Everything comes from three environment variables, and an
//! absent or empty value always degrades towards "build locally".

use camino::Utf8PathBuf;
use thiserror::Error;

use offload_net::{Endpoint, EndpointParseError};

use crate::util::read_env;

/// Names the daemon endpoint (`unix://PATH`, `tcp://HOST:PORT`, or a bare
/// absolute socket path). Unset means no remote attempt.
pub const SOCKET_ENV: &str = "OFFLOAD_SOCKET";
/// Names the real compiler the wrapper fronts. Unset means the wrapper can
/// only exec locally — and has nothing to exec, which is an error.
pub const COMPILER_ENV: &str = "OFFLOAD_COMPILER";
/// Log filter expression, `tracing_subscriber::EnvFilter` syntax.
pub const LOG_ENV: &str = "OFFLOAD_LOG";

const DEFAULT_LOG_FILTER: &str = "warn";

/// Resolved settings for one wrapper invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub socket: Option<Endpoint>,
    pub compiler: Option<Utf8PathBuf>,
    pub log_filter: String,
}

/// Errors raised while reading the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {SOCKET_ENV} value '{value}': {source}")]
    Socket {
        value: String,
        #[source]
        source: EndpointParseError,
    },
}

impl Config {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let socket = match read_env(SOCKET_ENV) {
            Some(value) => Some(value.parse().map_err(|source| ConfigError::Socket {
                value: value.clone(),
                source,
            })?),
            None => None,
        };
        let compiler = read_env(COMPILER_ENV).map(Utf8PathBuf::from);
        let log_filter = read_env(LOG_ENV).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned());
        Ok(Self {
            socket,
            compiler,
            log_filter,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: None,
            compiler: None,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
        }
    }
}
