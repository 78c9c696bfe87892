//! Error types for the socket service layer.

use std::io;

use camino::Utf8PathBuf;
use nix::errno::Errno;
use thiserror::Error;

/// Errors surfaced by the service's boundary operations.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: io::Error,
    },
    #[error("no addresses resolved for {host}:{port}")]
    ResolveEmpty { host: String, port: u16 },
    #[error("invalid socket address for {endpoint}: {source}")]
    Address {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to create socket: {0}")]
    CreateSocket(#[source] io::Error),
    #[error("failed to remove stale socket '{path}': {source}")]
    Unlink {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to listen on {endpoint}: {source}")]
    Listen {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("a listener for {0} is already registered")]
    DuplicateListener(String),
    #[error("failed to register {endpoint} with the event loop: {source}")]
    Register {
        endpoint: String,
        #[source]
        source: Errno,
    },
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to install the worker interrupt handler: {0}")]
    InterruptHook(#[source] io::Error),
    #[error("failed to adjust the signal mask: {0}")]
    SignalMask(#[source] Errno),
    #[error("event loop failed: {0}")]
    EventLoop(#[source] Errno),
}
