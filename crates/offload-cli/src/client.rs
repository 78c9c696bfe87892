//! The client request state machine.
//!
//! One pass through [`do_main`] decides the fate of a compiler invocation:
//! remote execution by the daemon, local execution by the real compiler, or
//! — only when the daemon reports that the build itself failed — a hard
//! failure that must not be retried locally, because a local success would
//! mask the real error.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use offload_flags::{CachePolicy, ClassifyError, process_flags};
use offload_net::{Connection, Endpoint, NetError};
use offload_proto::{Envelope, ExecuteRequest, FrameError, StatusCode};

use crate::CLIENT_TARGET;
use crate::config::Config;
use crate::driver::{CommandExpander, DriverError};

/// What the wrapper should do after the remote attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Exec the real compiler locally.
    RunLocally,
    /// The daemon owns the build; nothing further to do.
    DoneRemotely,
    /// The daemon definitively failed the build; exit without a local retry.
    DaemonFailure(i32),
}

/// Opens request channels to the daemon.
pub trait DaemonConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn DaemonChannel>, NetError>;
}

/// One request/reply exchange with the daemon.
pub trait DaemonChannel {
    fn send(&mut self, message: &Envelope) -> Result<(), FrameError>;
    fn recv(&mut self) -> Result<Envelope, FrameError>;
}

/// The production connector: a blocking stream per request.
pub struct ServiceConnector;

impl DaemonConnector for ServiceConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn DaemonChannel>, NetError> {
        let connection = offload_net::connect_sync(endpoint)?;
        Ok(Box::new(ConnectionChannel { connection }))
    }
}

struct ConnectionChannel {
    connection: Arc<Connection>,
}

impl DaemonChannel for ConnectionChannel {
    fn send(&mut self, message: &Envelope) -> Result<(), FrameError> {
        self.connection.send(message)
    }

    fn recv(&mut self) -> Result<Envelope, FrameError> {
        self.connection.recv()
    }
}

/// Why a remote attempt was abandoned. Every variant means "run locally".
#[derive(Debug, Error)]
enum RemoteRefusal {
    #[error("no real compiler configured")]
    NoCompiler,
    #[error("no daemon socket configured")]
    NoSocket,
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("driver produced {0} sub-commands; multi-step plans run locally")]
    MultipleCommands(usize),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error("input file '{0}' does not exist")]
    MissingInput(Utf8PathBuf),
    #[error("failed to resolve the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error(transparent)]
    Connect(#[from] NetError),
    #[error("request exchange failed: {0}")]
    Exchange(#[from] FrameError),
    #[error("daemon replied without a status")]
    NoStatus,
    #[error("daemon declined the request ({code:?}): {description}")]
    Declined {
        code: StatusCode,
        description: String,
    },
}

/// Runs the whole client pipeline for one invocation.
///
/// Every failure short of a daemon-reported build failure degrades to
/// [`Verdict::RunLocally`]; the user then observes exactly what a direct
/// compiler invocation would have produced, minus a connect attempt's worth
/// of latency.
pub fn do_main(
    argv: &[String],
    config: &Config,
    expander: &dyn CommandExpander,
    connector: &dyn DaemonConnector,
) -> Verdict {
    match try_remote(argv, config, expander, connector) {
        Ok(verdict) => verdict,
        Err(refusal) => {
            debug!(target: CLIENT_TARGET, %refusal, "falling back to the local compiler");
            Verdict::RunLocally
        }
    }
}

fn try_remote(
    argv: &[String],
    config: &Config,
    expander: &dyn CommandExpander,
    connector: &dyn DaemonConnector,
) -> Result<Verdict, RemoteRefusal> {
    if config.compiler.is_none() {
        return Err(RemoteRefusal::NoCompiler);
    }

    let trace = expander.expand(argv)?;
    // Multi-step plans (compile plus post-processing) stay local until
    // partial remote dispatch is settled.
    if trace.commands.len() != 1 {
        return Err(RemoteRefusal::MultipleCommands(trace.commands.len()));
    }

    let policy = CachePolicy::default();
    let mut flags = process_flags(&trace.commands[0], &policy)?;
    flags.compiler.version = trace.version;

    let socket = config.socket.as_ref().ok_or(RemoteRefusal::NoSocket)?;

    if !flags.input.as_std_path().exists() {
        return Err(RemoteRefusal::MissingInput(flags.input.clone()));
    }

    let mut channel = connector.connect(socket)?;
    let current_dir = crate::util::current_dir().map_err(RemoteRefusal::CurrentDir)?;
    let request = Envelope::Execute(ExecuteRequest {
        flags,
        current_dir,
        remote: false,
    });
    channel.send(&request)?;

    let Envelope::Status(status) = channel.recv()? else {
        return Err(RemoteRefusal::NoStatus);
    };
    match status.code {
        StatusCode::Ok => {
            debug!(target: CLIENT_TARGET, "build completed by the daemon");
            Ok(Verdict::DoneRemotely)
        }
        StatusCode::Execution => {
            warn!(
                target: CLIENT_TARGET,
                description = %status.description,
                "daemon failed the build"
            );
            Ok(Verdict::DaemonFailure(1))
        }
        code => Err(RemoteRefusal::Declined {
            code,
            description: status.description,
        }),
    }
}
