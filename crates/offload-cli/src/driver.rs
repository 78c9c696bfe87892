//! Driver adapter: expands one user invocation into tokenised sub-commands.
//!
//! The production implementation shells out to the real driver with its
//! trace flag and parses the plan it prints. The trait seam exists so the
//! client state machine never touches a process directly; tests (and any
//! future in-process driver binding) substitute their own expander.

use std::process::Command;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::debug;

use offload_flags::{DriverTrace, TraceError, parse_trace};

use crate::CLIENT_TARGET;

/// Flag that asks the driver to print its compilation plan instead of
/// running it.
const TRACE_FLAG: &str = "-###";

/// Expands a user argv into the driver's ordered sub-command list.
pub trait CommandExpander {
    fn expand(&self, argv: &[String]) -> Result<DriverTrace, DriverError>;
}

/// Reasons an invocation could not be expanded.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to run driver '{driver}': {source}")]
    Spawn {
        driver: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("driver '{driver}' exited with {status}")]
    Failed {
        driver: Utf8PathBuf,
        status: std::process::ExitStatus,
    },
    #[error("driver output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("unparsable driver output: {0}")]
    Unparsable(#[from] TraceError),
}

/// Expands invocations by running the configured driver with [`TRACE_FLAG`].
#[derive(Debug, Clone)]
pub struct TraceExpander {
    driver: Utf8PathBuf,
}

impl TraceExpander {
    #[must_use]
    pub fn new(driver: impl Into<Utf8PathBuf>) -> Self {
        Self {
            driver: driver.into(),
        }
    }
}

impl CommandExpander for TraceExpander {
    fn expand(&self, argv: &[String]) -> Result<DriverTrace, DriverError> {
        let output = Command::new(self.driver.as_std_path())
            .arg(TRACE_FLAG)
            .args(argv.iter().skip(1))
            .output()
            .map_err(|source| DriverError::Spawn {
                driver: self.driver.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(DriverError::Failed {
                driver: self.driver.clone(),
                status: output.status,
            });
        }
        // The driver prints the plan on stderr, keeping stdout clean for
        // whatever the plan itself would produce.
        let trace = String::from_utf8(output.stderr)?;
        let plan = parse_trace(&trace)?;
        debug!(
            target: CLIENT_TARGET,
            driver = %self.driver,
            commands = plan.commands.len(),
            "expanded invocation"
        );
        Ok(plan)
    }
}
