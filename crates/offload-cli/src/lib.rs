//! Client runtime for the offload distributed-compilation wrapper.
//!
//! The wrapper intercepts one compiler invocation, asks the driver to expand
//! it, canonicalises the resulting flags, and offers the build to the daemon
//! named by the environment. Any failure along that path degrades to the
//! behaviour the user would get without offload installed: the real compiler
//! runs locally with the original arguments.

use std::process::ExitCode;

use camino::Utf8Path;

pub mod client;
pub mod config;
pub mod driver;
pub mod telemetry;
pub mod util;

mod errors;

use client::{ServiceConnector, Verdict};
use config::Config;
use driver::TraceExpander;
use errors::AppError;

pub(crate) const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Runs the wrapper for one invocation.
///
/// Returns only when the daemon owned the build (or definitively failed
/// it); the local fall-back path replaces the process image instead.
#[must_use]
pub fn run(argv: Vec<String>) -> ExitCode {
    match try_run(&argv) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("offload: {error}");
            ExitCode::FAILURE
        }
    }
}

fn try_run(argv: &[String]) -> Result<ExitCode, AppError> {
    let config = Config::from_env()?;
    telemetry::initialise(&config.log_filter)?;

    let verdict = match &config.compiler {
        Some(compiler) => {
            let expander = TraceExpander::new(compiler.clone());
            client::do_main(argv, &config, &expander, &ServiceConnector)
        }
        None => Verdict::RunLocally,
    };

    match verdict {
        Verdict::DoneRemotely => Ok(ExitCode::SUCCESS),
        Verdict::DaemonFailure(code) => Ok(ExitCode::from(u8::try_from(code).unwrap_or(1))),
        Verdict::RunLocally => {
            let compiler = config.compiler.as_deref().ok_or(AppError::NoCompiler)?;
            Err(exec_local(compiler, argv))
        }
    }
}

/// Replaces the wrapper process with the real compiler. Returns only when
/// the exec itself failed.
fn exec_local(compiler: &Utf8Path, argv: &[String]) -> AppError {
    use std::os::unix::process::CommandExt;

    let source = std::process::Command::new(compiler.as_std_path())
        .args(argv.iter().skip(1))
        .exec();
    AppError::Exec {
        compiler: compiler.to_owned(),
        source,
    }
}

#[cfg(test)]
mod tests;
