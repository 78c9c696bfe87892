//! Wrapper entrypoint.
//!
//! Invoked in place of the real compiler (usually through a symlink on
//! `PATH`). The runtime either hands the build to the offload daemon or
//! replaces this process with the configured compiler.

use std::process::ExitCode;

fn main() -> ExitCode {
    offload_cli::run(std::env::args().collect())
}
