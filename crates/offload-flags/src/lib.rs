//! Compiler command canonicalisation.
//!
//! The crate turns raw compiler sub-commands into the partitioned
//! [`FlagRecord`](offload_proto::FlagRecord) the daemon caches against. Two
//! entry points cover the pipeline:
//!
//! - [`parse_trace`] tokenises the driver's trace output (the sub-commands
//!   the driver would run) into argv lists;
//! - [`process_flags`] classifies one argv into structural fields and the
//!   `{other, non_cached, cc_only}` partitions, under an injectable
//!   [`CachePolicy`].

mod classify;
mod options;
mod policy;
mod trace;

pub use classify::{ClassifyError, CommandClass, command_class, process_flags};
pub use policy::{CachePolicy, DEFAULT_NON_CACHED};
pub use trace::{DriverTrace, TraceError, parse_trace};
