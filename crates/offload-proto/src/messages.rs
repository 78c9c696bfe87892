//! Message types exchanged between the client wrapper and the daemon.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Identity of the compiler binary a request was built against.
///
/// The daemon uses the identity both for cache partitioning and to refuse
/// requests built against a compiler it does not carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerIdentity {
    /// Absolute path of the compiler binary.
    pub path: Utf8PathBuf,
    /// Free-form identifying string, as printed by the driver.
    pub version: String,
    /// Plugin names the invocation loads, in command-line order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<String>,
}

/// The structured, partitioned representation of one compiler command.
///
/// Produced by the flag classifier and consumed both as a cache key and as
/// the argument list for remote execution. Invariants:
///
/// - exactly one `input`; at most one of `output`, `action`, `language`;
/// - every token of the source command appears in exactly one of the
///   structural fields or ordered partitions below, except tokens the
///   classifier drops outright;
/// - ordering within each partition matches command-line order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRecord {
    pub compiler: CompilerIdentity,
    /// The single translation-unit source, relative or absolute.
    pub input: Utf8PathBuf,
    /// The desired output artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Utf8PathBuf>,
    /// The driver action, by flag spelling (for example `-emit-obj`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// The language selected with `-x`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Dependency-output path, when the command writes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deps_file: Option<Utf8PathBuf>,
    /// Flags that participate in the cache key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other: Vec<String>,
    /// Flags forwarded to the daemon but excluded from the cache key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_cached: Vec<String>,
    /// Flags relevant only to local assembly, never forwarded for
    /// remote preprocessing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc_only: Vec<String>,
}

/// An execution request sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub flags: FlagRecord,
    /// Directory the compiler invocation ran from; relative paths in
    /// `flags` resolve against it.
    pub current_dir: Utf8PathBuf,
    /// Whether the request already crossed a daemon boundary. The client
    /// always sends `false`; a daemon forwarding to an absorber sets `true`.
    pub remote: bool,
}

/// Outcome classes a daemon reports for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// The daemon owns the build and it succeeded.
    Ok,
    /// The daemon declined the request for a transient or policy reason;
    /// the client should build locally.
    Inconsequent,
    /// The daemon could not match the request's compiler version.
    NoVersion,
    /// The request was malformed.
    BadMessage,
    /// The build ran and failed; a local retry would mask a real error.
    Execution,
    /// The daemon is saturated.
    Overload,
}

/// A status reply received by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    /// Human-readable detail, suitable for the wrapper's diagnostics.
    #[serde(default)]
    pub description: String,
}

impl Status {
    #[must_use]
    pub fn new(code: StatusCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

/// One message on the wire. Each frame carries exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
    Execute(ExecuteRequest),
    Status(Status),
}
