//! Wire protocol shared by the offload client and daemon.
//!
//! A connection carries a stream of length-framed messages. Each frame holds
//! one [`Envelope`]: the client sends [`Envelope::Execute`] and the daemon
//! answers with [`Envelope::Status`]. The payload encoding is JSON; peers only
//! depend on the field-level contract of the types in this crate, never on
//! the byte layout.

mod framing;
mod messages;

pub use framing::{FrameError, MAX_FRAME_LEN, read_message, write_message};
pub use messages::{
    CompilerIdentity, Envelope, ExecuteRequest, FlagRecord, Status, StatusCode,
};
