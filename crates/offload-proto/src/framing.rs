//! Length-prefixed framing for protocol messages.
//!
//! Each frame is a 4-byte big-endian payload length followed by the JSON
//! payload. The length is validated against [`MAX_FRAME_LEN`] before any
//! allocation so a corrupt or hostile peer cannot force an oversized buffer.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::messages::Envelope;

/// Upper bound on a frame payload (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Errors raised while moving frames across a stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying stream failed while writing.
    #[error("failed to write frame: {0}")]
    Write(#[source] io::Error),
    /// The underlying stream failed while reading.
    #[error("failed to read frame: {0}")]
    Read(#[source] io::Error),
    /// The peer closed the stream inside a frame.
    #[error("peer closed the stream mid-frame")]
    Truncated,
    /// The length prefix exceeds [`MAX_FRAME_LEN`].
    #[error("frame of {length} bytes exceeds the {limit}-byte limit")]
    TooLarge { length: usize, limit: usize },
    /// The payload was not a valid message.
    #[error("malformed message payload: {0}")]
    Codec(#[source] serde_json::Error),
}

/// Writes one message as a single frame and flushes the stream.
pub fn write_message<W: Write>(writer: &mut W, message: &Envelope) -> Result<(), FrameError> {
    let payload = serde_json::to_vec(message).map_err(FrameError::Codec)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            length: payload.len(),
            limit: MAX_FRAME_LEN,
        });
    }
    let header = u32::try_from(payload.len())
        .map_err(|_| FrameError::TooLarge {
            length: payload.len(),
            limit: MAX_FRAME_LEN,
        })?
        .to_be_bytes();
    writer.write_all(&header).map_err(FrameError::Write)?;
    writer.write_all(&payload).map_err(FrameError::Write)?;
    writer.flush().map_err(FrameError::Write)
}

/// Reads one complete frame and decodes its message.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Envelope, FrameError> {
    let mut header = [0_u8; HEADER_LEN];
    read_frame_bytes(reader, &mut header)?;
    let length = u32::from_be_bytes(header) as usize;
    if length > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            length,
            limit: MAX_FRAME_LEN,
        });
    }
    let mut payload = vec![0_u8; length];
    read_frame_bytes(reader, &mut payload)?;
    serde_json::from_slice(&payload).map_err(FrameError::Codec)
}

fn read_frame_bytes<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError> {
    reader.read_exact(buf).map_err(|error| {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Read(error)
        }
    })
}
