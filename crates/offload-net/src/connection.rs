//! Connected stream sockets.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};

use socket2::Socket;

use offload_proto::{Envelope, FrameError, read_message, write_message};

use crate::endpoint::Endpoint;

/// A connected stream shared between the service and the application.
///
/// Connections are handed out as `Arc<Connection>`; the service keeps no
/// reference of its own once the accept or connect callback returns, so the
/// last application handle dropping closes the socket. Tests (and cautious
/// callers) can hold a [`Weak`](std::sync::Weak) to observe that lifetime —
/// an expired handle after a service shutdown means the operation was
/// cancelled.
pub struct Connection {
    socket: Mutex<Socket>,
    endpoint: Option<Endpoint>,
}

impl Connection {
    /// Wraps a socket accepted from a listener.
    pub(crate) fn accepted(socket: Socket) -> Arc<Self> {
        Arc::new(Self {
            socket: Mutex::new(socket),
            endpoint: None,
        })
    }

    /// Wraps an outbound socket connected to `endpoint`.
    pub(crate) fn connected(socket: Socket, endpoint: Endpoint) -> Arc<Self> {
        Arc::new(Self {
            socket: Mutex::new(socket),
            endpoint: Some(endpoint),
        })
    }

    /// The endpoint an outbound connection was dialled against. Accepted
    /// connections have none.
    #[must_use]
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Switches the socket between blocking and non-blocking modes.
    ///
    /// Accepted and synchronously connected sockets start blocking;
    /// asynchronously connected sockets are handed over non-blocking.
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.lock().set_nonblocking(nonblocking)
    }

    /// Writes one framed message.
    pub fn send(&self, message: &Envelope) -> Result<(), FrameError> {
        write_message(&mut *self.lock(), message)
    }

    /// Reads one framed message, blocking until a full frame arrives.
    pub fn recv(&self) -> Result<Envelope, FrameError> {
        read_message(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Socket> {
        self.socket.lock().expect("connection mutex poisoned")
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
