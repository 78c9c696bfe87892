//! Readiness-based multiplexer for passive sockets.
//!
//! The loop owns every listening socket registered with it and reports each
//! accepted connection to a single dispatch callback; the service behind
//! that callback routes the connection to the listener's handler. Outbound
//! connect completion lives elsewhere (see `poller`): this loop only ever
//! watches for readable listeners and its own wake pipe.

use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::unistd::pipe2;
use socket2::Socket;
use tracing::warn;

use crate::NET_TARGET;
use crate::connection::Connection;

/// Invoked with the listener's fd and each freshly accepted connection.
pub(crate) type AcceptDispatch = Box<dyn Fn(RawFd, Arc<Connection>) + Send + Sync>;

/// Reserved token for the wake pipe; real fds are never this large.
const WAKE_TOKEN: u64 = u64::MAX;

const EVENT_BATCH: usize = 16;

pub(crate) struct EventLoop {
    epoll: Epoll,
    wake_read: OwnedFd,
    wake_write: OwnedFd,
    passive: Mutex<HashMap<RawFd, Socket>>,
    dispatch: AcceptDispatch,
    stopping: AtomicBool,
}

impl EventLoop {
    pub(crate) fn new(dispatch: AcceptDispatch) -> Result<Self, Errno> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
        let (wake_read, wake_write) = pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)?;
        epoll.add(&wake_read, EpollEvent::new(EpollFlags::EPOLLIN, WAKE_TOKEN))?;
        Ok(Self {
            epoll,
            wake_read,
            wake_write,
            passive: Mutex::new(HashMap::new()),
            dispatch,
            stopping: AtomicBool::new(false),
        })
    }

    /// Registers a listening socket for readable events and takes ownership
    /// of it. Each fd carries at most one registration; a duplicate is an
    /// `EEXIST` error from the kernel.
    pub(crate) fn handle_passive(&self, socket: Socket) -> Result<(), Errno> {
        let fd = socket.as_raw_fd();
        self.epoll
            .add(&socket, EpollEvent::new(EpollFlags::EPOLLIN, fd as u64))?;
        self.passive
            .lock()
            .expect("listener table mutex poisoned")
            .insert(fd, socket);
        Ok(())
    }

    /// Drops a registration and closes the listener. Idempotent with respect
    /// to fds the loop no longer knows: deregistering twice, or after the
    /// socket closed, is not an error.
    pub(crate) fn forget(&self, fd: RawFd) {
        let removed = self
            .passive
            .lock()
            .expect("listener table mutex poisoned")
            .remove(&fd);
        let Some(socket) = removed else {
            return;
        };
        if let Err(error) = self.epoll.delete(&socket)
            && error != Errno::ENOENT
            && error != Errno::EBADF
        {
            warn!(target: NET_TARGET, fd, error = %error, "failed to deregister listener");
        }
    }

    /// Blocks the calling thread, accepting and dispatching connections
    /// until [`stop`](Self::stop) is observed.
    pub(crate) fn run(&self) -> Result<(), Errno> {
        let mut events = [EpollEvent::empty(); EVENT_BATCH];
        while !self.stopping.load(Ordering::SeqCst) {
            let count = match self.epoll.wait(&mut events, EpollTimeout::NONE) {
                Ok(count) => count,
                Err(Errno::EINTR) => continue,
                Err(error) => return Err(error),
            };
            for event in &events[..count] {
                if event.data() == WAKE_TOKEN {
                    // The loop condition re-reads the flag.
                    self.drain_wake();
                    continue;
                }
                self.accept_ready(event.data() as RawFd);
            }
        }
        Ok(())
    }

    /// Wakes [`run`](Self::run) and makes it return.
    pub(crate) fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        match nix::unistd::write(&self.wake_write, &[0_u8]) {
            Ok(_) | Err(Errno::EAGAIN) => {}
            Err(error) => {
                warn!(target: NET_TARGET, error = %error, "failed to wake the event loop");
            }
        }
    }

    fn drain_wake(&self) {
        let mut sink = [0_u8; 8];
        while matches!(nix::unistd::read(self.wake_read.as_raw_fd(), &mut sink), Ok(count) if count > 0) {}
    }

    fn accept_ready(&self, fd: RawFd) {
        let accepted = {
            let table = self.passive.lock().expect("listener table mutex poisoned");
            let listener = table
                .get(&fd)
                .expect("ready fd missing from the listener table");
            match listener.accept() {
                Ok((socket, _peer)) => Some(socket),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => None,
                Err(error) => {
                    warn!(target: NET_TARGET, fd, error = %error, "accept failed");
                    None
                }
            }
        };
        let Some(socket) = accepted else {
            return;
        };
        // Handlers get a conventional blocking stream.
        if let Err(error) = socket.set_nonblocking(false) {
            warn!(target: NET_TARGET, error = %error, "failed to restore blocking mode");
            return;
        }
        (self.dispatch)(fd, Connection::accepted(socket));
    }
}
