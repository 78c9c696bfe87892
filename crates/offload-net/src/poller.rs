//! Minimal epoll wrapper for the connect-completion pool.
//!
//! The workers depend on `epoll_pwait`: the wait mask must open the
//! interrupt-signal window atomically with the wait itself, or a shutdown
//! signal delivered just before the call would be consumed early and the
//! worker would park forever. `nix` wraps every other epoll operation the
//! service needs but not the `p`-variant wait, so this module talks to libc
//! directly and keeps the unsafety in one place.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::sys::signal::SigSet;

/// Ready events drained per wait. Plenty for a burst of connect completions.
pub(crate) const WAIT_BATCH: usize = 10;

pub(crate) type ReadyEvents = [libc::epoll_event; WAIT_BATCH];

pub(crate) fn empty_events() -> ReadyEvents {
    [libc::epoll_event { events: 0, u64: 0 }; WAIT_BATCH]
}

/// An epoll instance dedicated to one-shot writable watches on connecting
/// sockets.
pub(crate) struct ConnectPoller {
    epoll: OwnedFd,
}

impl ConnectPoller {
    pub(crate) fn new() -> Result<Self, Errno> {
        let fd = Errno::result(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
        Ok(Self {
            // Just created and owned by nothing else.
            epoll: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Registers `fd` for a single writable readiness report.
    pub(crate) fn watch_writable_once(&self, fd: RawFd) -> Result<(), Errno> {
        let mut event = libc::epoll_event {
            events: (libc::EPOLLOUT | libc::EPOLLONESHOT) as u32,
            u64: fd as u64,
        };
        Errno::result(unsafe {
            libc::epoll_ctl(self.epoll.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &mut event)
        })
        .map(drop)
    }

    /// Removes a watch. One-shot watches stay registered after firing, so
    /// completed fds must be forgotten before their sockets close.
    pub(crate) fn forget(&self, fd: RawFd) -> Result<(), Errno> {
        Errno::result(unsafe {
            libc::epoll_ctl(
                self.epoll.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            )
        })
        .map(drop)
    }

    /// Waits for ready fds with `mask` installed for the duration of the
    /// wait, exactly as `sigprocmask` + `epoll_wait` cannot.
    pub(crate) fn wait(&self, events: &mut ReadyEvents, mask: &SigSet) -> Result<usize, Errno> {
        let count = Errno::result(unsafe {
            libc::epoll_pwait(
                self.epoll.as_raw_fd(),
                events.as_mut_ptr(),
                WAIT_BATCH as libc::c_int,
                -1,
                mask.as_ref(),
            )
        })?;
        Ok(count as usize)
    }
}
