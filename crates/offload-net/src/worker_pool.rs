//! Fixed-size worker pool with the signal discipline the connect loop needs.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

use nix::errno::Errno;
use nix::sys::pthread::{Pthread, pthread_kill, pthread_self};
use nix::sys::signal::{SigSet, SigmaskHow, Signal, pthread_sigmask};
use once_cell::sync::OnceCell;
use tracing::warn;

use crate::NET_TARGET;

/// Signal used to nudge workers out of `epoll_pwait`.
pub(crate) const INTERRUPT_SIGNAL: Signal = Signal::SIGUSR1;

static INTERRUPT_HOOK: OnceCell<signal_hook::SigId> = OnceCell::new();

/// Installs a no-op handler for [`INTERRUPT_SIGNAL`] once per process.
///
/// The handler's only job is to exist: a caught signal interrupts
/// `epoll_pwait` with `EINTR`, where the default disposition would kill the
/// process instead.
pub(crate) fn install_interrupt_hook() -> Result<(), io::Error> {
    INTERRUPT_HOOK
        .get_or_try_init(|| {
            // An empty handler is async-signal-safe.
            unsafe { signal_hook::low_level::register(INTERRUPT_SIGNAL as libc::c_int, || {}) }
        })
        .map(drop)
}

/// Blocks every signal on the calling thread, restoring the previous mask on
/// drop.
///
/// Spawning the pool inside the guard hands workers a fully-blocked
/// inherited mask; each worker then opens a window for [`INTERRUPT_SIGNAL`]
/// only while parked in `epoll_pwait`, so the designated signal reaches the
/// pool and nothing else does.
pub(crate) struct BlockedSignals {
    previous: SigSet,
}

impl BlockedSignals {
    pub(crate) fn enter() -> Result<Self, Errno> {
        let mut previous = SigSet::empty();
        pthread_sigmask(
            SigmaskHow::SIG_SETMASK,
            Some(&SigSet::all()),
            Some(&mut previous),
        )?;
        Ok(Self { previous })
    }
}

impl Drop for BlockedSignals {
    fn drop(&mut self) {
        if let Err(error) = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None) {
            warn!(target: NET_TARGET, error = %error, "failed to restore the signal mask");
        }
    }
}

/// The wait mask for a parked worker: everything except the interrupt.
pub(crate) fn worker_wait_mask() -> SigSet {
    let mut mask = SigSet::empty();
    for signal in Signal::iterator() {
        if signal != INTERRUPT_SIGNAL {
            mask.add(signal);
        }
    }
    mask
}

/// Threads sharing one unit of work until shutdown.
///
/// Dropping the pool flags shutdown, interrupts every worker with
/// [`INTERRUPT_SIGNAL`], and joins them.
pub(crate) struct WorkerPool {
    shutdown: Arc<AtomicBool>,
    workers: Vec<(Pthread, thread::JoinHandle<()>)>,
}

impl WorkerPool {
    /// Spawns `count` workers running `work(&shutdown_flag)`.
    pub(crate) fn spawn<F>(count: usize, work: F) -> Self
    where
        F: Fn(&AtomicBool) + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let work = Arc::new(work);
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let (ready_tx, ready_rx) = mpsc::channel();
            let flag = Arc::clone(&shutdown);
            let work = Arc::clone(&work);
            let handle = thread::Builder::new()
                .name(format!("offload-connect-{index}"))
                .spawn(move || {
                    let _ = ready_tx.send(pthread_self());
                    work(&flag);
                })
                .expect("failed to spawn connect worker");
            let pthread = ready_rx
                .recv()
                .expect("connect worker exited before reporting its thread id");
            workers.push((pthread, handle));
        }
        Self { shutdown, workers }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for (pthread, _) in &self.workers {
            if let Err(error) = pthread_kill(*pthread, INTERRUPT_SIGNAL) {
                warn!(target: NET_TARGET, error = %error, "failed to interrupt connect worker");
            }
        }
        for (_, handle) in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!(target: NET_TARGET, "connect worker panicked during shutdown");
            }
        }
    }
}
