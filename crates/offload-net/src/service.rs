//! The network service: listeners, outbound connections, and the glue
//! between the event loop and the connect-completion pool.

use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use camino::Utf8Path;
use socket2::{Socket, Type};
use tracing::{debug, info};

use crate::NET_TARGET;
use crate::connection::Connection;
use crate::endpoint::{Endpoint, resolve_host};
use crate::errors::NetError;
use crate::event_loop::EventLoop;
use crate::poller::{ConnectPoller, empty_events};
use crate::worker_pool::{
    BlockedSignals, WorkerPool, install_interrupt_hook, worker_wait_mask,
};

/// Invoked for every connection a listener accepts.
pub type AcceptCallback = Box<dyn Fn(Arc<Connection>) + Send + Sync>;

/// Invoked exactly once when an asynchronous connect completes or fails.
pub type ConnectCallback = Box<dyn FnOnce(Result<Arc<Connection>, NetError>) + Send>;

const LISTEN_BACKLOG: i32 = 100;

struct ListenerEntry {
    endpoint: Endpoint,
    on_accept: AcceptCallback,
}

struct PendingConnect {
    socket: Socket,
    endpoint: Endpoint,
    callback: ConnectCallback,
}

struct ServiceState {
    /// Written from `listen`, read from the accept path.
    listeners: Mutex<HashMap<RawFd, ListenerEntry>>,
    /// Guarded map of in-flight non-blocking connects.
    pending: Mutex<HashMap<RawFd, PendingConnect>>,
    poller: ConnectPoller,
}

/// Creates and manages listening sockets and outbound connections.
///
/// One service owns one event loop (accepts) and one connect-completion
/// poller shared by `concurrency` workers. [`run`](Self::run) blocks the
/// calling thread; every other operation may be called from any thread.
/// Dropping the service joins the workers and releases pending connects
/// without invoking their callbacks.
pub struct NetworkService {
    state: Arc<ServiceState>,
    event_loop: Arc<EventLoop>,
    pool: Mutex<Option<WorkerPool>>,
    concurrency: usize,
}

impl NetworkService {
    pub fn new(concurrency: usize) -> Result<Self, NetError> {
        let state = Arc::new(ServiceState {
            listeners: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            poller: ConnectPoller::new().map_err(NetError::EventLoop)?,
        });
        let dispatch_state = Arc::clone(&state);
        let event_loop = EventLoop::new(Box::new(move |fd, connection| {
            let listeners = dispatch_state
                .listeners
                .lock()
                .expect("listener table mutex poisoned");
            let entry = listeners
                .get(&fd)
                .expect("accepted fd missing from the listener table");
            (entry.on_accept)(connection);
        }))
        .map_err(NetError::EventLoop)?;
        Ok(Self {
            state,
            event_loop: Arc::new(event_loop),
            pool: Mutex::new(None),
            concurrency: concurrency.max(1),
        })
    }

    /// Binds a filesystem-namespace listener, unlinking any stale entry at
    /// `path` first (the daemon owns its socket path; clients never unlink).
    pub fn listen_unix(
        &self,
        path: impl AsRef<Utf8Path>,
        on_accept: AcceptCallback,
    ) -> Result<(), NetError> {
        self.listen(Endpoint::unix(path.as_ref()), on_accept)
    }

    /// Binds an IP-namespace listener with `SO_REUSEADDR` set.
    pub fn listen_tcp(
        &self,
        host: impl Into<String>,
        port: u16,
        on_accept: AcceptCallback,
    ) -> Result<(), NetError> {
        self.listen(Endpoint::tcp(host, port), on_accept)
    }

    fn listen(&self, endpoint: Endpoint, on_accept: AcceptCallback) -> Result<(), NetError> {
        {
            let listeners = self
                .state
                .listeners
                .lock()
                .expect("listener table mutex poisoned");
            if listeners.values().any(|entry| entry.endpoint == endpoint) {
                return Err(NetError::DuplicateListener(endpoint.to_string()));
            }
        }

        let socket = match &endpoint {
            Endpoint::Unix { path } => bind_unix(path)?,
            Endpoint::Tcp { host, port } => bind_tcp(host, *port)?,
        };
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|source| NetError::Listen {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let fd = socket.as_raw_fd();
        self.state
            .listeners
            .lock()
            .expect("listener table mutex poisoned")
            .insert(
                fd,
                ListenerEntry {
                    endpoint: endpoint.clone(),
                    on_accept,
                },
            );
        if let Err(source) = self.event_loop.handle_passive(socket) {
            self.state
                .listeners
                .lock()
                .expect("listener table mutex poisoned")
                .remove(&fd);
            return Err(NetError::Register {
                endpoint: endpoint.to_string(),
                source,
            });
        }

        info!(target: NET_TARGET, endpoint = %endpoint, "listener active");
        Ok(())
    }

    /// Opens a blocking connection to `endpoint`.
    pub fn connect_sync(&self, endpoint: &Endpoint) -> Result<Arc<Connection>, NetError> {
        connect_sync(endpoint)
    }

    /// Starts a non-blocking connect to `endpoint`.
    ///
    /// A connect that completes immediately invokes `callback` inline on the
    /// caller's thread; otherwise the callback runs later on one of the
    /// pool's workers. Either way it runs exactly once — except across a
    /// service shutdown, which drops still-pending callbacks uninvoked.
    pub fn connect_async(
        &self,
        endpoint: &Endpoint,
        callback: ConnectCallback,
    ) -> Result<(), NetError> {
        let address = endpoint.to_sock_addr()?;
        let socket =
            Socket::new(address.domain(), Type::STREAM, None).map_err(NetError::CreateSocket)?;
        socket.set_nonblocking(true).map_err(NetError::CreateSocket)?;

        match socket.connect(&address) {
            Ok(()) => {
                debug!(target: NET_TARGET, endpoint = %endpoint, "connect completed inline");
                callback(Ok(Connection::connected(socket, endpoint.clone())));
                return Ok(());
            }
            Err(error) if error.raw_os_error() == Some(libc::EINPROGRESS) => {}
            Err(source) => {
                return Err(NetError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
        }

        let fd = socket.as_raw_fd();
        let mut pending = self
            .state
            .pending
            .lock()
            .expect("pending-connect mutex poisoned");
        self.state
            .poller
            .watch_writable_once(fd)
            .map_err(|source| NetError::Register {
                endpoint: endpoint.to_string(),
                source,
            })?;
        pending.insert(
            fd,
            PendingConnect {
                socket,
                endpoint: endpoint.clone(),
                callback,
            },
        );
        Ok(())
    }

    /// Spawns the connect-completion workers and runs the accept loop on the
    /// calling thread until [`stop`](Self::stop).
    pub fn run(&self) -> Result<(), NetError> {
        install_interrupt_hook().map_err(NetError::InterruptHook)?;
        let pool = {
            let guard = BlockedSignals::enter().map_err(NetError::SignalMask)?;
            let state = Arc::clone(&self.state);
            let pool = WorkerPool::spawn(self.concurrency, move |shutting_down| {
                connect_worker(&state, shutting_down);
            });
            drop(guard);
            pool
        };
        *self.pool.lock().expect("worker pool mutex poisoned") = Some(pool);
        let result = self.event_loop.run().map_err(NetError::EventLoop);

        // The loop no longer dispatches; release the listeners with it.
        let fds: Vec<RawFd> = self
            .state
            .listeners
            .lock()
            .expect("listener table mutex poisoned")
            .drain()
            .map(|(fd, _)| fd)
            .collect();
        for fd in fds {
            self.event_loop.forget(fd);
        }
        result
    }

    /// Stops the accept loop and tears the worker pool down. Pending connect
    /// callbacks are released uninvoked; their sockets close.
    pub fn stop(&self) {
        self.event_loop.stop();
        self.pool
            .lock()
            .expect("worker pool mutex poisoned")
            .take();
        self.state
            .pending
            .lock()
            .expect("pending-connect mutex poisoned")
            .clear();
    }
}

impl Drop for NetworkService {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Opens a blocking connection to `endpoint` without a service instance.
///
/// The client's synchronous path needs no event loop or worker pool; this is
/// the whole of it.
pub fn connect_sync(endpoint: &Endpoint) -> Result<Arc<Connection>, NetError> {
    let address = endpoint.to_sock_addr()?;
    let socket =
        Socket::new(address.domain(), Type::STREAM, None).map_err(NetError::CreateSocket)?;
    socket
        .connect(&address)
        .map_err(|source| NetError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;
    Ok(Connection::connected(socket, endpoint.clone()))
}

fn bind_unix(path: &Utf8Path) -> Result<Socket, NetError> {
    match std::fs::remove_file(path.as_std_path()) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(NetError::Unlink {
                path: path.to_owned(),
                source,
            });
        }
    }
    let socket = Socket::new(socket2::Domain::UNIX, Type::STREAM, None)
        .map_err(NetError::CreateSocket)?;
    socket
        .set_nonblocking(true)
        .map_err(NetError::CreateSocket)?;
    let address =
        socket2::SockAddr::unix(path.as_std_path()).map_err(|source| NetError::Address {
            endpoint: Endpoint::unix(path).to_string(),
            source,
        })?;
    socket.bind(&address).map_err(|source| NetError::Bind {
        endpoint: Endpoint::unix(path).to_string(),
        source,
    })?;
    Ok(socket)
}

fn bind_tcp(host: &str, port: u16) -> Result<Socket, NetError> {
    let address = resolve_host(host, port)?;
    let socket = Socket::new(socket2::Domain::for_address(address), Type::STREAM, None)
        .map_err(NetError::CreateSocket)?;
    socket
        .set_reuse_address(true)
        .map_err(NetError::CreateSocket)?;
    socket
        .set_nonblocking(true)
        .map_err(NetError::CreateSocket)?;
    socket
        .bind(&socket2::SockAddr::from(address))
        .map_err(|source| NetError::Bind {
            endpoint: Endpoint::tcp(host, port).to_string(),
            source,
        })?;
    Ok(socket)
}

/// The loop every connect worker runs: drain completions until shutdown.
fn connect_worker(state: &ServiceState, shutting_down: &AtomicBool) {
    let wait_mask = worker_wait_mask();
    let mut events = empty_events();

    while !shutting_down.load(Ordering::SeqCst) {
        let count = match state.poller.wait(&mut events, &wait_mask) {
            Ok(count) => count,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(error) => {
                debug!(target: NET_TARGET, error = %error, "connect wait failed");
                break;
            }
        };

        for event in &events[..count] {
            assert!(
                event.events & libc::EPOLLOUT as u32 != 0,
                "connect poller reported a non-writable event"
            );
            let fd = event.u64 as RawFd;
            let PendingConnect {
                socket,
                endpoint,
                callback,
            } = {
                let mut pending = state
                    .pending
                    .lock()
                    .expect("pending-connect mutex poisoned");
                pending
                    .remove(&fd)
                    .expect("completed fd missing from the pending-connect table")
            };
            state
                .poller
                .forget(fd)
                .expect("failed to deregister a completed connect");

            match socket.take_error() {
                Ok(None) => {
                    // Hand the application a socket that stays non-blocking,
                    // as the connect was.
                    if let Err(source) = socket.set_nonblocking(true) {
                        callback(Err(NetError::Connect {
                            endpoint: endpoint.to_string(),
                            source,
                        }));
                        continue;
                    }
                    callback(Ok(Connection::connected(socket, endpoint)));
                }
                Ok(Some(source)) | Err(source) => {
                    callback(Err(NetError::Connect {
                        endpoint: endpoint.to_string(),
                        source,
                    }));
                    // Dropping the socket closes the failed fd.
                }
            }
        }
    }
}
