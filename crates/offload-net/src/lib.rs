//! Stream-socket service layer shared by the offload client and daemon.
//!
//! The crate packages the pieces between raw sockets and the protocol
//! layer:
//!
//! - [`Endpoint`] names a filesystem or IP stream address;
//! - [`Connection`] owns a connected socket and frames
//!   [`Envelope`](offload_proto::Envelope)s over it;
//! - [`NetworkService`] creates listeners and outbound connections, runs the
//!   accept loop, and completes non-blocking connects on a worker pool.
//!
//! The daemon drives a service with [`NetworkService::run`]; the client only
//! needs [`connect_sync`].

mod connection;
mod endpoint;
mod errors;
mod event_loop;
mod poller;
mod service;
mod worker_pool;

pub use connection::Connection;
pub use endpoint::{Endpoint, EndpointParseError};
pub use errors::NetError;
pub use service::{AcceptCallback, ConnectCallback, NetworkService, connect_sync};

pub(crate) const NET_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");
