//! Transport module - where the duplex byte stream to the daemon comes from.
//!
//! Provides:
//! - the [`Connector`] trait (read + write, closed on drop)
//! - Unix Domain Socket and TCP connectors
//! - [`FnConnector`] for closure-built streams such as in-memory pipes

mod connector;
mod socket;

pub use connector::{BoxFuture, Connector, FnConnector};
#[cfg(unix)]
pub use socket::UnixConnector;
pub use socket::{TcpConnector, DEFAULT_SOCKET_PATH};
