//! Socket connectors.
//!
//! - Unix: Unix Domain Socket (the daemon's default control socket)
//! - TCP: for control sockets exposed through a TCP forwarder
//!
//! # Example
//!
//! ```ignore
//! use syslogng_ctl::transport::UnixConnector;
//!
//! let connector = UnixConnector::new("/var/run/syslog-ng/syslog-ng.ctl");
//! let stream = connector.connect().await?;
//! ```

use std::io;

use tokio::net::TcpStream;

use super::connector::{BoxFuture, Connector};

/// Default location of the daemon's control socket.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/syslog-ng/syslog-ng.ctl";

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use std::path::{Path, PathBuf};
    use tokio::net::UnixStream;

    /// Connects to a Unix Domain Socket path.
    #[derive(Debug, Clone)]
    pub struct UnixConnector {
        path: PathBuf,
    }

    impl UnixConnector {
        /// Create a connector for the socket at `path`.
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        /// Get the socket path.
        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Default for UnixConnector {
        fn default() -> Self {
            Self::new(DEFAULT_SOCKET_PATH)
        }
    }

    impl Connector for UnixConnector {
        type Stream = UnixStream;

        fn connect(&self) -> BoxFuture<'_, io::Result<UnixStream>> {
            Box::pin(UnixStream::connect(&self.path))
        }
    }
}

// ============================================================================
// TCP Implementation
// ============================================================================

/// Connects to a TCP address (`host:port`).
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// Create a connector for `addr`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Get the target address.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self) -> BoxFuture<'_, io::Result<TcpStream>> {
        Box::pin(TcpStream::connect(self.addr.as_str()))
    }
}

#[cfg(unix)]
pub use unix_impl::UnixConnector;
