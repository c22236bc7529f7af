//! Connector abstraction - where a fresh duplex stream comes from.
//!
//! Every command runs on its own stream, so a channel does not hold a
//! connection. It holds a [`Connector`] and asks it for a stream per exchange.
//! Closing is implicit: the stream is dropped when the exchange ends.

use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

/// Boxed future returned by [`Connector::connect`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of duplex byte streams to the daemon.
pub trait Connector: Send + Sync {
    /// The stream type produced for each exchange.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a new stream.
    fn connect(&self) -> BoxFuture<'_, io::Result<Self::Stream>>;
}

/// Connector built from a closure.
///
/// Handy for in-memory transports:
///
/// ```
/// use syslogng_ctl::transport::FnConnector;
///
/// let connector = FnConnector::new(|| async {
///     let (client, _daemon) = tokio::io::duplex(1024);
///     Ok::<_, std::io::Error>(client)
/// });
/// # let _ = connector;
/// ```
pub struct FnConnector<F> {
    connect: F,
}

impl<F> FnConnector<F> {
    /// Wrap a closure returning a future of a stream.
    pub fn new(connect: F) -> Self {
        Self { connect }
    }
}

impl<F, Fut, S> Connector for FnConnector<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = io::Result<S>> + Send + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = S;

    fn connect(&self) -> BoxFuture<'_, io::Result<S>> {
        Box::pin((self.connect)())
    }
}
