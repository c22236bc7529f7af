//! Control channel - one command/response exchange per call.
//!
//! The [`ControlChannelBuilder`] configures how exchanges run. Each call to
//! [`ControlChannel::send_command`]:
//! 1. Opens a fresh stream through the [`Connector`]
//! 2. Writes `<COMMAND>\n`
//! 3. Reads until the `\n.\n` terminator
//! 4. Opens the `OK ` / `FAIL ` envelope
//!
//! The stream is owned by the exchange and dropped (closed) on every exit
//! path. A per-call cancellation token and the timeout race the exchange; when
//! either wins, the exchange is dropped mid-flight, which closes the stream
//! under any pending read or write.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use syslogng_ctl::{ControlChannel, transport::UnixConnector};
//!
//! let channel = ControlChannel::builder(UnixConnector::default())
//!     .timeout(Duration::from_secs(2))
//!     .build();
//!
//! let stats = channel.send_command("STATS").await?;
//! ```

use std::io;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{ControlError, Result};
use crate::protocol::{
    open, read_until, sanitize, DEFAULT_READ_BUFFER_SIZE, RESPONSE_TERMINATOR, TERMINATOR_LINE,
};
use crate::transport::Connector;

/// Default time budget of a single exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration of a control channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Size of the buffer handed to each read call.
    pub read_buffer_size: usize,
    /// Time budget per exchange; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

/// Builder for configuring a [`ControlChannel`].
pub struct ControlChannelBuilder<C> {
    connector: C,
    config: ChannelConfig,
}

impl<C: Connector> ControlChannelBuilder<C> {
    /// Create a builder around a connector.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            config: ChannelConfig::default(),
        }
    }

    /// Set the read buffer size.
    ///
    /// Default: 4096
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the per-exchange timeout.
    ///
    /// Default: 5 seconds
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Let exchanges wait without a time limit.
    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = None;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the channel.
    pub fn build(self) -> ControlChannel<C> {
        ControlChannel {
            connector: self.connector,
            config: self.config,
        }
    }
}

/// Sends commands to the daemon, one fresh stream per command.
///
/// `&ControlChannel` is enough to send, so concurrent callers each get their
/// own stream.
pub struct ControlChannel<C> {
    connector: C,
    config: ChannelConfig,
}

impl<C: Connector> ControlChannel<C> {
    /// Create a channel with the default configuration.
    pub fn new(connector: C) -> Self {
        ControlChannelBuilder::new(connector).build()
    }

    /// Create a new channel builder.
    pub fn builder(connector: C) -> ControlChannelBuilder<C> {
        ControlChannelBuilder::new(connector)
    }

    /// Get the channel configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Get the connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Send `command` and return the response body.
    ///
    /// The `OK ` prefix and the newline before the terminator line are removed.
    /// Only the timeout bounds the exchange.
    pub async fn send_command(&self, command: &str) -> Result<String> {
        self.send_command_with(command, &CancellationToken::new()).await
    }

    /// Send `command`, racing the exchange against `cancel`.
    ///
    /// The token belongs to this call only. A fired token wins over whatever
    /// the exchange produced, including the I/O error caused by closing the
    /// stream. A token that is already cancelled fails the call before the
    /// stream is opened.
    pub async fn send_command_with(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        tracing::debug!("Sending control command {:?}", command);

        let timeout = async {
            match self.config.timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending::<Duration>().await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ControlError::Cancelled),
            limit = timeout => Err(ControlError::TimedOut(limit)),
            res = self.exchange(command) => res,
        };

        if cancel.is_cancelled() {
            tracing::debug!("Control command {:?} cancelled", command);
            return Err(ControlError::Cancelled);
        }

        result
    }

    /// Run one exchange on a fresh stream.
    async fn exchange(&self, command: &str) -> Result<String> {
        let mut stream = self
            .connector
            .connect()
            .await
            .map_err(ControlError::Connect)?;

        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(ControlError::Write)?;
        stream.flush().await.map_err(ControlError::Write)?;

        let read = read_until(
            &mut stream,
            RESPONSE_TERMINATOR.as_bytes(),
            self.config.read_buffer_size,
        )
        .await;

        let mut data = read.data;
        let mut rest = read.rest;
        let mut error = read.error;

        if !rest.is_empty() {
            // The separator starts with the body's last newline
            let newline = rest.split_to(1);
            data.extend_from_slice(&newline);
            if matches!(&error, Some(e) if e.kind() == io::ErrorKind::UnexpectedEof) {
                error = None;
            }
        }

        if !rest.starts_with(TERMINATOR_LINE.as_bytes()) {
            tracing::warn!(
                "Response to {:?} ended without terminator after {} bytes",
                command,
                data.len()
            );
            return Err(ControlError::MissingTerminator {
                response: sanitize(&data),
                source: error,
            });
        }

        if rest.len() > TERMINATOR_LINE.len() {
            tracing::debug!(
                "Ignoring {} bytes after response terminator",
                rest.len() - TERMINATOR_LINE.len()
            );
        }

        tracing::debug!("Received {} byte response to {:?}", data.len(), command);
        open(&data)
    }
}
