//! Error types for syslogng-ctl.
//!
//! Errors fall into three layers:
//! - [`ControlError`]: transport, framing and command failures of a single
//!   control-socket exchange.
//! - [`StatsError`]: per-line problems in a legacy `STATS` dump.
//! - [`MetricError`]: per-item problems while building metric families.
//!
//! Content errors ([`StatsError`], [`MetricError`]) never abort a batch. They
//! are collected next to the successfully decoded items.

use std::num::ParseIntError;
use std::time::Duration;

use thiserror::Error;

use crate::metrics::MetricKind;
use crate::protocol::RESPONSE_TERMINATOR;

/// Error of a single command/response exchange with the daemon.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The transport could not be opened.
    #[error("failed to connect to control socket: {0}")]
    Connect(#[source] std::io::Error),

    /// Sending the command failed.
    #[error("failed to send command: {0}")]
    Write(#[source] std::io::Error),

    /// The response ended without the terminator line.
    ///
    /// `response` holds everything read before the stream ended, `source`
    /// the read error (end-of-stream included) that stopped the read.
    #[error("missing response terminator {:?}", RESPONSE_TERMINATOR)]
    MissingTerminator {
        response: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The daemon answered with a `FAIL` envelope.
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// The exchange was cancelled by the caller.
    #[error("command cancelled")]
    Cancelled,

    /// The exchange did not finish within the configured timeout.
    #[error("command timed out after {0:?}")]
    TimedOut(Duration),

    /// The daemon answered with something the caller cannot interpret.
    #[error("got unexpected response: {0:?}")]
    UnexpectedResponse(String),
}

impl ControlError {
    /// True if the underlying read stopped at end-of-stream.
    pub fn is_eof(&self) -> bool {
        matches!(
            self,
            ControlError::MissingTerminator { source: Some(e), .. }
                if e.kind() == std::io::ErrorKind::UnexpectedEof
        )
    }

    /// Data read before a response ended without its terminator.
    pub fn partial_response(&self) -> Option<&str> {
        match self {
            ControlError::MissingTerminator { response, .. } => Some(response),
            _ => None,
        }
    }
}

/// Invalid line in a legacy `STATS` response.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Wrong field count or malformed state column.
    #[error("invalid stat line: {0:?}")]
    InvalidLine(String),

    /// The counter column is not an unsigned 64-bit integer.
    #[error("invalid counter in stat line {line:?}: {source}")]
    InvalidNumber {
        line: String,
        #[source]
        source: ParseIntError,
    },
}

/// Problem encountered while producing metric families.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error(transparent)]
    Stats(#[from] StatsError),

    /// A family was pushed again with a different type.
    #[error("expected metric family {family:?} to have type {expected} but had {actual}")]
    TypeMismatch {
        family: String,
        expected: MetricKind,
        actual: MetricKind,
    },

    /// The family declares a type this crate does not carry.
    #[error("metric type {kind:?} of family {family:?} is not supported")]
    UnsupportedType { family: String, kind: String },

    /// Malformed exposition text.
    #[error("exposition text line {line}: {reason}")]
    Exposition { line: usize, reason: String },

    /// Encoding families into exposition text failed.
    #[error("failed to render metrics: {0}")]
    Render(#[from] prometheus::Error),
}

/// Result type alias using ControlError.
pub type Result<T> = std::result::Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_terminator_keeps_source() {
        use std::error::Error as _;

        let err = ControlError::MissingTerminator {
            response: "partial".to_string(),
            source: Some(std::io::ErrorKind::UnexpectedEof.into()),
        };

        assert!(err.is_eof());
        assert_eq!(err.partial_response(), Some("partial"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("missing response terminator"));
    }

    #[test]
    fn test_command_failed_message() {
        let err = ControlError::CommandFailed("bad thing".to_string());
        assert_eq!(err.to_string(), "command failed: bad thing");
        assert!(!err.is_eof());
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = MetricError::TypeMismatch {
            family: "syslogng_x".to_string(),
            expected: MetricKind::Counter,
            actual: MetricKind::Gauge,
        };
        assert_eq!(
            err.to_string(),
            "expected metric family \"syslogng_x\" to have type counter but had gauge"
        );
    }
}
