//! Response envelope of the control protocol.
//!
//! ```text
//! client → daemon   <COMMAND>\n
//! daemon → client   [OK |FAIL ]<body>\n.\n
//! ```
//!
//! The body ends with a line holding a single `.`. An `OK ` prefix marks
//! explicit success and is dropped; a `FAIL ` prefix turns the rest of the body
//! into the error message.

use crate::error::{ControlError, Result};

/// Bytes ending every response: a newline followed by a line with only `.`.
pub const RESPONSE_TERMINATOR: &str = "\n.\n";

/// The terminator line as it appears once the body's last newline is re-attached.
pub const TERMINATOR_LINE: &str = ".\n";

/// Prefix of an explicitly successful response.
pub const OK_PREFIX: &str = "OK ";

/// Prefix of a failed command.
pub const FAIL_PREFIX: &str = "FAIL ";

/// Decode raw response bytes, replacing invalid UTF-8 sequences with U+FFFD.
pub fn sanitize(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// Interpret a response body: strip `OK `, or turn `FAIL ` into an error.
///
/// The body's final newline belongs to the terminator and is dropped.
pub fn open(body: &[u8]) -> Result<String> {
    let body = body.strip_suffix(b"\n").unwrap_or(body);

    if let Some(message) = body.strip_prefix(FAIL_PREFIX.as_bytes()) {
        return Err(ControlError::CommandFailed(sanitize(message)));
    }

    let body = body.strip_prefix(OK_PREFIX.as_bytes()).unwrap_or(body);
    Ok(sanitize(body))
}
