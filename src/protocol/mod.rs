//! Protocol module - response framing and envelope.
//!
//! This module implements the text protocol spoken on the control socket:
//! - Delimiter scanner for locating the response terminator across reads
//! - `OK ` / `FAIL ` envelope handling

mod envelope;
mod scanner;

pub use envelope::{open, sanitize, FAIL_PREFIX, OK_PREFIX, RESPONSE_TERMINATOR, TERMINATOR_LINE};
pub use scanner::{read_until, DelimiterScanner, ReadUntil, Split, DEFAULT_READ_BUFFER_SIZE};
