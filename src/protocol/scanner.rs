//! Delimiter scanner for responses that arrive in arbitrary chunks.
//!
//! Uses `bytes::BytesMut` to accumulate everything read before the separator.
//! The separator may straddle any number of reads, so the scanner keeps the
//! length of a partial match at the tail of the consumed bytes:
//! - `matched == 0`: search each chunk for a whole separator, otherwise seed
//!   a partial match from the longest chunk suffix that is a separator prefix
//! - `matched > 0`: extend the partial match with the next chunk, or fold the
//!   held-back bytes back in and rescan when the chunk diverges
//!
//! No byte is dropped or duplicated: `data + rest` always equals the input.
//!
//! # Example
//!
//! ```
//! use syslogng_ctl::protocol::DelimiterScanner;
//!
//! let mut scanner = DelimiterScanner::new(b"\n.\n");
//!
//! assert!(scanner.push(b"hello\n").is_none());
//! assert!(scanner.push(b".").is_none());
//!
//! let split = scanner.push(b"\ntrailing").unwrap();
//! assert_eq!(&split.data[..], b"hello");
//! assert_eq!(&split.rest[..], b"\n.\ntrailing");
//! ```

use std::borrow::Cow;
use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default size of the buffer handed to each read call.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// Everything before the separator.
    pub data: BytesMut,
    /// The separator followed by any bytes read past it.
    pub rest: BytesMut,
}

/// Push-based separator detector.
///
/// Feed chunks with [`push`](Self::push) until it returns a [`Split`]. When the
/// source ends first, [`finish`](Self::finish) hands back every byte consumed so
/// far, including a dangling partial separator.
#[derive(Debug)]
pub struct DelimiterScanner {
    separator: Vec<u8>,
    /// Bytes known not to start a separator occurrence.
    output: BytesMut,
    /// Length of the separator prefix held back at the tail of the input.
    matched: usize,
}

impl DelimiterScanner {
    /// Create a scanner looking for `separator`.
    pub fn new(separator: &[u8]) -> Self {
        Self::with_capacity(separator, DEFAULT_READ_BUFFER_SIZE)
    }

    /// Create a scanner with a preallocated output buffer.
    pub fn with_capacity(separator: &[u8], capacity: usize) -> Self {
        Self {
            separator: separator.to_vec(),
            output: BytesMut::with_capacity(capacity),
            matched: 0,
        }
    }

    /// Consume one chunk.
    ///
    /// Returns `Some` once the separator is complete; the scanner is then reset
    /// and may be reused. Empty chunks are ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Split> {
        if chunk.is_empty() {
            return None;
        }

        let pending = if self.matched > 0 {
            let tail = &self.separator[self.matched..];
            let cpl = common_prefix_len(chunk, tail);

            if cpl == tail.len() {
                let data = self.output.split();
                let mut rest = BytesMut::with_capacity(self.separator.len() + chunk.len() - cpl);
                rest.extend_from_slice(&self.separator);
                rest.extend_from_slice(&chunk[cpl..]);
                self.matched = 0;
                return Some(Split { data, rest });
            }

            if cpl == chunk.len() {
                // Chunk only grows the partial match
                self.matched += cpl;
                return None;
            }

            // Diverged: the held-back prefix goes through the scan again together
            // with the chunk, so an occurrence starting inside it is still found.
            let mut joined = Vec::with_capacity(self.matched + chunk.len());
            joined.extend_from_slice(&self.separator[..self.matched]);
            joined.extend_from_slice(chunk);
            self.matched = 0;
            Cow::Owned(joined)
        } else {
            Cow::Borrowed(chunk)
        };

        self.scan_fresh(&pending)
    }

    /// Scan bytes with no partial match in progress.
    fn scan_fresh(&mut self, bytes: &[u8]) -> Option<Split> {
        if let Some(i) = find(bytes, &self.separator) {
            self.output.extend_from_slice(&bytes[..i]);
            let data = self.output.split();
            let rest = BytesMut::from(&bytes[i..]);
            return Some(Split { data, rest });
        }

        for len in (1..self.separator.len()).rev() {
            if bytes.ends_with(&self.separator[..len]) {
                self.output.extend_from_slice(&bytes[..bytes.len() - len]);
                self.matched = len;
                return None;
            }
        }

        self.output.extend_from_slice(bytes);
        None
    }

    /// Length of the partial separator match currently held back.
    pub fn matched(&self) -> usize {
        self.matched
    }

    /// Number of bytes consumed so far, held-back separator bytes included.
    pub fn len(&self) -> usize {
        self.output.len() + self.matched
    }

    /// Check if nothing has been consumed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Give up on the separator and return every consumed byte.
    pub fn finish(mut self) -> BytesMut {
        self.output.extend_from_slice(&self.separator[..self.matched]);
        self.output
    }
}

/// Outcome of [`read_until`].
#[derive(Debug)]
pub struct ReadUntil {
    /// Bytes read before the separator (or before the read error).
    pub data: BytesMut,
    /// Separator plus over-read bytes; empty when the separator was not found.
    pub rest: BytesMut,
    /// Terminal read error. End-of-stream is reported as `UnexpectedEof`.
    pub error: Option<io::Error>,
}

impl ReadUntil {
    /// True if the separator was found.
    pub fn is_matched(&self) -> bool {
        self.error.is_none()
    }
}

/// Read from `reader` until `separator` is seen or the read fails.
///
/// Reads stop right after the chunk that completes the separator; bytes of that
/// chunk past the separator end up in [`ReadUntil::rest`].
pub async fn read_until<R>(reader: &mut R, separator: &[u8], buffer_size: usize) -> ReadUntil
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut scanner = DelimiterScanner::with_capacity(separator, buffer_size);
    let mut buf = vec![0u8; buffer_size.max(1)];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                return ReadUntil {
                    data: scanner.finish(),
                    rest: BytesMut::new(),
                    error: Some(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream ended before separator",
                    )),
                }
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return ReadUntil {
                    data: scanner.finish(),
                    rest: BytesMut::new(),
                    error: Some(e),
                }
            }
        };

        if let Some(split) = scanner.push(&buf[..n]) {
            return ReadUntil {
                data: split.data,
                rest: split.rest,
                error: None,
            };
        }
    }
}

/// Length of the common prefix of `a` and `b`.
fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Position of the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
