//! Newline-delimited framing.
//!
//! One message per line: the message text followed by a single `\n`.
//! Incoming bytes are appended to a buffer that only ever holds the
//! unterminated tail of the stream; a line becomes a message once its
//! delimiter has been seen. The tail is capped at a maximum line length.

use bytes::{Buf, BytesMut};

use crate::{Result, RpcError, DEFAULT_MAX_LINE_LENGTH};

const DELIMITER: u8 = b'\n';

/// Splits a byte stream into complete lines.
#[derive(Debug)]
pub(crate) struct LineFramer {
    buffer: BytesMut,
    // Bytes of `buffer` already known to hold no delimiter.
    scanned: usize,
    max_line: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl LineFramer {
    // ---
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            max_line,
        }
    }

    /// Append `chunk` and return every line it completed, in order.
    ///
    /// A trailing `\r` is stripped, blank lines are skipped and lines that
    /// are not valid UTF-8 are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Framing`] once a line, complete or not, grows past
    /// the maximum line length. The stream cannot be resynchronised after
    /// that and the connection should be dropped.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        // ---
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..]
            .iter()
            .position(|b| *b == DELIMITER)
        {
            let pos = self.scanned + offset;
            if pos > self.max_line {
                return Err(self.overflow(pos));
            }

            let mut line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            self.scanned = 0;

            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            match std::str::from_utf8(&line) {
                Ok(text) if text.trim().is_empty() => {}
                Ok(text) => lines.push(text.to_string()),
                Err(_err) => {
                    crate::log_warn!("dropping non UTF-8 line ({} bytes): {_err}", line.len());
                }
            }
        }

        self.scanned = self.buffer.len();
        if self.scanned > self.max_line {
            return Err(self.overflow(self.scanned));
        }
        Ok(lines)
    }

    fn overflow(&self, len: usize) -> RpcError {
        RpcError::Framing(format!(
            "line of {len} bytes exceeds the {} byte limit",
            self.max_line
        ))
    }

    /// Bytes held back waiting for a delimiter.
    pub(crate) fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Frame one outgoing message as exactly one line.
///
/// # Errors
///
/// Returns [`RpcError::Framing`] if the text contains a newline anywhere but
/// at its very end; such a message would be split by the peer.
pub(crate) fn frame_outgoing(text: &str) -> Result<String> {
    // ---
    let body = text.strip_suffix('\n').unwrap_or(text);
    if body.contains('\n') {
        return Err(RpcError::Framing(
            "message text contains an embedded newline".into(),
        ));
    }

    let mut framed = String::with_capacity(body.len() + 1);
    framed.push_str(body);
    framed.push('\n');
    Ok(framed)
}
