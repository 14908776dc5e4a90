use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Provides a facility to read LF-terminated lines from a stream, tolerating
/// CRLF line endings.
pub struct LineReader<T: AsyncRead + Unpin> {
    /// Stores data that's been read in but lacks a LF.
    buf: BytesMut,
    /// Index in buf before which no LF has been seen.
    scanned: usize,
    /// Data source
    reader: T,
    /// Set once the reader has returned zero bytes.
    eof: bool,
    /// On a reading error, this field is set and its value returned once the
    /// buffer is drained of pending lines.
    pending_error: Option<io::Error>,
}

impl<T: AsyncRead + Unpin> LineReader<T> {
    /// Reads a line from the internal buffer and/or reader, without its
    /// terminator. A trailing line lacking a LF is returned at end-of-stream;
    /// after that, `None` is returned.
    ///
    /// This function is cancel-safe: its only async operation is a `read_buf`
    /// against the internal `reader`.
    ///
    /// On a read error, the error value is returned after processing all
    /// pending lines in the internal buffer.
    pub async fn read_line(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            // Only scan the bytes appended since the last miss, keeping
            // O(bytes_read) behaviour across many short reads.
            if let Some(eol) =
                self.buf[self.scanned..].iter().position(|&c| c == b'\n')
            {
                let line = self.buf.split_to(self.scanned + eol + 1).freeze();
                self.scanned = 0;

                return Ok(Some(strip_eol(line)));
            }

            if self.eof || self.pending_error.is_some() {
                if !self.buf.is_empty() {
                    let line = self.buf.split().freeze();
                    self.scanned = 0;
                    return Ok(Some(strip_eol(line)));
                }

                return match self.pending_error.take() {
                    Some(e) => Err(e),
                    None => Ok(None),
                };
            }

            self.scanned = self.buf.len();

            match self.reader.read_buf(&mut self.buf).await {
                Ok(0) => self.eof = true,
                Ok(_) => {},
                Err(e) => self.pending_error = Some(e),
            }
        }
    }
}

/// Drops a trailing b"\n" and then a trailing b"\r", if present.
fn strip_eol(mut line: Bytes) -> Bytes {
    if line.last() == Some(&b'\n') {
        line.truncate(line.len() - 1);
    }
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    line
}

impl<T: AsyncRead + Unpin> From<T> for LineReader<T> {
    fn from(value: T) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            reader: value,
            eof: false,
            pending_error: None,
        }
    }
}
