//! Framing for both protocols.
//!
//! Requests are self-delimiting JSON objects (or arrays): the reader buffers
//! bytes until the top-level value closes and keeps whatever follows for the
//! next call. Whitespace between values is skipped, so newline-delimited
//! clients and clients that write bare objects are both served.
//!
//! Each byte is examined once as it arrives; `serde_json` only sees a frame
//! after its closing bracket. A trickling client costs linear time.
//!
//! Backend replies are delimited by connection close and read with
//! [`read_to_end_bounded`].
//!
//! Both paths are bounded. Oversized input is an error, never a truncation.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("malformed JSON: {0}")]
    Malformed(serde_json::Error),
    #[error("frame must start with '{{' or '[', found {found:?}")]
    UnexpectedStart { found: char },
    #[error("connection closed mid-frame")]
    Truncated,
}

/// Finds where the value at the front of a buffer ends.
///
/// Tracks bracket depth and string state across calls, so a growing buffer
/// is only examined from where the previous call stopped.
#[derive(Debug, Default)]
struct ValueScanner {
    /// Bytes of the current frame already examined.
    offset: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl ValueScanner {
    /// Examine the bytes of `buf` past `offset`. Returns the frame length
    /// once the top-level value closes, and resets for the next frame.
    fn advance(&mut self, buf: &[u8]) -> Option<usize> {
        let start = self.offset;
        for (i, &b) in buf[start..].iter().enumerate() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                continue;
            }
            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        *self = Self::default();
                        return Some(start + i + 1);
                    }
                }
                _ => {}
            }
        }
        self.offset = buf.len();
        None
    }
}

/// Reads consecutive JSON values off a byte stream.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    scanner: ValueScanner,
    max_frame: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            scanner: ValueScanner::default(),
            max_frame,
            eof: false,
        }
    }

    /// Next complete JSON value. `Ok(None)` means the peer closed the
    /// connection cleanly between frames.
    pub async fn next_value(&mut self) -> Result<Option<serde_json::Value>, FrameError> {
        loop {
            // Between frames: drop separators and check the opening byte.
            if self.scanner.offset == 0 {
                let leading = self
                    .buf
                    .iter()
                    .take_while(|b| b.is_ascii_whitespace())
                    .count();
                self.buf.advance(leading);
                if let Some(&first) = self.buf.first() {
                    if first != b'{' && first != b'[' {
                        return Err(FrameError::UnexpectedStart {
                            found: char::from(first),
                        });
                    }
                }
            }

            if let Some(len) = self.scanner.advance(&self.buf) {
                if len > self.max_frame {
                    return Err(FrameError::TooLarge {
                        limit: self.max_frame,
                    });
                }
                let value =
                    serde_json::from_slice(&self.buf[..len]).map_err(FrameError::Malformed)?;
                self.buf.advance(len);
                return Ok(Some(value));
            }

            if self.buf.len() > self.max_frame {
                return Err(FrameError::TooLarge {
                    limit: self.max_frame,
                });
            }
            if self.eof {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(FrameError::Truncated)
                };
            }

            self.buf.reserve(READ_CHUNK);
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                self.eof = true;
            }
        }
    }
}

/// Read until EOF, failing once more than `limit` bytes have arrived.
pub async fn read_to_end_bounded<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut out = Vec::new();
    // One byte past the limit is enough to tell "exactly limit" from "more".
    let read = reader
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .await?;
    if read > limit {
        return Err(FrameError::TooLarge { limit });
    }
    Ok(out)
}
