//! Tokio codec for newline-terminated control lines.
//!
//! The same codec frames both directions of a connection:
//!
//! ```text
//! TCP Stream -> Decoder -> String (one line, terminator stripped)
//! impl Display -> Encoder -> TCP Stream (text + "\n")
//! ```
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use futures::{SinkExt, StreamExt};
//! use open8055_protocol::{ControlCodec, Reply};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//!
//! # async fn example() -> open8055_protocol::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:8055").await?;
//! let mut framed = Framed::new(stream, ControlCodec::client());
//!
//! if let Some(line) = framed.next().await {
//!     let hello: Reply = line?.parse()?;
//!     println!("{hello}");
//! }
//! framed.send("QUIT").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Line limit
//!
//! Lines longer than the configured maximum are rejected with
//! [`ProtocolError::LineTooLong`]. The server uses [`MAX_CMDLINE`]; after
//! that error the stream is out of sync and must be closed.

use std::fmt::{self, Write as _};

use bytes::{BufMut, BytesMut};
use open8055_core::constants::MAX_CMDLINE;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};

/// Line limit used by clients, which receive long `ERROR` and `RECV` lines.
pub const CLIENT_MAX_LINE: usize = 4096;

/// Newline framing for the text control protocol.
#[derive(Debug, Clone)]
pub struct ControlCodec {
    max_length: usize,
    /// Bytes of the buffer already known not to contain a newline.
    next_index: usize,
}

impl ControlCodec {
    /// Codec for the server side, limited to [`MAX_CMDLINE`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_CMDLINE)
    }

    /// Codec for the client side, limited to [`CLIENT_MAX_LINE`].
    #[must_use]
    pub fn client() -> Self {
        Self::with_max_length(CLIENT_MAX_LINE)
    }

    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for ControlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ControlCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        let newline = src[self.next_index..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|offset| self.next_index + offset);

        let Some(end) = newline else {
            if src.len() > self.max_length {
                return Err(ProtocolError::LineTooLong {
                    max: self.max_length,
                });
            }
            self.next_index = src.len();
            return Ok(None);
        };

        self.next_index = 0;
        let raw = src.split_to(end + 1);
        let mut line = &raw[..end];
        if let [rest @ .., b'\r'] = line {
            line = rest;
        }
        if line.len() > self.max_length {
            return Err(ProtocolError::LineTooLong {
                max: self.max_length,
            });
        }
        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>> {
        match self.decode(buf)? {
            Some(line) => Ok(Some(line)),
            None => {
                // A trailing partial line at EOF is discarded.
                buf.clear();
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

impl<T: fmt::Display> Encoder<T> for ControlCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<()> {
        let mut line = String::new();
        // Writing into a String cannot fail.
        let _ = write!(line, "{item}");
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Reply;

    #[test]
    fn test_codec_new() {
        assert_eq!(ControlCodec::new().max_length(), MAX_CMDLINE);
        assert_eq!(ControlCodec::default().max_length(), MAX_CMDLINE);
        assert_eq!(ControlCodec::client().max_length(), CLIENT_MAX_LINE);
    }

    #[test]
    fn test_decode_complete_line() {
        let mut codec = ControlCodec::new();
        let mut buffer = BytesMut::from(&b"LIST nobody nopass\n"[..]);

        let line = codec.decode(&mut buffer).unwrap();
        assert_eq!(line.as_deref(), Some("LIST nobody nopass"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_strips_carriage_return() {
        let mut codec = ControlCodec::new();
        let mut buffer = BytesMut::from(&b"QUIT\r\n"[..]);
        assert_eq!(codec.decode(&mut buffer).unwrap().as_deref(), Some("QUIT"));
    }

    #[test]
    fn test_decode_partial_line() {
        let mut codec = ControlCodec::new();
        let mut buffer = BytesMut::from(&b"OPEN 0 nob"[..]);
        assert!(codec.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"ody nopass\nSEND");
        assert_eq!(
            codec.decode(&mut buffer).unwrap().as_deref(),
            Some("OPEN 0 nobody nopass")
        );
        assert!(codec.decode(&mut buffer).unwrap().is_none());
        assert_eq!(&buffer[..], b"SEND");
    }

    #[test]
    fn test_decode_multiple_lines_in_buffer() {
        let mut codec = ControlCodec::new();
        let mut buffer = BytesMut::from(&b"LIST a b\nQUIT\n"[..]);

        assert_eq!(codec.decode(&mut buffer).unwrap().as_deref(), Some("LIST a b"));
        assert_eq!(codec.decode(&mut buffer).unwrap().as_deref(), Some("QUIT"));
        assert!(codec.decode(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_decode_empty_line() {
        let mut codec = ControlCodec::new();
        let mut buffer = BytesMut::from(&b"\n"[..]);
        assert_eq!(codec.decode(&mut buffer).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_decode_line_too_long_without_newline() {
        let mut codec = ControlCodec::with_max_length(8);
        let mut buffer = BytesMut::from(&b"123456789"[..]);
        let err = codec.decode(&mut buffer).unwrap_err();
        assert!(matches!(err, ProtocolError::LineTooLong { max: 8 }));
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "command line too long");
    }

    #[test]
    fn test_decode_line_too_long_with_newline() {
        let mut codec = ControlCodec::with_max_length(4);
        let mut buffer = BytesMut::from(&b"SEND 1\n"[..]);
        assert!(codec.decode(&mut buffer).is_err());
    }

    #[test]
    fn test_decode_line_at_limit() {
        let mut codec = ControlCodec::new();
        let line = "A".repeat(MAX_CMDLINE);
        let mut buffer = BytesMut::from(format!("{line}\n").as_bytes());
        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(line));
    }

    #[test]
    fn test_decode_eof_discards_partial_line() {
        let mut codec = ControlCodec::new();
        let mut buffer = BytesMut::from(&b"QUIT\nLIS"[..]);
        assert_eq!(codec.decode_eof(&mut buffer).unwrap().as_deref(), Some("QUIT"));
        assert!(codec.decode_eof(&mut buffer).unwrap().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = ControlCodec::new();
        let mut buffer = BytesMut::new();

        codec.encode(Reply::hello(), &mut buffer).unwrap();
        codec.encode("QUIT", &mut buffer).unwrap();
        assert_eq!(&buffer[..], b"HELLO Open8055Server 0.1.0\nQUIT\n");
    }
}
