//! Frame codec implementation using tokio-util.
//!
//! This module provides [`FrameCodec`], which implements both the `Encoder` and
//! `Decoder` traits from tokio-util for [`ProtocolFrame`]s.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::escape::{escape_payload, unescape};
use crate::frame::{CommandId, ProtocolFrame, SequenceId};

/// Default maximum frame length (16 MB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Codec for encoding and decoding protocol frames.
///
/// Frames are single lines:
/// ```text
/// <command id>\t<sequence id>\t<escaped payload>\n
/// ```
///
/// # Example
///
/// ```ignore
/// use tokio_util::codec::FramedRead;
/// use wire::FrameCodec;
///
/// let framed = FramedRead::new(reader, FrameCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Maximum allowed frame length in bytes, terminator excluded.
    max_frame_len: usize,
    /// How far into the buffer we already searched for a newline.
    next_index: usize,
}

impl FrameCodec {
    /// Create a new codec with default settings.
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Create a new codec with a custom maximum frame length.
    ///
    /// Frames larger than this are rejected with [`CodecError::FrameTooLarge`].
    pub fn with_max_len(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            next_index: 0,
        }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = ProtocolFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let search_from = self.next_index.min(src.len());
        let Some(offset) = src[search_from..].iter().position(|b| *b == b'\n') else {
            if src.len() > self.max_frame_len {
                return Err(CodecError::FrameTooLarge {
                    size: src.len(),
                    max: self.max_frame_len,
                });
            }
            // Need more data
            self.next_index = src.len();
            return Ok(None);
        };

        let newline = search_from + offset;
        self.next_index = 0;
        if newline > self.max_frame_len {
            return Err(CodecError::FrameTooLarge {
                size: newline,
                max: self.max_frame_len,
            });
        }

        let line = src.split_to(newline + 1);
        let mut line = &line[..newline];
        if let [rest @ .., b'\r'] = line {
            line = rest;
        }
        let line = std::str::from_utf8(line).map_err(|_| CodecError::InvalidUtf8)?;

        parse_line(line).map(Some)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => {
                // A trailing frame without its terminator is still a whole frame.
                let rest = buf.split_to(buf.len());
                self.next_index = 0;
                let line = std::str::from_utf8(&rest).map_err(|_| CodecError::InvalidUtf8)?;
                parse_line(line.trim_end_matches('\r')).map(Some)
            }
        }
    }
}

impl Encoder<ProtocolFrame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: ProtocolFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = escape_payload(item.payload());
        let header = format!("{}\t{}\t", item.command(), item.sequence());

        dst.reserve(header.len() + payload.len() + 1);
        dst.put_slice(header.as_bytes());
        dst.put_slice(payload.as_bytes());
        dst.put_u8(b'\n');

        Ok(())
    }
}

/// Parse one line (terminator already stripped) into a frame.
fn parse_line(line: &str) -> Result<ProtocolFrame, CodecError> {
    let mut parts = line.splitn(3, '\t');

    let command = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or(CodecError::MissingField("command"))?;
    let command: CommandId = command
        .parse()
        .map_err(|_| CodecError::InvalidCommand(command.to_string()))?;

    let sequence = parts.next().ok_or(CodecError::MissingField("sequence"))?;
    let sequence: SequenceId = sequence
        .parse()
        .map_err(|_| CodecError::InvalidSequence(sequence.to_string()))?;

    let payload = parts.next().ok_or(CodecError::MissingField("payload"))?;
    let payload = unescape(payload)?;

    Ok(ProtocolFrame::new(command, sequence, payload))
}

/// Encode a frame into its wire bytes.
///
/// Mostly useful for tests and tooling that write raw bytes.
pub fn encode_frame(frame: &ProtocolFrame) -> Vec<u8> {
    let mut buf = BytesMut::new();
    // Encoding is infallible for this codec.
    let _ = FrameCodec::new().encode(frame.clone(), &mut buf);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_complete_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("113\t5\tthread-1\t42\tLOCAL\n");

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.command(), 113);
        assert_eq!(frame.sequence(), 5);
        assert_eq!(frame.payload(), "thread-1\t42\tLOCAL");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("113\t5\tpartial");

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(!buf.is_empty());

        buf.put_slice(b" payload\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.payload(), "partial payload");
    }

    #[test]
    fn decode_multiple_frames() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("114\t7\t<xml/>\r\n901\t9\tboom\n");

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.sequence(), 7);
        assert_eq!(first.payload(), "<xml/>");

        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.sequence(), 9);
        assert_eq!(second.payload(), "boom");

        assert!(buf.is_empty());
    }

    #[test]
    fn decode_empty_payload() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("102\t1\t\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.payload(), "");
    }

    #[test]
    fn decode_rejects_malformed_frames() {
        let mut codec = FrameCodec::new();
        assert!(matches!(
            codec.decode(&mut BytesMut::from("abc\t1\tx\n")),
            Err(CodecError::InvalidCommand(_))
        ));
        assert!(matches!(
            codec.decode(&mut BytesMut::from("113\tnope\tx\n")),
            Err(CodecError::InvalidSequence(_))
        ));
        assert!(matches!(
            codec.decode(&mut BytesMut::from("113\t1\n")),
            Err(CodecError::MissingField("payload"))
        ));
        assert!(matches!(
            codec.decode(&mut BytesMut::from("\n")),
            Err(CodecError::MissingField("command"))
        ));
    }

    #[test]
    fn decode_frame_too_large() {
        let mut codec = FrameCodec::with_max_len(8);
        let mut buf = BytesMut::from("113\t1\tthis is far too long");

        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn encode_escapes_line_breaks() {
        let mut codec = FrameCodec::new();
        let frame = ProtocolFrame::new(113, 3, "a\tmulti\nline");

        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"113\t3\ta\tmulti%0Aline\n");

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn decode_eof_accepts_unterminated_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("501\t2\t1.1");
        let frame = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(frame.payload(), "1.1");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }
}
