//! Frame reader.
//!
//! This module provides [`FrameReader`], a typed wrapper around a framed
//! async reader that produces a stream of [`ProtocolFrame`]s.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use pin_project_lite::pin_project;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::FrameCodec;
use crate::error::CodecError;
use crate::frame::ProtocolFrame;

pin_project! {
    /// An async stream of incoming frames.
    ///
    /// `FrameReader` wraps an [`AsyncRead`] source and decodes frames from the
    /// byte stream in wire order. It ends when the source reaches EOF.
    pub struct FrameReader<R> {
        #[pin]
        inner: FramedRead<R, FrameCodec>,
    }
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Create a new frame reader from an async read source.
    pub fn new(reader: R) -> Self {
        Self::with_codec(reader, FrameCodec::new())
    }

    /// Create a new frame reader with a custom codec.
    pub fn with_codec(reader: R, codec: FrameCodec) -> Self {
        Self {
            inner: FramedRead::new(reader, codec),
        }
    }

    /// Consume the reader and return the underlying source.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R> Stream for FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    type Item = Result<ProtocolFrame, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Cursor;

    #[tokio::test]
    async fn read_multiple_frames() {
        let data = b"114\t1\t<xml/>\n901\t3\tno such thread\n".to_vec();
        let mut reader = FrameReader::new(Cursor::new(data));

        let first = reader.next().await.unwrap().unwrap();
        assert_eq!(first.sequence(), 1);

        let second = reader.next().await.unwrap().unwrap();
        assert_eq!(second.payload(), "no such thread");

        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn read_eof() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn read_malformed_frame() {
        let mut reader = FrameReader::new(Cursor::new(b"garbage\n".to_vec()));
        let result = reader.next().await.unwrap();
        assert!(result.is_err());
    }
}
