//! Frame writer.
//!
//! This module provides [`FrameWriter`], a typed wrapper around a framed
//! async writer for sending [`ProtocolFrame`]s.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Sink;
use pin_project_lite::pin_project;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::codec::FrameCodec;
use crate::error::CodecError;
use crate::frame::ProtocolFrame;

pin_project! {
    /// An async sink for outgoing frames.
    ///
    /// Each frame is written as one complete line, so a single writer never
    /// interleaves bytes of two frames.
    pub struct FrameWriter<W> {
        #[pin]
        inner: FramedWrite<W, FrameCodec>,
    }
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Create a new frame writer from an async write destination.
    pub fn new(writer: W) -> Self {
        Self {
            inner: FramedWrite::new(writer, FrameCodec::new()),
        }
    }

    /// Send a frame: feed, flush and await completion.
    pub async fn send(&mut self, frame: ProtocolFrame) -> Result<(), CodecError> {
        use futures::SinkExt;
        SinkExt::send(&mut self.inner, frame).await
    }

    /// Consume the writer and return the underlying destination.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W> Sink<ProtocolFrame> for FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: ProtocolFrame) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn write_frames_as_lines() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));

        writer
            .send(ProtocolFrame::new(114, 1, "t1\t7\tLOCAL"))
            .await
            .unwrap();
        writer.send(ProtocolFrame::new(102, 3, "")).await.unwrap();

        let output = String::from_utf8(writer.into_inner().into_inner()).unwrap();
        assert_eq!(output, "114\t1\tt1\t7\tLOCAL\n102\t3\t\n");
    }
}
