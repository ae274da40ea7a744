//! Transport abstraction, split functionality and TCP connection helpers.

use std::io;
use std::time::Duration;

use retry::delay::Exponential;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::codec::FrameCodec;
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

/// A transport that can be split into separate read and write halves.
///
/// This trait abstracts over the byte streams a debuggee can be reached
/// through (TCP sockets, in-memory pipes for tests).
pub trait Transport: Send + 'static {
    /// The read half type.
    type Read: AsyncRead + Unpin + Send + 'static;
    /// The write half type.
    type Write: AsyncWrite + Unpin + Send + 'static;

    /// Split the transport into separate read and write halves.
    fn into_split(self) -> (Self::Read, Self::Write);
}

impl Transport for TcpStream {
    type Read = OwnedReadHalf;
    type Write = OwnedWriteHalf;

    fn into_split(self) -> (Self::Read, Self::Write) {
        TcpStream::into_split(self)
    }
}

/// Split a transport into a frame reader and writer pair.
pub fn split<T: Transport>(transport: T) -> (FrameReader<T::Read>, FrameWriter<T::Write>) {
    split_with_codec(transport, FrameCodec::new())
}

/// Split a transport, decoding with the given codec settings.
pub fn split_with_codec<T: Transport>(
    transport: T,
    codec: FrameCodec,
) -> (FrameReader<T::Read>, FrameWriter<T::Write>) {
    let (read, write) = transport.into_split();
    (FrameReader::with_codec(read, codec), FrameWriter::new(write))
}

/// Connect to a debuggee over TCP, retrying with exponential backoff.
///
/// `attempts` counts the total number of connection attempts (at least one is
/// always made). The delay between attempts starts at `initial_delay` and
/// doubles each time.
pub async fn connect_with_retry(
    addr: impl ToSocketAddrs + Clone,
    attempts: usize,
    initial_delay: Duration,
) -> io::Result<TcpStream> {
    let initial_ms = u64::try_from(initial_delay.as_millis()).unwrap_or(u64::MAX);
    let mut delays = Exponential::from_millis_with_factor(initial_ms, 2.0)
        .take(attempts.saturating_sub(1));

    loop {
        tracing::debug!("trying to make connection");
        match TcpStream::connect(addr.clone()).await {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                tracing::debug!("connection made");
                return Ok(stream);
            }
            Err(e) => match delays.next() {
                Some(delay) => {
                    tracing::debug!(error = %e, ?delay, "error making connection, retrying");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::debug!(error = %e, "error making connection, giving up");
                    return Err(e);
                }
            },
        }
    }
}
