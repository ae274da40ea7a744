//! A live connection to a debuggee.
//!
//! [`Connection`] owns both halves of a [`Transport`]. Two tasks run for the
//! lifetime of the connection:
//!
//! - the reader task decodes inbound frames and hands each one, in wire order,
//!   to a [`FrameHandler`];
//! - the sender task drains a bounded queue of outbound frames and writes them
//!   one at a time, so concurrent senders never interleave bytes.
//!
//! Whichever way the connection ends (explicit close, EOF, I/O failure or a
//! malformed frame) the handler's [`FrameHandler::on_disconnected`] is called
//! exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::{DEFAULT_MAX_FRAME_LEN, FrameCodec};
use crate::error::CodecError;
use crate::frame::ProtocolFrame;
use crate::reader::FrameReader;
use crate::transport::{Transport, split_with_codec};
use crate::writer::FrameWriter;

/// Receives everything the reader task decodes.
///
/// Both methods are called from the reader task (or from whoever closes the
/// connection) and must not block: do the minimum and hand off.
pub trait FrameHandler: Send + Sync + 'static {
    /// Called for every decoded inbound frame, in the order received.
    fn on_frame_received(&self, frame: ProtocolFrame);

    /// Called exactly once when the connection stops.
    fn on_disconnected(&self, reason: DisconnectReason);
}

/// Why a connection stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Closed locally.
    Closed,
    /// The debuggee closed its end.
    Eof,
    /// Reading or writing failed.
    Io(String),
    /// The debuggee sent bytes that are not a valid frame.
    Decode(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::Closed => write!(f, "connection closed"),
            DisconnectReason::Eof => write!(f, "debuggee closed the connection"),
            DisconnectReason::Io(e) => write!(f, "transport error: {e}"),
            DisconnectReason::Decode(e) => write!(f, "malformed frame: {e}"),
        }
    }
}

/// Settings for a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Capacity of the outbound frame queue.
    pub outbound_buffer: usize,
    /// Maximum accepted inbound frame length.
    pub max_frame_len: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 256,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

struct Shared {
    connected: AtomicBool,
    cancel: CancellationToken,
    handler: Arc<dyn FrameHandler>,
}

impl Shared {
    /// Mark the connection down and notify the handler, once.
    fn shutdown(&self, reason: DisconnectReason) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::debug!(%reason, "connection shutting down");
            self.cancel.cancel();
            self.handler.on_disconnected(reason);
        }
    }
}

/// One physical connection to a debuggee.
pub struct Connection {
    outbound: mpsc::Sender<ProtocolFrame>,
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Split `transport` and spawn the reader and sender tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<T, H>(transport: T, handler: Arc<H>, config: &ConnectionConfig) -> Self
    where
        T: Transport,
        H: FrameHandler,
    {
        let (reader, writer) =
            split_with_codec(transport, FrameCodec::with_max_len(config.max_frame_len));
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_buffer.max(1));

        let shared = Arc::new(Shared {
            connected: AtomicBool::new(true),
            cancel: CancellationToken::new(),
            handler,
        });

        let reader_handle = tokio::spawn(read_loop(reader, shared.clone()));
        let writer_handle = tokio::spawn(write_loop(writer, outbound_rx, shared.clone()));

        Self {
            outbound,
            shared,
            tasks: Mutex::new(vec![reader_handle, writer_handle]),
        }
    }

    /// Queue a frame for writing.
    ///
    /// Only waits for space in the bounded outbound queue, never for network
    /// I/O. Returns `false` if the connection is down.
    pub async fn send(&self, frame: ProtocolFrame) -> bool {
        if !self.is_connected() {
            return false;
        }
        tracing::debug!(
            command = frame.command(),
            sequence = frame.sequence(),
            "queueing frame"
        );
        self.outbound.send(frame).await.is_ok()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Stop both tasks and release the transport. Idempotent.
    pub fn disconnect(&self) {
        self.shared.shutdown(DisconnectReason::Closed);
    }

    /// Disconnect and wait for the reader and sender tasks to finish.
    pub async fn close(&self) {
        self.disconnect();
        let handles = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn read_loop<R>(mut reader: FrameReader<R>, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let reason = loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => {
                tracing::debug!("reader task cancelled");
                break DisconnectReason::Closed;
            }
            next = reader.next() => match next {
                Some(Ok(frame)) => {
                    tracing::debug!(
                        command = frame.command(),
                        sequence = frame.sequence(),
                        "received frame"
                    );
                    shared.handler.on_frame_received(frame);
                }
                Some(Err(CodecError::Io(e))) => {
                    tracing::error!(error = %e, "transport error");
                    break DisconnectReason::Io(e.to_string());
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "malformed frame, tearing down connection");
                    break DisconnectReason::Decode(e.to_string());
                }
                None => {
                    tracing::debug!("transport closed");
                    break DisconnectReason::Eof;
                }
            }
        }
    };
    shared.shutdown(reason);
}

async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut outbound: mpsc::Receiver<ProtocolFrame>,
    shared: Arc<Shared>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                tracing::debug!("sender task cancelled");
                drain(&mut writer, &mut outbound).await;
                break;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                if let Err(e) = writer.send(frame).await {
                    tracing::error!(error = %e, "failed to write frame");
                    shared.shutdown(DisconnectReason::Io(e.to_string()));
                    break;
                }
            }
        }
    }
    let _ = writer.close().await;
}

/// Write whatever was queued before the connection stopped, giving up after
/// [`DRAIN_TIMEOUT`] or at the first failed write.
async fn drain<W>(writer: &mut FrameWriter<W>, outbound: &mut mpsc::Receiver<ProtocolFrame>)
where
    W: AsyncWrite + Unpin,
{
    outbound.close();
    let flushed = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while let Some(frame) = outbound.recv().await {
            if writer.send(frame).await.is_err() {
                break;
            }
        }
    })
    .await;
    if flushed.is_err() {
        tracing::warn!("gave up flushing queued frames");
    }
}
