//! Testing utilities for the debug session.
//!
//! [`MockDebuggee`] plays the debuggee's side of an in-memory connection so
//! tests can script replies, reorder them, inject events or garbage, and
//! hang up.

use std::sync::atomic::{AtomicI64, Ordering};

use futures::StreamExt;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;
use tokio::time::{Duration, timeout};
use wire::testing::MemoryTransport;
use wire::{CommandKind, FrameReader, FrameWriter, ProtocolFrame, split};

/// The debuggee end of a [`MemoryTransport`] pair.
pub struct MockDebuggee {
    reader: Mutex<FrameReader<DuplexStream>>,
    writer: Mutex<Option<FrameWriter<DuplexStream>>>,
    /// Debuggee-originated frames are numbered with even ids.
    sequence: AtomicI64,
}

impl MockDebuggee {
    /// Create a connected pair: hand the transport to
    /// [`crate::DebugSession::attach`] and drive the mock from the test.
    pub fn pair() -> (MemoryTransport, MockDebuggee) {
        let (client, debuggee) = MemoryTransport::pair();
        let (reader, writer) = split(debuggee);
        let mock = MockDebuggee {
            reader: Mutex::new(reader),
            writer: Mutex::new(Some(writer)),
            sequence: AtomicI64::new(2),
        };
        (client, mock)
    }

    /// The next frame from the client, or `None` once it hangs up.
    pub async fn recv(&self) -> Option<ProtocolFrame> {
        let mut reader = self.reader.lock().await;
        match reader.next().await {
            Some(Ok(frame)) => Some(frame),
            _ => None,
        }
    }

    /// Wait for a request of `kind`, skipping anything else.
    pub async fn expect_request(&self, kind: CommandKind) -> ProtocolFrame {
        self.expect_request_timeout(kind, Duration::from_secs(5))
            .await
            .unwrap_or_else(|| panic!("timeout waiting for {kind} request"))
    }

    pub async fn expect_request_timeout(
        &self,
        kind: CommandKind,
        max_wait: Duration,
    ) -> Option<ProtocolFrame> {
        timeout(max_wait, async {
            loop {
                let frame = self.recv().await?;
                if frame.kind() == Some(kind) {
                    return Some(frame);
                }
                tracing::debug!(?frame, "received unexpected frame while waiting for {kind}");
            }
        })
        .await
        .ok()
        .flatten()
    }

    pub async fn send(&self, frame: ProtocolFrame) {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().expect("mock debuggee already hung up");
        writer.send(frame).await.expect("failed to send frame");
    }

    /// Answer `request` with a reply of the same kind.
    pub async fn reply(&self, request: &ProtocolFrame, payload: impl Into<String>) {
        self.send(ProtocolFrame::new(
            request.command(),
            request.sequence(),
            payload,
        ))
        .await;
    }

    /// Answer `request` with the protocol's error reply.
    pub async fn reply_error(&self, request: &ProtocolFrame, message: &str) {
        self.send(ProtocolFrame::for_kind(
            CommandKind::Error,
            request.sequence(),
            message,
        ))
        .await;
    }

    pub async fn send_event(&self, kind: CommandKind, payload: impl Into<String>) {
        let sequence = self.sequence.fetch_add(2, Ordering::SeqCst);
        self.send(ProtocolFrame::for_kind(kind, sequence, payload))
            .await;
    }

    /// Write bytes that bypass the codec.
    pub async fn send_raw(&self, bytes: &[u8]) {
        let mut slot = self.writer.lock().await;
        let writer = slot.take().expect("mock debuggee already hung up");
        let mut stream = writer.into_inner();
        stream
            .write_all(bytes)
            .await
            .expect("failed to write bytes");
        *slot = Some(FrameWriter::new(stream));
    }

    /// Close the debuggee's sending side; the client sees EOF.
    pub async fn hang_up(&self) {
        self.writer.lock().await.take();
    }
}

/// Build a variable reply: `(name, type, value, is_container)` per entry.
pub fn var_xml(vars: &[(&str, &str, &str, bool)]) -> String {
    let mut xml = String::from("<xml>");
    for (name, ty, value, is_container) in vars {
        xml.push_str(&format!(
            r#"<var name="{}" type="{}" value="{}" isContainer="{}"/>"#,
            xml_escape(name),
            xml_escape(ty),
            xml_escape(value),
            if *is_container { "True" } else { "False" }
        ));
    }
    xml.push_str("</xml>");
    xml
}

/// An evaluate reply reporting that the expression raised.
pub fn eval_error_xml(expression: &str, error_type: &str, message: &str) -> String {
    format!(
        r#"<xml><var name="{}" type="{}" value="{}" isErrorOnEval="True"/></xml>"#,
        xml_escape(expression),
        xml_escape(error_type),
        xml_escape(message)
    )
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
