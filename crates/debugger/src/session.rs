//! Session lifecycle and reply dispatch.
//!
//! A [`DebugSession`] owns one connection to a debuggee together with the
//! table of outstanding calls. It moves `Disconnected -> Connecting ->
//! Connected -> Disconnected` exactly once; a closed session is never
//! reused.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use wire::{
    CommandKind, Connection, ConnectionConfig, DisconnectReason, FrameHandler, ProtocolFrame,
    Transport,
};

use crate::accessor::FrameAccessor;
use crate::error::{DebuggerError, Result};
use crate::events::{DebuggerEvent, ThreadInfo};
use crate::locator::VariableLocator;
use crate::pending::{Expected, PendingCalls, Reply};
use crate::poison;

/// Settings for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a call waits for its reply. `None` waits forever.
    pub reply_timeout: Option<Duration>,
    /// Exchange versions with the debuggee before reporting `Connected`.
    pub handshake: bool,
    pub connect_attempts: usize,
    /// Delay before the first reconnect attempt; doubles after each failure.
    pub connect_backoff: Duration,
    pub connection: ConnectionConfig,
    /// Sent to the debuggee in the version handshake.
    pub client_version: String,
    /// Events buffered per subscriber before slow subscribers start lagging.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Some(Duration::from_secs(10)),
            handshake: false,
            connect_attempts: 5,
            connect_backoff: Duration::from_millis(100),
            connection: ConnectionConfig::default(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            event_capacity: 64,
        }
    }
}

impl From<&config::Settings> for SessionConfig {
    fn from(settings: &config::Settings) -> Self {
        let connection = &settings.connection;
        Self {
            reply_timeout: settings.requests.reply_timeout(),
            handshake: connection.handshake,
            connect_attempts: connection.connect_attempts,
            connect_backoff: Duration::from_millis(connection.connect_backoff_ms),
            connection: ConnectionConfig {
                outbound_buffer: connection.outbound_buffer,
                max_frame_len: connection.max_frame_len,
            },
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// The part of a session the connection's reader task talks to.
struct Dispatcher {
    pending: PendingCalls,
    events: broadcast::Sender<DebuggerEvent>,
    state: watch::Sender<SessionState>,
    cause: Mutex<Option<DebuggerError>>,
}

impl Dispatcher {
    fn record_cause(&self, cause: DebuggerError) {
        let mut slot = poison::lock(&self.cause, "recording disconnect cause");
        if slot.is_none() {
            *slot = Some(cause);
        }
    }

    /// Move to the terminal state and fail everything still waiting.
    fn shut_down(&self, cause: DebuggerError, pending_error: DebuggerError) {
        self.record_cause(cause);
        let flushed = self.pending.close(pending_error);
        if flushed > 0 {
            tracing::debug!(flushed, "failed outstanding calls");
        }
        self.state.send_replace(SessionState::Disconnected);
    }

    fn publish(&self, kind: CommandKind, frame: &ProtocolFrame) {
        match DebuggerEvent::decode(kind, frame.payload()) {
            Ok(Some(event)) => {
                tracing::debug!(?event, "debuggee event");
                // No subscribers is not an error.
                let _ = self.events.send(event);
            }
            Ok(None) => {
                tracing::warn!(
                    command = frame.command(),
                    sequence = frame.sequence(),
                    "discarding unmatched frame"
                );
            }
            Err(e) => {
                tracing::warn!(%kind, error = %e, "dropping undecodable event");
            }
        }
    }
}

impl FrameHandler for Dispatcher {
    fn on_frame_received(&self, frame: ProtocolFrame) {
        if let Some(call) = self.pending.take(frame.sequence()) {
            let result = call.expected.read_reply(&frame);
            if let Err(e) = &result {
                tracing::debug!(sequence = frame.sequence(), error = %e, "call failed");
            }
            call.resolve(result);
            return;
        }

        match frame.kind() {
            Some(kind) if kind.is_event() => self.publish(kind, &frame),
            _ => tracing::warn!(
                command = frame.command(),
                sequence = frame.sequence(),
                "discarding unmatched frame"
            ),
        }
    }

    fn on_disconnected(&self, reason: DisconnectReason) {
        let cause = match &reason {
            DisconnectReason::Decode(e) => DebuggerError::ProtocolDecode(e.clone()),
            other => DebuggerError::from(other),
        };
        tracing::info!(%reason, "debuggee disconnected");
        self.shut_down(cause, DebuggerError::from(&reason));
    }
}

struct SessionInner {
    config: SessionConfig,
    dispatcher: Arc<Dispatcher>,
    connection: Mutex<Option<Arc<Connection>>>,
    started: AtomicBool,
}

/// A debugging session with one debuggee.
///
/// Cheap to clone; all clones share the same connection.
#[derive(Clone)]
pub struct DebugSession {
    inner: Arc<SessionInner>,
}

impl Default for DebugSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl DebugSession {
    pub fn new(config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            inner: Arc::new(SessionInner {
                config,
                dispatcher: Arc::new(Dispatcher {
                    pending: PendingCalls::new(),
                    events,
                    state,
                    cause: Mutex::new(None),
                }),
                connection: Mutex::new(None),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    fn begin(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(DebuggerError::AlreadyStarted);
        }
        self.inner
            .dispatcher
            .state
            .send_replace(SessionState::Connecting);
        Ok(())
    }

    /// Connect over TCP, retrying with exponential backoff.
    #[tracing::instrument(skip(self))]
    pub async fn connect(&self, addr: SocketAddr) -> Result<()> {
        self.begin()?;
        let stream = match wire::connect_with_retry(
            addr,
            self.inner.config.connect_attempts,
            self.inner.config.connect_backoff,
        )
        .await
        {
            Ok(stream) => stream,
            Err(e) => {
                let error = DebuggerError::Connect(format!("{addr}: {e}"));
                tracing::error!(error = %error, "connect failed");
                self.inner
                    .dispatcher
                    .shut_down(error.clone(), error.clone());
                return Err(error);
            }
        };
        self.establish(stream).await
    }

    /// Start the session over an already-open transport.
    pub async fn attach<T: Transport>(&self, transport: T) -> Result<()> {
        self.begin()?;
        self.establish(transport).await
    }

    async fn establish<T: Transport>(&self, transport: T) -> Result<()> {
        if self.inner.dispatcher.pending.is_closed() {
            // Closed while we were still connecting.
            return Err(self.disconnect_cause().unwrap_or_else(DebuggerError::session_closed));
        }

        let connection = Arc::new(Connection::start(
            transport,
            self.inner.dispatcher.clone(),
            &self.inner.config.connection,
        ));
        *poison::lock(&self.inner.connection, "storing connection") = Some(connection);

        if self.inner.config.handshake {
            match self.version().await {
                Ok(version) => tracing::info!(%version, "debuggee version"),
                Err(e) => {
                    tracing::error!(error = %e, "version handshake failed");
                    self.close().await;
                    return Err(e);
                }
            }
        }

        // A disconnect during the handshake has already moved us to the
        // terminal state; don't resurrect it.
        let connected = self.inner.dispatcher.state.send_if_modified(|state| {
            if *state == SessionState::Connecting {
                *state = SessionState::Connected;
                true
            } else {
                false
            }
        });
        if !connected {
            let stale = poison::lock(&self.inner.connection, "taking connection")
                .take();
            if let Some(connection) = stale {
                connection.close().await;
            }
            return Err(self.disconnect_cause().unwrap_or_else(DebuggerError::session_closed));
        }
        tracing::info!("session connected");
        Ok(())
    }

    /// Wait until the session is `Connected`, or fail if it ends first.
    pub async fn wait_for_connect(&self) -> Result<()> {
        let mut state = self.inner.dispatcher.state.subscribe();
        loop {
            match *state.borrow_and_update() {
                SessionState::Connected => return Ok(()),
                SessionState::Disconnected if self.inner.dispatcher.pending.is_closed() => {
                    return Err(self
                        .disconnect_cause()
                        .unwrap_or_else(DebuggerError::session_closed));
                }
                _ => {}
            }
            if state.changed().await.is_err() {
                return Err(DebuggerError::session_closed());
            }
        }
    }

    /// Tear the session down from any state. Idempotent, and safe while calls
    /// are in flight: they resolve with [`DebuggerError::Disconnected`].
    pub async fn close(&self) {
        self.inner.started.store(true, Ordering::SeqCst);
        let connection = poison::lock(&self.inner.connection, "taking connection")
            .take();
        if let Some(connection) = connection {
            // Reports `Closed` to the dispatcher, which flushes pending calls.
            connection.close().await;
        }
        self.inner.dispatcher.shut_down(
            DebuggerError::session_closed(),
            DebuggerError::session_closed(),
        );
    }

    pub fn state(&self) -> SessionState {
        *self.inner.dispatcher.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
            && self
                .connection()
                .is_some_and(|connection| connection.is_connected())
    }

    /// Why the session ended, once it has.
    ///
    /// A corrupted byte stream is reported here as
    /// [`DebuggerError::ProtocolDecode`], even though the calls it cut short
    /// saw [`DebuggerError::Disconnected`].
    pub fn disconnect_cause(&self) -> Option<DebuggerError> {
        poison::lock(&self.inner.dispatcher.cause, "reading disconnect cause")
            .clone()
    }

    /// Number of calls still waiting for a reply.
    pub fn outstanding(&self) -> usize {
        self.inner.dispatcher.pending.len()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DebuggerEvent> {
        self.inner.dispatcher.events.subscribe()
    }

    /// Accessor for the values of one stack frame.
    pub fn frame_accessor(
        &self,
        thread_id: impl Into<String>,
        frame_id: impl Into<String>,
    ) -> Result<FrameAccessor> {
        let frame = VariableLocator::frame(thread_id, frame_id)?;
        Ok(FrameAccessor::new(self.clone(), frame))
    }

    pub async fn list_threads(&self) -> Result<Vec<ThreadInfo>> {
        match self
            .request(Expected::Threads, String::new(), self.inner.config.reply_timeout)
            .await?
        {
            Reply::Threads(threads) => Ok(threads),
            other => Err(unexpected(other)),
        }
    }

    /// The debuggee's version string.
    pub async fn version(&self) -> Result<String> {
        let platform = if cfg!(windows) { "WINDOWS" } else { "UNIX" };
        let payload = format!("{}\t{platform}\tID", self.inner.config.client_version);
        match self
            .request(Expected::Version, payload, self.inner.config.reply_timeout)
            .await?
        {
            Reply::Text(version) => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    /// Tell the debuggee configuration is done and it may run.
    pub async fn run(&self) -> Result<()> {
        self.notify(CommandKind::Run, String::new()).await
    }

    pub async fn resume(&self, thread_id: &str) -> Result<()> {
        self.notify(CommandKind::ThreadRun, thread_id.to_string())
            .await
    }

    pub async fn suspend(&self, thread_id: &str) -> Result<()> {
        self.notify(CommandKind::ThreadSuspend, thread_id.to_string())
            .await
    }

    pub async fn set_breakpoint(
        &self,
        id: u32,
        file: &str,
        line: u32,
        condition: Option<&str>,
    ) -> Result<()> {
        let condition = condition.map(wire::escape::escape_field);
        let payload = format!(
            "{id}\t{}\t{line}\t{}",
            wire::escape::escape_field(file),
            condition.as_deref().unwrap_or("None")
        );
        self.notify(CommandKind::SetBreakpoint, payload).await
    }

    pub async fn remove_breakpoint(&self, id: u32, file: &str, line: u32) -> Result<()> {
        let payload = format!("{id}\t{}\t{line}", wire::escape::escape_field(file));
        self.notify(CommandKind::RemoveBreakpoint, payload).await
    }

    fn connection(&self) -> Option<Arc<Connection>> {
        poison::lock(&self.inner.connection, "reading connection")
            .clone()
    }

    async fn send(&self, frame: ProtocolFrame) -> bool {
        match self.connection() {
            Some(connection) => connection.send(frame).await,
            None => false,
        }
    }

    fn unreachable(&self) -> DebuggerError {
        match self.disconnect_cause() {
            Some(DebuggerError::ProtocolDecode(e)) => DebuggerError::Disconnected(e),
            Some(cause @ DebuggerError::Disconnected(_)) => cause,
            _ => DebuggerError::Disconnected("debuggee unreachable".to_string()),
        }
    }

    /// Send a request and wait for its reply.
    pub(crate) async fn request(
        &self,
        expected: Expected,
        payload: String,
        timeout: Option<Duration>,
    ) -> Result<Reply> {
        let kind = expected.kind();
        let pending = &self.inner.dispatcher.pending;
        let (sequence, mut rx) = pending.register(expected)?;
        let _guard = pending.guard(sequence);

        if !self
            .send(ProtocolFrame::for_kind(kind, sequence, payload))
            .await
        {
            return Err(self.unreachable());
        }

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                Ok(outcome) => outcome.ok(),
                Err(_) => {
                    if pending.remove(sequence) {
                        tracing::warn!(sequence, %kind, ?limit, "call timed out");
                        return Err(DebuggerError::Timeout(limit));
                    }
                    // The reader already took the entry and is about to
                    // resolve it.
                    rx.await.ok()
                }
            },
            None => rx.await.ok(),
        };
        outcome.unwrap_or_else(|| Err(DebuggerError::session_closed()))
    }

    /// Send a command that has no reply.
    pub(crate) async fn notify(&self, kind: CommandKind, payload: String) -> Result<()> {
        let sequence = self.inner.dispatcher.pending.next_sequence()?;
        if self
            .send(ProtocolFrame::for_kind(kind, sequence, payload))
            .await
        {
            Ok(())
        } else {
            Err(self.unreachable())
        }
    }
}

pub(crate) fn unexpected(reply: Reply) -> DebuggerError {
    DebuggerError::MalformedResponse(format!("unexpected reply {reply:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDebuggee;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reply_taken_just_before_the_deadline_is_delivered() {
        let (transport, mock) = MockDebuggee::pair();
        let session = DebugSession::default();
        session.attach(transport).await.unwrap();

        let call = tokio::spawn({
            let session = session.clone();
            async move {
                session
                    .request(
                        Expected::Version,
                        String::new(),
                        Some(Duration::from_millis(50)),
                    )
                    .await
            }
        });
        let request = mock.expect_request(CommandKind::Version).await;

        // Matched by the reader, but resolved only after the deadline.
        let taken = session
            .inner
            .dispatcher
            .pending
            .take(request.sequence())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        taken.resolve(Ok(Reply::Text("3.11".to_string())));

        let Ok(Reply::Text(version)) = call.await.unwrap() else {
            panic!("expected the version reply");
        };
        assert_eq!(version, "3.11");
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.outstanding(), 0);
    }
}
