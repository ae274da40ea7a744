//! Error types returned across the debugger's public surface.

use std::time::Duration;

use wire::DisconnectReason;

use crate::locator::LocatorParseError;

/// Everything a debugger operation can fail with.
///
/// Only [`DebuggerError::ProtocolDecode`] and [`DebuggerError::Disconnected`]
/// say anything about the session as a whole; every other variant is local to
/// the one call that returned it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DebuggerError {
    /// The debuggee sent bytes that could not be framed. Reported as the
    /// session's disconnect cause; the calls that were in flight see
    /// [`DebuggerError::Disconnected`].
    #[error("debug session corrupted: {0}")]
    ProtocolDecode(String),

    #[error(transparent)]
    LocatorParse(#[from] LocatorParseError),

    /// The debuggee raised while evaluating or expanding.
    #[error("remote evaluation failed: {0}")]
    RemoteEvaluation(String),

    #[error("no response after {0:?}")]
    Timeout(Duration),

    /// The session went away while the call was outstanding, or before it
    /// could be sent.
    #[error("debuggee unreachable: {0}")]
    Disconnected(String),

    /// The reply arrived intact but its payload did not make sense for the
    /// request.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("variable {0:?} has no children")]
    NotAContainer(String),

    #[error("session was already started")]
    AlreadyStarted,

    #[error("could not connect to debuggee: {0}")]
    Connect(String),
}

impl DebuggerError {
    pub(crate) fn session_closed() -> Self {
        DebuggerError::Disconnected("session is closed".to_string())
    }

    /// Whether retrying the same call could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DebuggerError::Timeout(_))
    }
}

impl From<&DisconnectReason> for DebuggerError {
    fn from(reason: &DisconnectReason) -> Self {
        DebuggerError::Disconnected(reason.to_string())
    }
}

pub type Result<T, E = DebuggerError> = std::result::Result<T, E>;
