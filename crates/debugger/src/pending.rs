//! Tracking outstanding requests and matching replies.
//!
//! Every request that expects a reply is registered here under its sequence
//! id *before* it is written, together with what kind of reply it expects.
//! The reader task takes the entry out when the reply arrives; the caller
//! removes it itself on timeout or when it stops waiting. Whoever removes an entry is the only one that
//! may resolve it, so each call resolves exactly once.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use wire::{CommandKind, ProtocolFrame, SequenceId};

use crate::error::{DebuggerError, Result};
use crate::events::{ThreadInfo, parse_threads};
use crate::locator::VariableLocator;
use crate::poison;
use crate::value::{DebugValueNode, parse_evaluation, parse_variables};

/// What an outstanding request expects back, and how to read it.
#[derive(Debug, Clone)]
pub(crate) enum Expected {
    /// A list of variables addressed as children of `parent`.
    Variables {
        kind: CommandKind,
        parent: VariableLocator,
    },
    /// A single evaluated value, addressed by the given locator.
    Evaluation(VariableLocator),
    Change,
    Threads,
    Version,
}

/// A parsed reply.
#[derive(Debug)]
pub(crate) enum Reply {
    Variables(Vec<DebugValueNode>),
    Value(DebugValueNode),
    Threads(Vec<ThreadInfo>),
    Text(String),
    Done,
}

impl Expected {
    pub(crate) fn kind(&self) -> CommandKind {
        match self {
            Expected::Variables { kind, .. } => *kind,
            Expected::Evaluation(_) => CommandKind::EvaluateExpression,
            Expected::Change => CommandKind::ChangeVariable,
            Expected::Threads => CommandKind::ListThreads,
            Expected::Version => CommandKind::Version,
        }
    }

    /// Turn the reply frame into a result for the waiting caller.
    pub(crate) fn read_reply(&self, frame: &ProtocolFrame) -> Result<Reply> {
        match frame.kind() {
            Some(CommandKind::Error) => {
                return Err(DebuggerError::RemoteEvaluation(frame.payload().to_string()));
            }
            Some(kind) if kind == self.kind() => {}
            _ => {
                return Err(DebuggerError::MalformedResponse(format!(
                    "expected a {} reply, got command {}",
                    self.kind(),
                    frame.command()
                )));
            }
        }

        let payload = frame.payload();
        match self {
            Expected::Variables { parent, .. } => {
                parse_variables(payload, parent).map(Reply::Variables)
            }
            Expected::Evaluation(locator) => parse_evaluation(payload, locator).map(Reply::Value),
            Expected::Change => Ok(Reply::Done),
            Expected::Threads => parse_threads(payload).map(Reply::Threads),
            Expected::Version => Ok(Reply::Text(payload.to_string())),
        }
    }
}

/// One registered request.
pub(crate) struct PendingCall {
    pub(crate) expected: Expected,
    slot: oneshot::Sender<Result<Reply>>,
}

impl PendingCall {
    pub(crate) fn resolve(self, result: Result<Reply>) {
        // The caller may have given up already; that is fine.
        let _ = self.slot.send(result);
    }
}

struct Table {
    next_sequence: SequenceId,
    calls: HashMap<SequenceId, PendingCall>,
    /// Set once the session is gone; nothing may be registered afterwards.
    closed: Option<DebuggerError>,
}

impl Table {
    fn allocate(&mut self) -> Result<SequenceId> {
        if let Some(error) = &self.closed {
            return Err(error.clone());
        }
        let sequence = self.next_sequence;
        self.next_sequence += 2;
        Ok(sequence)
    }
}

/// The outstanding-call table and the sequence counter, behind one lock.
pub(crate) struct PendingCalls {
    table: Mutex<Table>,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                // Client ids are odd; the debuggee numbers its own frames even.
                next_sequence: 1,
                calls: HashMap::new(),
                closed: None,
            }),
        }
    }

    /// Allocate a sequence id for a request that expects no reply.
    pub(crate) fn next_sequence(&self) -> Result<SequenceId> {
        poison::lock(&self.table, "allocating sequence").allocate()
    }

    /// Allocate a sequence id and register a waiter for its reply.
    pub(crate) fn register(
        &self,
        expected: Expected,
    ) -> Result<(SequenceId, oneshot::Receiver<Result<Reply>>)> {
        let mut table = poison::lock(&self.table, "registering call");
        let sequence = table.allocate()?;
        let (slot, rx) = oneshot::channel();
        table.calls.insert(sequence, PendingCall { expected, slot });
        Ok((sequence, rx))
    }

    pub(crate) fn take(&self, sequence: SequenceId) -> Option<PendingCall> {
        poison::lock(&self.table, "taking call")
            .calls
            .remove(&sequence)
    }

    /// Drop a call without resolving it. Returns whether it was still there.
    pub(crate) fn remove(&self, sequence: SequenceId) -> bool {
        self.take(sequence).is_some()
    }

    /// Refuse further registrations and resolve every outstanding call with
    /// `error`. Only the first close has any effect; returns how many calls
    /// were flushed.
    pub(crate) fn close(&self, error: DebuggerError) -> usize {
        let drained: Vec<PendingCall> = {
            let mut table = poison::lock(&self.table, "closing calls");
            if table.closed.is_some() {
                return 0;
            }
            table.closed = Some(error.clone());
            table.calls.drain().map(|(_, call)| call).collect()
        };

        let flushed = drained.len();
        for call in drained {
            call.resolve(Err(error.clone()));
        }
        flushed
    }

    /// Remove `sequence` from the table when the returned guard is dropped,
    /// so a caller that stops waiting does not leave its entry behind.
    pub(crate) fn guard(&self, sequence: SequenceId) -> CallGuard<'_> {
        CallGuard {
            pending: self,
            sequence,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        poison::lock(&self.table, "checking closed")
            .closed
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        poison::lock(&self.table, "counting calls").calls.len()
    }
}

pub(crate) struct CallGuard<'a> {
    pending: &'a PendingCalls,
    sequence: SequenceId,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        // Ids are never reused, so a reply that already took the entry is
        // unaffected.
        if self.pending.remove(self.sequence) {
            tracing::debug!(sequence = self.sequence, "caller stopped waiting");
        }
    }
}
