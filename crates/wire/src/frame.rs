//! Protocol frame and command identifiers.
//!
//! A [`ProtocolFrame`] is the atomic unit on the wire: a command id, a
//! sequence id and a text payload. Frames are immutable once built.

use std::fmt;

/// Sequence number used to correlate a reply with its request.
pub type SequenceId = i64;

/// Raw numeric command id as it appears on the wire.
pub type CommandId = u32;

/// The commands understood by this client.
///
/// The wire keeps the raw [`CommandId`] so that frames carrying ids this
/// client does not know still decode; [`CommandKind::from_id`] maps the known
/// ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Run,
    ListThreads,
    ThreadCreate,
    ThreadKill,
    ThreadSuspend,
    ThreadRun,
    StepInto,
    StepOver,
    StepReturn,
    GetVariable,
    SetBreakpoint,
    RemoveBreakpoint,
    EvaluateExpression,
    GetFrame,
    ChangeVariable,
    Version,
    Error,
}

impl CommandKind {
    pub const fn id(self) -> CommandId {
        match self {
            CommandKind::Run => 101,
            CommandKind::ListThreads => 102,
            CommandKind::ThreadCreate => 103,
            CommandKind::ThreadKill => 104,
            CommandKind::ThreadSuspend => 105,
            CommandKind::ThreadRun => 106,
            CommandKind::StepInto => 107,
            CommandKind::StepOver => 108,
            CommandKind::StepReturn => 109,
            CommandKind::GetVariable => 110,
            CommandKind::SetBreakpoint => 111,
            CommandKind::RemoveBreakpoint => 112,
            CommandKind::EvaluateExpression => 113,
            CommandKind::GetFrame => 114,
            CommandKind::ChangeVariable => 117,
            CommandKind::Version => 501,
            CommandKind::Error => 901,
        }
    }

    pub const fn from_id(id: CommandId) -> Option<Self> {
        let kind = match id {
            101 => CommandKind::Run,
            102 => CommandKind::ListThreads,
            103 => CommandKind::ThreadCreate,
            104 => CommandKind::ThreadKill,
            105 => CommandKind::ThreadSuspend,
            106 => CommandKind::ThreadRun,
            107 => CommandKind::StepInto,
            108 => CommandKind::StepOver,
            109 => CommandKind::StepReturn,
            110 => CommandKind::GetVariable,
            111 => CommandKind::SetBreakpoint,
            112 => CommandKind::RemoveBreakpoint,
            113 => CommandKind::EvaluateExpression,
            114 => CommandKind::GetFrame,
            117 => CommandKind::ChangeVariable,
            501 => CommandKind::Version,
            901 => CommandKind::Error,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether the debuggee sends this command unsolicited.
    pub const fn is_event(self) -> bool {
        matches!(
            self,
            CommandKind::ThreadCreate
                | CommandKind::ThreadKill
                | CommandKind::ThreadSuspend
                | CommandKind::ThreadRun
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.id())
    }
}

/// One wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolFrame {
    command: CommandId,
    sequence: SequenceId,
    payload: String,
}

impl ProtocolFrame {
    pub fn new(command: CommandId, sequence: SequenceId, payload: impl Into<String>) -> Self {
        Self {
            command,
            sequence,
            payload: payload.into(),
        }
    }

    /// Build a frame for a known command.
    pub fn for_kind(kind: CommandKind, sequence: SequenceId, payload: impl Into<String>) -> Self {
        Self::new(kind.id(), sequence, payload)
    }

    pub fn command(&self) -> CommandId {
        self.command
    }

    /// The command as a known kind, if this client understands it.
    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::from_id(self.command)
    }

    pub fn sequence(&self) -> SequenceId {
        self.sequence
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ids_map_back_to_kinds() {
        for kind in [
            CommandKind::Run,
            CommandKind::ListThreads,
            CommandKind::ThreadSuspend,
            CommandKind::GetVariable,
            CommandKind::EvaluateExpression,
            CommandKind::GetFrame,
            CommandKind::ChangeVariable,
            CommandKind::Version,
            CommandKind::Error,
        ] {
            assert_eq!(CommandKind::from_id(kind.id()), Some(kind));
        }
    }

    #[test]
    fn unknown_ids_are_kept_raw() {
        let frame = ProtocolFrame::new(4242, 3, "");
        assert_eq!(frame.command(), 4242);
        assert!(frame.kind().is_none());
    }

    #[test]
    fn only_thread_notifications_are_events() {
        assert!(CommandKind::ThreadSuspend.is_event());
        assert!(CommandKind::ThreadKill.is_event());
        assert!(!CommandKind::GetFrame.is_event());
        assert!(!CommandKind::Error.is_event());
    }
}
