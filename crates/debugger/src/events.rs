//! Unsolicited notifications from the debuggee.

use serde::Serialize;
use wire::CommandKind;

use crate::error::DebuggerError;
use crate::xml::{elements, parse_document, required_attr};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadInfo {
    pub id: String,
    pub name: String,
}

/// A stack frame of a suspended thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrameInfo {
    pub id: String,
    pub name: String,
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebuggerEvent {
    ThreadCreated(ThreadInfo),
    ThreadKilled {
        thread_id: String,
    },
    /// The thread stopped; `frames` is its stack, innermost first.
    ThreadSuspended {
        thread_id: String,
        reason: String,
        frames: Vec<StackFrameInfo>,
    },
    ThreadResumed {
        thread_id: String,
        reason: String,
    },
}

impl DebuggerEvent {
    /// Decode an event frame. Returns `None` for kinds that are not events.
    pub(crate) fn decode(kind: CommandKind, payload: &str) -> Result<Option<Self>, DebuggerError> {
        let event = match kind {
            CommandKind::ThreadCreate => {
                let thread = parse_threads(payload)?.into_iter().next().ok_or_else(|| {
                    DebuggerError::MalformedResponse("thread created without a thread".into())
                })?;
                DebuggerEvent::ThreadCreated(thread)
            }
            CommandKind::ThreadKill => DebuggerEvent::ThreadKilled {
                thread_id: payload.trim().to_string(),
            },
            CommandKind::ThreadSuspend => parse_suspend(payload)?,
            CommandKind::ThreadRun => {
                let (thread_id, reason) = payload.split_once('\t').unwrap_or((payload, ""));
                DebuggerEvent::ThreadResumed {
                    thread_id: thread_id.to_string(),
                    reason: reason.to_string(),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

pub(crate) fn parse_threads(xml: &str) -> Result<Vec<ThreadInfo>, DebuggerError> {
    let doc = parse_document(xml)?;
    elements(doc.root_element(), "thread")
        .map(|thread| {
            Ok(ThreadInfo {
                id: required_attr(&thread, "id")?.to_string(),
                name: thread.attribute("name").unwrap_or_default().to_string(),
            })
        })
        .collect()
}

fn parse_suspend(xml: &str) -> Result<DebuggerEvent, DebuggerError> {
    let doc = parse_document(xml)?;
    let thread = elements(doc.root_element(), "thread")
        .next()
        .ok_or_else(|| DebuggerError::MalformedResponse("suspend without a thread".into()))?;

    let frames = elements(thread, "frame")
        .map(|frame| {
            let line = match frame.attribute("line") {
                Some(line) => line.parse().map_err(|_| {
                    DebuggerError::MalformedResponse(format!("invalid line number {line:?}"))
                })?,
                None => 0,
            };
            Ok(StackFrameInfo {
                id: required_attr(&frame, "id")?.to_string(),
                name: frame.attribute("name").unwrap_or_default().to_string(),
                file: frame.attribute("file").unwrap_or_default().to_string(),
                line,
            })
        })
        .collect::<Result<Vec<_>, DebuggerError>>()?;

    Ok(DebuggerEvent::ThreadSuspended {
        thread_id: required_attr(&thread, "id")?.to_string(),
        reason: thread
            .attribute("stop_reason")
            .unwrap_or_default()
            .to_string(),
        frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_suspend_with_stack() {
        let xml = r#"<xml><thread id="t1" stop_reason="111">
            <frame id="40" name="inner" file="/app/main.py" line="12"/>
            <frame id="41" name="&lt;module&gt;" file="/app/main.py" line="30"/>
        </thread></xml>"#;

        let event = DebuggerEvent::decode(CommandKind::ThreadSuspend, xml)
            .unwrap()
            .unwrap();
        let (thread_id, reason, frames) = match event {
            DebuggerEvent::ThreadSuspended {
                thread_id,
                reason,
                frames,
            } => (thread_id, reason, frames),
            other => panic!("unexpected event {other:?}"),
        };
        assert_eq!(thread_id, "t1");
        assert_eq!(reason, "111");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].name, "<module>");
        assert_eq!(frames[0].line, 12);
    }

    #[test]
    fn decode_thread_lifecycle() {
        assert_eq!(
            DebuggerEvent::decode(
                CommandKind::ThreadCreate,
                r#"<xml><thread name="MainThread" id="t1"/></xml>"#
            )
            .unwrap(),
            Some(DebuggerEvent::ThreadCreated(ThreadInfo {
                id: "t1".into(),
                name: "MainThread".into(),
            }))
        );
        assert_eq!(
            DebuggerEvent::decode(CommandKind::ThreadRun, "t1\t108").unwrap(),
            Some(DebuggerEvent::ThreadResumed {
                thread_id: "t1".into(),
                reason: "108".into(),
            })
        );
        assert_eq!(
            DebuggerEvent::decode(CommandKind::ThreadKill, "t1").unwrap(),
            Some(DebuggerEvent::ThreadKilled {
                thread_id: "t1".into()
            })
        );
    }

    #[test]
    fn non_event_kinds_decode_to_none() {
        assert_eq!(
            DebuggerEvent::decode(CommandKind::GetFrame, "<xml/>").unwrap(),
            None
        );
    }

    #[test]
    fn bad_line_number_is_malformed() {
        let xml = r#"<xml><thread id="t1"><frame id="1" line="twelve"/></thread></xml>"#;
        assert!(matches!(
            DebuggerEvent::decode(CommandKind::ThreadSuspend, xml),
            Err(DebuggerError::MalformedResponse(_))
        ));
    }
}
