//! Typed operations on one stack frame of a suspended thread.

use std::time::Duration;

use wire::CommandKind;
use wire::escape::escape_field;

use crate::error::{DebuggerError, Result};
use crate::locator::{Scope, VariableLocator};
use crate::pending::{Expected, Reply};
use crate::session::{DebugSession, unexpected};
use crate::value::DebugValueNode;

/// Issues requests against one stack frame and turns the replies into
/// [`DebugValueNode`]s.
///
/// Any number of calls may be in flight at once, from any number of tasks;
/// replies are matched to calls by sequence id, not by order.
#[derive(Clone)]
pub struct FrameAccessor {
    session: DebugSession,
    frame: VariableLocator,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for FrameAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAccessor")
            .field("thread_id", &self.frame.thread_id())
            .field("frame_id", &self.frame.frame_id())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FrameAccessor {
    pub(crate) fn new(session: DebugSession, frame: VariableLocator) -> Self {
        let timeout = session.config().reply_timeout;
        Self {
            session,
            frame,
            timeout,
        }
    }

    /// Use a different reply timeout for calls made through this accessor.
    /// `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The locator of this frame's locals.
    pub fn frame(&self) -> &VariableLocator {
        &self.frame
    }

    pub fn thread_id(&self) -> &str {
        self.frame.thread_id()
    }

    async fn request(&self, expected: Expected, payload: String) -> Result<Reply> {
        self.session.request(expected, payload, self.timeout).await
    }

    /// Evaluate `expression` in this frame.
    ///
    /// With `execute` the expression may have side effects; with `truncate`
    /// the debuggee caps very large representations.
    #[tracing::instrument(skip(self), fields(thread = self.thread_id()))]
    pub async fn evaluate(
        &self,
        expression: &str,
        execute: bool,
        truncate: bool,
    ) -> Result<DebugValueNode> {
        let locator = VariableLocator::new(
            self.frame.thread_id(),
            self.frame.frame_id(),
            Scope::Expression,
            vec![expression.to_string()],
        )?;
        let payload = format!(
            "{}\t{}\t{}\t{}",
            self.frame,
            escape_field(expression),
            u8::from(execute),
            u8::from(truncate)
        );

        match self.request(Expected::Evaluation(locator), payload).await? {
            Reply::Value(node) => Ok(node),
            other => Err(unexpected(other)),
        }
    }

    /// The variables visible at `locator`.
    ///
    /// A frame's locals are fetched with a frame request; any other locator
    /// (globals, or a path into a value) with a variable request.
    #[tracing::instrument(skip(self), fields(locator = %locator))]
    pub async fn load_frame(&self, locator: &VariableLocator) -> Result<Vec<DebugValueNode>> {
        let kind = if locator.scope() == Scope::Local && locator.path().is_empty() {
            CommandKind::GetFrame
        } else {
            CommandKind::GetVariable
        };
        self.load(kind, locator).await
    }

    /// Expand one level of a container. Never expands further down; calling
    /// it again re-issues the request.
    #[tracing::instrument(skip(self, node), fields(locator = %node.locator()))]
    pub async fn load_children(&self, node: &DebugValueNode) -> Result<Vec<DebugValueNode>> {
        if !node.is_container() {
            return Err(DebuggerError::NotAContainer(node.name().to_string()));
        }
        self.load(CommandKind::GetVariable, node.locator()).await
    }

    async fn load(
        &self,
        kind: CommandKind,
        locator: &VariableLocator,
    ) -> Result<Vec<DebugValueNode>> {
        let expected = Expected::Variables {
            kind,
            parent: locator.clone(),
        };
        match self.request(expected, locator.to_string()).await? {
            Reply::Variables(nodes) => Ok(nodes),
            other => Err(unexpected(other)),
        }
    }

    /// Assign the result of `value` to the variable at `locator`.
    ///
    /// Nodes fetched earlier for that variable are stale afterwards.
    #[tracing::instrument(skip(self), fields(locator = %locator))]
    pub async fn change_variable(&self, locator: &VariableLocator, value: &str) -> Result<()> {
        let payload = format!("{locator}\t{}", escape_field(value));
        match self.request(Expected::Change, payload).await? {
            Reply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn resume(&self) -> Result<()> {
        self.session.resume(self.thread_id()).await
    }

    pub async fn suspend(&self) -> Result<()> {
        self.session.suspend(self.thread_id()).await
    }

    pub async fn step_into(&self) -> Result<()> {
        self.step(CommandKind::StepInto).await
    }

    pub async fn step_over(&self) -> Result<()> {
        self.step(CommandKind::StepOver).await
    }

    pub async fn step_return(&self) -> Result<()> {
        self.step(CommandKind::StepReturn).await
    }

    async fn step(&self, kind: CommandKind) -> Result<()> {
        tracing::debug!(%kind, thread = self.thread_id(), "stepping");
        self.session
            .notify(kind, self.thread_id().to_string())
            .await
    }
}
