//! The lazily expanded view of remote values.

use serde::Serialize;

use crate::error::DebuggerError;
use crate::locator::VariableLocator;
use crate::xml::{bool_attr, elements, parse_document, required_attr};

/// One value inside the debuggee, as last reported.
///
/// Nodes are snapshots. Expanding a container returns fresh child nodes and
/// leaves this one untouched; after the owning thread resumes, or the session
/// drops, the snapshot should no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugValueNode {
    name: String,
    declared_type: Option<String>,
    string_repr: String,
    locator: VariableLocator,
    is_container: bool,
    truncated: bool,
}

impl DebugValueNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> Option<&str> {
        self.declared_type.as_deref()
    }

    pub fn string_repr(&self) -> &str {
        &self.string_repr
    }

    pub fn locator(&self) -> &VariableLocator {
        &self.locator
    }

    /// Whether [`crate::FrameAccessor::load_children`] may be called on it.
    pub fn is_container(&self) -> bool {
        self.is_container
    }

    /// Whether the debuggee cut the representation short.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl std::fmt::Display for DebugValueNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.declared_type {
            Some(ty) => write!(f, "{}: {} = {}", self.name, ty, self.string_repr)?,
            None => write!(f, "{} = {}", self.name, self.string_repr)?,
        }
        if self.truncated {
            write!(f, "...")?;
        }
        Ok(())
    }
}

fn node_from_var(
    var: &roxmltree::Node<'_, '_>,
    locator: impl FnOnce(&str) -> VariableLocator,
) -> Result<DebugValueNode, DebuggerError> {
    let name = required_attr(var, "name")?;
    Ok(DebugValueNode {
        name: name.to_string(),
        declared_type: var
            .attribute("type")
            .filter(|t| !t.is_empty())
            .map(str::to_string),
        string_repr: var.attribute("value").unwrap_or_default().to_string(),
        locator: locator(name),
        is_container: bool_attr(var, "isContainer"),
        truncated: bool_attr(var, "truncated"),
    })
}

/// Parse a frame or children reply. Each node is addressed as a child of
/// `parent`.
pub(crate) fn parse_variables(
    xml: &str,
    parent: &VariableLocator,
) -> Result<Vec<DebugValueNode>, DebuggerError> {
    let doc = parse_document(xml)?;
    elements(doc.root_element(), "var")
        .map(|var| node_from_var(&var, |name| parent.child(name)))
        .collect()
}

/// Parse an evaluate reply into the single resulting node, addressed by
/// `locator`.
pub(crate) fn parse_evaluation(
    xml: &str,
    locator: &VariableLocator,
) -> Result<DebugValueNode, DebuggerError> {
    let doc = parse_document(xml)?;
    let var = elements(doc.root_element(), "var")
        .next()
        .ok_or_else(|| DebuggerError::MalformedResponse("evaluation returned no value".into()))?;

    if bool_attr(&var, "isErrorOnEval") {
        let message = var.attribute("value").unwrap_or("evaluation failed");
        return Err(DebuggerError::RemoteEvaluation(message.to_string()));
    }

    node_from_var(&var, |_| locator.clone())
}
