//! Small helpers over `roxmltree` for the debuggee's XML replies.

use roxmltree::{Document, Node};

use crate::error::DebuggerError;

pub(crate) fn parse_document(text: &str) -> Result<Document<'_>, DebuggerError> {
    Document::parse(text).map_err(|e| DebuggerError::MalformedResponse(format!("invalid xml: {e}")))
}

/// Element children of `node` with the given tag, in document order.
pub(crate) fn elements<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |n| n.is_element() && n.has_tag_name(tag))
}

pub(crate) fn required_attr<'a>(
    node: &Node<'a, '_>,
    name: &'static str,
) -> Result<&'a str, DebuggerError> {
    node.attribute(name).ok_or_else(|| {
        DebuggerError::MalformedResponse(format!(
            "<{}> is missing the {name} attribute",
            node.tag_name().name()
        ))
    })
}

pub(crate) fn bool_attr(node: &Node<'_, '_>, name: &str) -> bool {
    matches!(node.attribute(name), Some("True" | "true" | "1"))
}
