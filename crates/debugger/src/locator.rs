//! Addressing values inside the debuggee.
//!
//! The debuggee's memory cannot be pointed at, so a value is named by where
//! it lives: the thread, the stack frame, the scope, and the chain of
//! attribute names leading to it. The text form is
//!
//! ```text
//! threadId\tframeId\tSCOPE\tattr1\tattr2...
//! ```
//!
//! with each attribute name field-escaped so it cannot contain a tab.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use wire::escape::{escape_field, unescape};

/// Where the first element of a locator's path is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The frame's local variables.
    Local,
    /// The frame's module globals.
    Global,
    /// The result of an evaluated expression; the first path element is the
    /// expression text.
    Expression,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Local => "LOCAL",
            Scope::Global => "GLOBAL",
            Scope::Expression => "EXPRESSION",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = LocatorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // Older debuggees call the local scope FRAME.
            "LOCAL" | "FRAME" => Ok(Scope::Local),
            "GLOBAL" => Ok(Scope::Global),
            "EXPRESSION" => Ok(Scope::Expression),
            other => Err(LocatorParseError::UnknownScope(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocatorParseError {
    #[error("locator is missing the {0} field")]
    MissingField(&'static str),

    #[error("invalid thread id {0:?}")]
    InvalidThreadId(String),

    #[error("invalid frame id {0:?}")]
    InvalidFrameId(String),

    #[error("unknown scope {0:?}")]
    UnknownScope(String),

    #[error("invalid escape in attribute {0:?}")]
    InvalidAttribute(String),
}

/// Names one value inside the running debuggee.
///
/// Equality is structural, and the path is ordered: `obj.a.b` and `obj.b.a`
/// are different values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableLocator {
    thread_id: String,
    frame_id: String,
    scope: Scope,
    path: Vec<String>,
}

fn valid_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(char::is_whitespace)
}

impl VariableLocator {
    pub fn new(
        thread_id: impl Into<String>,
        frame_id: impl Into<String>,
        scope: Scope,
        path: Vec<String>,
    ) -> Result<Self, LocatorParseError> {
        let thread_id = thread_id.into();
        if !valid_id(&thread_id) {
            return Err(LocatorParseError::InvalidThreadId(thread_id));
        }
        let frame_id = frame_id.into();
        if !valid_id(&frame_id) {
            return Err(LocatorParseError::InvalidFrameId(frame_id));
        }
        Ok(Self {
            thread_id,
            frame_id,
            scope,
            path,
        })
    }

    /// The locals of a stack frame.
    pub fn frame(
        thread_id: impl Into<String>,
        frame_id: impl Into<String>,
    ) -> Result<Self, LocatorParseError> {
        Self::new(thread_id, frame_id, Scope::Local, Vec::new())
    }

    /// The same frame, looked up in `scope` with an empty path.
    pub fn with_scope(&self, scope: Scope) -> Self {
        Self {
            thread_id: self.thread_id.clone(),
            frame_id: self.frame_id.clone(),
            scope,
            path: Vec::new(),
        }
    }

    /// The locator of the attribute `name` of this value.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(name.into());
        Self {
            thread_id: self.thread_id.clone(),
            frame_id: self.frame_id.clone(),
            scope: self.scope,
            path,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Serialize to the wire's textual location syntax.
    pub fn format(&self) -> String {
        self.to_string()
    }

    /// Parse the wire's textual location syntax.
    pub fn parse(text: &str) -> Result<Self, LocatorParseError> {
        text.parse()
    }
}

impl fmt::Display for VariableLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.thread_id, self.frame_id, self.scope)?;
        for attr in &self.path {
            write!(f, "\t{}", escape_field(attr))?;
        }
        Ok(())
    }
}

impl FromStr for VariableLocator {
    type Err = LocatorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split('\t');

        let thread_id = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or(LocatorParseError::MissingField("thread id"))?;
        let frame_id = fields
            .next()
            .ok_or(LocatorParseError::MissingField("frame id"))?;
        let scope: Scope = fields
            .next()
            .ok_or(LocatorParseError::MissingField("scope"))?
            .parse()?;

        let path = fields
            .map(|attr| {
                unescape(attr).map_err(|_| LocatorParseError::InvalidAttribute(attr.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(thread_id, frame_id, scope, path)
    }
}

impl Serialize for VariableLocator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(path: &[&str]) -> VariableLocator {
        VariableLocator::new(
            "pid_42_id_1",
            "140230",
            Scope::Local,
            path.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn format_matches_wire_syntax() {
        assert_eq!(
            locator(&["obj", "items"]).format(),
            "pid_42_id_1\t140230\tLOCAL\tobj\titems"
        );
        assert_eq!(locator(&[]).format(), "pid_42_id_1\t140230\tLOCAL");
    }

    #[test]
    fn parse_inverts_format() {
        for path in [
            vec![],
            vec!["self"],
            vec!["d", "key with\ttab", "100%", "line\nbreak"],
        ] {
            let original = locator(&path);
            assert_eq!(VariableLocator::parse(&original.format()).unwrap(), original);
        }

        let expression = VariableLocator::new(
            "t1",
            "9",
            Scope::Expression,
            vec!["len(x) + 1".to_string(), "real".to_string()],
        )
        .unwrap();
        assert_eq!(
            VariableLocator::parse(&expression.format()).unwrap(),
            expression
        );
    }

    #[test]
    fn frame_scope_is_an_alias_for_local() {
        let parsed = VariableLocator::parse("t1\t9\tFRAME\tx").unwrap();
        assert_eq!(parsed.scope(), Scope::Local);
        assert_eq!(parsed.path(), ["x".to_string()]);
    }

    #[test]
    fn path_order_matters() {
        assert_ne!(locator(&["a", "b"]), locator(&["b", "a"]));
        assert_eq!(locator(&["a"]).child("b"), locator(&["a", "b"]));
    }

    #[test]
    fn malformed_locators_are_errors() {
        assert_eq!(
            VariableLocator::parse("t1\t9"),
            Err(LocatorParseError::MissingField("scope"))
        );
        assert_eq!(
            VariableLocator::parse(""),
            Err(LocatorParseError::MissingField("thread id"))
        );
        assert_eq!(
            VariableLocator::parse("t1\t9\tHEAP"),
            Err(LocatorParseError::UnknownScope("HEAP".to_string()))
        );
        assert_eq!(
            VariableLocator::parse("bad thread\t9\tLOCAL"),
            Err(LocatorParseError::InvalidThreadId("bad thread".to_string()))
        );
        assert_eq!(
            VariableLocator::parse("t1\t\tLOCAL"),
            Err(LocatorParseError::InvalidFrameId(String::new()))
        );
        assert!(matches!(
            VariableLocator::parse("t1\t9\tLOCAL\tx%Z"),
            Err(LocatorParseError::InvalidAttribute(_))
        ));
    }

    #[test]
    fn with_scope_drops_the_path() {
        let globals = locator(&["x"]).with_scope(Scope::Global);
        assert_eq!(globals.scope(), Scope::Global);
        assert!(globals.path().is_empty());
    }
}
