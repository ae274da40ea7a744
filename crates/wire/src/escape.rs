//! Percent escaping for frame payloads and payload fields.
//!
//! Two escape sets are used. The payload set keeps line boundaries intact so
//! a payload can never terminate its frame early. The field set additionally
//! removes tabs, so a single user-supplied field (an expression, a value, an
//! attribute name) can sit between tab separators unambiguously.

use crate::error::CodecError;

/// Characters escaped in a whole frame payload.
const PAYLOAD_SET: &[u8] = b"%\n\r";

/// Characters escaped in a single tab-delimited field.
const FIELD_SET: &[u8] = b"%\t\n\r";

fn escape_with(text: &str, set: &[u8]) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii() && set.contains(&(ch as u8)) {
            out.push_str(&format!("%{:02X}", ch as u8));
        } else {
            out.push(ch);
        }
    }
    out
}

/// Escape a whole payload for framing.
pub fn escape_payload(text: &str) -> String {
    escape_with(text, PAYLOAD_SET)
}

/// Escape one field so it contains no tab or line break.
pub fn escape_field(text: &str) -> String {
    escape_with(text, FIELD_SET)
}

/// Reverse either escape. Any `%XX` sequence is decoded.
pub fn unescape(text: &str) -> Result<String, CodecError> {
    if !text.contains('%') {
        return Ok(text.to_string());
    }

    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .ok_or_else(|| CodecError::InvalidEscape(text.to_string()))?;
            let hex = std::str::from_utf8(hex).map_err(|_| CodecError::InvalidUtf8)?;
            let value = u8::from_str_radix(hex, 16)
                .map_err(|_| CodecError::InvalidEscape(text.to_string()))?;
            out.push(value);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| CodecError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_escape_keeps_tabs() {
        assert_eq!(escape_payload("a\tb\nc%"), "a\tb%0Ac%25");
    }

    #[test]
    fn field_escape_removes_tabs() {
        let escaped = escape_field("x\t= {'k': 1}\n");
        assert!(!escaped.contains('\t'));
        assert!(!escaped.contains('\n'));
        assert_eq!(unescape(&escaped).unwrap(), "x\t= {'k': 1}\n");
    }

    #[test]
    fn non_ascii_passes_through() {
        let text = "naïve = '日本'";
        assert_eq!(escape_field(text), text);
        assert_eq!(unescape(text).unwrap(), text);
    }

    #[test]
    fn truncated_escape_is_an_error() {
        assert!(matches!(
            unescape("abc%2"),
            Err(CodecError::InvalidEscape(_))
        ));
        assert!(matches!(
            unescape("abc%zz"),
            Err(CodecError::InvalidEscape(_))
        ));
    }
}
