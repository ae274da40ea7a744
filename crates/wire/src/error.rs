//! Error types for the wire layer.

use std::io;

/// Errors that can occur while encoding or decoding frames.
///
/// Any decode error means frame boundaries can no longer be trusted, so the
/// connection that produced it is torn down rather than resynchronised.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The frame contained invalid UTF-8.
    #[error("invalid UTF-8 in frame")]
    InvalidUtf8,

    /// The frame did not contain the command, sequence and payload fields.
    #[error("frame is missing the {0} field")]
    MissingField(&'static str),

    /// The command id was not an unsigned integer.
    #[error("invalid command id {0:?}")]
    InvalidCommand(String),

    /// The sequence id was not an integer.
    #[error("invalid sequence id {0:?}")]
    InvalidSequence(String),

    /// A `%` escape was truncated or not hexadecimal.
    #[error("invalid escape sequence in {0:?}")]
    InvalidEscape(String),

    /// The frame exceeds the configured maximum length.
    #[error("frame length {size} exceeds maximum allowed {max}")]
    FrameTooLarge {
        /// Bytes buffered so far without a terminator.
        size: usize,
        /// The maximum allowed length.
        max: usize,
    },
}
