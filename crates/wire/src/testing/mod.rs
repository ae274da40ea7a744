//! Testing utilities for the wire layer.
//!
//! This module provides helpers for testing code that speaks the frame
//! protocol, including an in-memory transport and framing helpers.

mod memory;

pub use memory::MemoryTransport;

use crate::codec::encode_frame;
use crate::frame::ProtocolFrame;

/// Encode frames back to back, as they would appear on the wire.
///
/// # Example
///
/// ```
/// use wire::ProtocolFrame;
/// use wire::testing::frame_bytes;
///
/// let bytes = frame_bytes(&[
///     ProtocolFrame::new(114, 1, "<xml></xml>"),
///     ProtocolFrame::new(901, 3, "boom"),
/// ]);
/// assert_eq!(bytes, b"114\t1\t<xml></xml>\n901\t3\tboom\n");
/// ```
pub fn frame_bytes(frames: &[ProtocolFrame]) -> Vec<u8> {
    frames.iter().flat_map(encode_frame).collect()
}
