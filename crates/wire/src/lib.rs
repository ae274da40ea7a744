//! Line-oriented frame transport for the pydbg debugger protocol.
//!
//! This crate handles transport concerns only:
//! - the [`ProtocolFrame`] value and the known [`CommandKind`]s
//! - encoding/decoding frames to and from the wire ([`FrameCodec`])
//! - split reader/writer halves over any [`Transport`]
//! - a running [`Connection`] with a dedicated reader task and sender task
//!
//! Request/response correlation and payload interpretation belong in the
//! `debugger` crate.
//!
//! # Wire format
//!
//! ```text
//! <command id>\t<sequence id>\t<payload>\n
//! ```
//!
//! `%`, `\n` and `\r` inside the payload are percent-escaped; see
//! [`escape`].

mod codec;
mod connection;
mod error;
pub mod escape;
mod frame;
mod reader;
mod transport;
mod writer;

pub mod testing;

pub use codec::{DEFAULT_MAX_FRAME_LEN, FrameCodec, encode_frame};
pub use connection::{Connection, ConnectionConfig, DisconnectReason, FrameHandler};
pub use error::CodecError;
pub use frame::{CommandId, CommandKind, ProtocolFrame, SequenceId};
pub use reader::FrameReader;
pub use transport::{Transport, connect_with_retry, split, split_with_codec};
pub use writer::FrameWriter;

/// The port debuggees listen on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5678;
