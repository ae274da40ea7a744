//! Client side of the pydbg debugger protocol.
//!
//! A [`DebugSession`] drives one running debuggee over a `wire` connection.
//! Calls made through a [`FrameAccessor`] are correlated with their replies
//! by sequence id, so any number may be in flight at once; replies arrive in
//! whatever order the debuggee sends them.
//!
//! Remote values are addressed with a [`VariableLocator`] and come back as
//! [`DebugValueNode`] snapshots that expand one level at a time.
//!
//! ```no_run
//! # async fn example() -> debugger::Result<()> {
//! use debugger::{DebugSession, SessionConfig};
//!
//! let session = DebugSession::new(SessionConfig::default());
//! session.connect("127.0.0.1:5678".parse().unwrap()).await?;
//!
//! let frame = session.frame_accessor("pid_1_id_1", "140230")?;
//! for node in frame.load_frame(frame.frame()).await? {
//!     println!("{node}");
//! }
//! # Ok(())
//! # }
//! ```

mod accessor;
mod error;
mod events;
mod locator;
mod pending;
mod poison;
mod session;
mod value;
mod xml;

pub mod testing;

pub use accessor::FrameAccessor;
pub use error::{DebuggerError, Result};
pub use events::{DebuggerEvent, StackFrameInfo, ThreadInfo};
pub use locator::{LocatorParseError, Scope, VariableLocator};
pub use session::{DebugSession, SessionConfig, SessionState};
pub use value::DebugValueNode;
