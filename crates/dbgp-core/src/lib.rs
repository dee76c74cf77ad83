//! Control-plane model for a DBGP debugger front end.
//!
//! Applications (debuggee processes) own sessions (debuggee threads) and a
//! breakpoint store. Sessions run the execution-state machine and talk to
//! the debuggee through a `Transport`; replies come back asynchronously and
//! are matched to their requests by transaction id.

pub mod application;
pub mod breakpoints;
pub mod error;
/// In-process debuggees for tests and demos.
pub mod harness;
pub mod interact;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transaction;

pub use application::Application;
pub use breakpoints::{
    Breakpoint, BreakpointId, BreakpointKind, BreakpointSpec, BreakpointState, BreakpointStore,
    BreakpointType, HitCondition, Spawnpoint, SpawnpointId, SpawnpointSpec,
};
pub use error::{DbgpError, DbgpResult, EntityKind};
pub use interact::{run_dialogue, LineSource, ScriptedLines};
pub use protocol::{ResumeMode, SessionStatus, StatusReason, StreamKind, StreamMode, TransactionId};
pub use registry::{ConnectionManager, ProxyConfig, Registry};
pub use session::{
    Connection, InteractPrompt, Session, SessionInfo, SessionLink, SessionSettings, StreamOutput,
    Transport,
};
