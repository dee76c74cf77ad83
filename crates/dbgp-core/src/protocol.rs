//! Typed DBGP request and reply model.
//!
//! These are the messages exchanged with a debuggee once a transport has
//! decoded them. Byte-level framing lives in the transport, not here.

use std::fmt;

use smol_str::SmolStr;

use crate::breakpoints::{Breakpoint, BreakpointState, Spawnpoint};
use crate::error::{DbgpError, DbgpResult};

/// Per-session request identifier used to correlate replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u32);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Front-end view of a session's execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Connected, not yet started.
    Attached,
    /// Executing; only `break`, `stop` and `detach` are accepted.
    Running,
    /// Paused; inspection and breakpoint changes are accepted.
    Break,
    /// Released by the operator. Terminal.
    Detached,
    /// Ended by the operator, the debuggee or a transport failure. Terminal.
    Stopped,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Detached | Self::Stopped)
    }

    /// Whether inspection and breakpoint forwarding are allowed.
    #[must_use]
    pub fn accepts_commands(self) -> bool {
        matches!(self, Self::Attached | Self::Break)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attached => "attached",
            Self::Running => "running",
            Self::Break => "break",
            Self::Detached => "detached",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason attached to the last status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusReason {
    #[default]
    Ok,
    Error,
    Aborted,
    Exception,
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Aborted => "aborted",
            Self::Exception => "exception",
        };
        f.write_str(text)
    }
}

/// Status as reported by the debugger engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Starting,
    Running,
    Break,
    Stopping,
    Stopped,
}

impl EngineStatus {
    pub fn parse(text: &str) -> DbgpResult<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "break" => Ok(Self::Break),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            _ => Err(DbgpError::Protocol(
                format!("unknown engine status '{text}'").into(),
            )),
        }
    }

    /// Map the engine status onto the front-end state machine.
    #[must_use]
    pub fn session_status(self) -> SessionStatus {
        match self {
            Self::Starting => SessionStatus::Attached,
            Self::Running => SessionStatus::Running,
            Self::Break => SessionStatus::Break,
            Self::Stopping | Self::Stopped => SessionStatus::Stopped,
        }
    }
}

/// Continuation commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Run until the next breakpoint or the end of the script.
    Go,
    StepIn,
    StepOver,
    StepOut,
}

impl ResumeMode {
    #[must_use]
    pub fn command_name(self) -> &'static str {
        match self {
            Self::Go => "run",
            Self::StepIn => "step_into",
            Self::StepOver => "step_over",
            Self::StepOut => "step_out",
        }
    }
}

/// Debuggee output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// How a debuggee stream is shared with the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// Output stays local to the debuggee.
    #[default]
    Disable,
    /// Output is copied to the front end and still written locally.
    Copy,
    /// Output is sent to the front end only.
    Redirect,
}

impl StreamMode {
    pub fn from_code(code: u8) -> DbgpResult<Self> {
        match code {
            0 => Ok(Self::Disable),
            1 => Ok(Self::Copy),
            2 => Ok(Self::Redirect),
            _ => Err(DbgpError::validation(format!(
                "stream mode must be 0, 1 or 2 (got {code})"
            ))),
        }
    }

    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Disable => 0,
            Self::Copy => 1,
            Self::Redirect => 2,
        }
    }
}

/// Arguments shared by `property_get`, `property_set` and `property_value`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyQuery {
    pub fullname: SmolStr,
    pub depth: Option<u32>,
    pub context_id: Option<u32>,
    pub max_data: Option<u32>,
    pub data_type: Option<SmolStr>,
    pub page: Option<u32>,
}

impl PropertyQuery {
    #[must_use]
    pub fn new(fullname: impl Into<SmolStr>) -> Self {
        Self {
            fullname: fullname.into(),
            ..Self::default()
        }
    }
}

/// A request sent to the debuggee.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub transaction_id: TransactionId,
    pub kind: RequestKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    Status,
    FeatureGet { name: SmolStr },
    FeatureSet { name: SmolStr, value: String },
    Resume(ResumeMode),
    Break,
    Stop,
    Detach,
    StackDepth,
    /// `None` requests every frame.
    StackGet { depth: Option<u32> },
    ContextNames { depth: u32 },
    ContextGet { context_id: u32, depth: u32 },
    TypeMapGet,
    PropertyGet(PropertyQuery),
    PropertyValue(PropertyQuery),
    PropertySet { query: PropertyQuery, value: String },
    Eval { code: String },
    Source {
        filename: Option<String>,
        begin: Option<u32>,
        end: Option<u32>,
    },
    BreakpointSet(Breakpoint),
    BreakpointUpdate {
        remote_id: SmolStr,
        state: BreakpointState,
    },
    BreakpointRemove { remote_id: SmolStr },
    SpawnpointSet(Spawnpoint),
    SpawnpointUpdate {
        remote_id: SmolStr,
        state: BreakpointState,
    },
    SpawnpointRemove { remote_id: SmolStr },
    Stdout(StreamMode),
    Stderr(StreamMode),
    /// `Some("")` opens a dialogue, `None` closes it.
    Interact { text: Option<String> },
}

impl RequestKind {
    /// DBGP command name, used in logs.
    #[must_use]
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::FeatureGet { .. } => "feature_get",
            Self::FeatureSet { .. } => "feature_set",
            Self::Resume(mode) => mode.command_name(),
            Self::Break => "break",
            Self::Stop => "stop",
            Self::Detach => "detach",
            Self::StackDepth => "stack_depth",
            Self::StackGet { .. } => "stack_get",
            Self::ContextNames { .. } => "context_names",
            Self::ContextGet { .. } => "context_get",
            Self::TypeMapGet => "typemap_get",
            Self::PropertyGet(_) => "property_get",
            Self::PropertyValue(_) => "property_value",
            Self::PropertySet { .. } => "property_set",
            Self::Eval { .. } => "eval",
            Self::Source { .. } => "source",
            Self::BreakpointSet(_) => "breakpoint_set",
            Self::BreakpointUpdate { .. } => "breakpoint_update",
            Self::BreakpointRemove { .. } => "breakpoint_remove",
            Self::SpawnpointSet(_) => "spawnpoint_set",
            Self::SpawnpointUpdate { .. } => "spawnpoint_update",
            Self::SpawnpointRemove { .. } => "spawnpoint_remove",
            Self::Stdout(_) => "stdout",
            Self::Stderr(_) => "stderr",
            Self::Interact { .. } => "interact",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub level: u32,
    /// `file` or `eval`.
    pub kind: SmolStr,
    pub filename: SmolStr,
    pub lineno: u32,
    /// Enclosing function, when known.
    pub location: Option<SmolStr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextName {
    pub id: u32,
    pub name: SmolStr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: SmolStr,
    pub fullname: SmolStr,
    pub data_type: SmolStr,
    pub value: Option<String>,
    pub children: Vec<Property>,
}

impl Property {
    #[must_use]
    pub fn scalar(name: &str, data_type: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fullname: name.into(),
            data_type: data_type.into(),
            value: Some(value.into()),
            children: Vec::new(),
        }
    }
}

/// Answer to `feature_get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub name: SmolStr,
    pub supported: bool,
    pub value: Option<String>,
}

/// Language type to common DBGP type mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapEntry {
    pub name: SmolStr,
    pub data_type: SmolStr,
}

/// A reply from the debuggee, correlated by transaction id.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub transaction_id: TransactionId,
    pub body: ReplyBody,
}

impl Reply {
    #[must_use]
    pub fn new(transaction_id: TransactionId, body: ReplyBody) -> Self {
        Self {
            transaction_id,
            body,
        }
    }

    /// Turn an engine error reply into `DbgpError::Engine`.
    pub fn into_result(self) -> DbgpResult<ReplyBody> {
        match self.body {
            ReplyBody::Error { code, message } => Err(DbgpError::Engine { code, message }),
            body => Ok(body),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Status {
        status: EngineStatus,
        reason: StatusReason,
    },
    Feature(Feature),
    Success(bool),
    StackDepth(u32),
    Stack(Vec<StackFrame>),
    ContextNames(Vec<ContextName>),
    Properties(Vec<Property>),
    Property(Property),
    Value(String),
    Source(String),
    TypeMap(Vec<TypeMapEntry>),
    /// Identifier the engine assigned to a breakpoint or spawnpoint.
    Point { remote_id: SmolStr },
    Interact { prompt: SmolStr, more: bool },
    Error { code: u32, message: SmolStr },
}

impl ReplyBody {
    /// Short label used in protocol error messages.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Feature(_) => "feature",
            Self::Success(_) => "success",
            Self::StackDepth(_) => "stack depth",
            Self::Stack(_) => "stack",
            Self::ContextNames(_) => "context names",
            Self::Properties(_) => "properties",
            Self::Property(_) => "property",
            Self::Value(_) => "value",
            Self::Source(_) => "source",
            Self::TypeMap(_) => "type map",
            Self::Point { .. } => "point",
            Self::Interact { .. } => "interact",
            Self::Error { .. } => "error",
        }
    }
}

/// Everything a transport can hand back to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Reply(Reply),
    Stream { kind: StreamKind, data: String },
    Disconnected { reason: SmolStr },
}
