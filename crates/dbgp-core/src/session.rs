//! One attached debuggee thread and its execution-state machine.
//!
//! - `SessionLink`: the half shared with the transport thread. Inbound
//!   replies, stream output and disconnects land here.
//! - `Session`: the half owned by the command thread. Every operation
//!   checks the current state, sends one request and waits for the
//!   correlated reply.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::breakpoints::{Breakpoint, BreakpointId, BreakpointState, Spawnpoint, SpawnpointId};
use crate::error::{DbgpError, DbgpResult, EntityKind};
use crate::protocol::{
    ContextName, EngineStatus, Feature, Inbound, Property, PropertyQuery, Reply, ReplyBody,
    Request, RequestKind, ResumeMode, SessionStatus, StackFrame, StatusReason, StreamKind,
    StreamMode, TransactionId, TypeMapEntry,
};
use crate::transaction::{PendingReply, ReplyRouter, RouteOutcome, TransactionAllocator};

/// Outbound half of a connection to one debuggee thread.
pub trait Transport: Send {
    /// Encode and send one request.
    fn send(&mut self, request: &Request) -> DbgpResult<()>;

    /// Release the connection. Called once the session reaches a terminal state.
    fn close(&mut self) {}
}

/// What the debuggee reported about itself when it connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub application_id: SmolStr,
    pub thread_id: SmolStr,
    pub language: SmolStr,
    pub file_uri: Option<SmolStr>,
    pub ide_key: Option<SmolStr>,
}

impl SessionInfo {
    #[must_use]
    pub fn new(application_id: &str, thread_id: &str, language: &str) -> Self {
        Self {
            application_id: application_id.into(),
            thread_id: thread_id.into(),
            language: language.into(),
            file_uri: None,
            ide_key: None,
        }
    }
}

/// A freshly accepted debuggee connection, ready to become a session.
pub struct Connection {
    pub info: SessionInfo,
    pub transport: Box<dyn Transport>,
    pub link: SessionLink,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Upper bound on every reply wait; `None` waits forever.
    pub response_timeout: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            response_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Debuggee output captured between commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutput {
    pub kind: StreamKind,
    pub data: String,
}

/// Reply to one interactive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractPrompt {
    pub prompt: SmolStr,
    /// The debuggee expects a continuation line.
    pub more: bool,
}

#[derive(Debug)]
struct LinkState {
    status: SessionStatus,
    reason: StatusReason,
    output: Vec<StreamOutput>,
}

#[derive(Debug)]
struct LinkInner {
    state: Mutex<LinkState>,
    router: ReplyRouter,
}

/// State shared between a session and its transport thread.
#[derive(Debug, Clone)]
pub struct SessionLink {
    inner: Arc<LinkInner>,
}

impl Default for SessionLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LinkInner {
                state: Mutex::new(LinkState {
                    status: SessionStatus::Attached,
                    reason: StatusReason::Ok,
                    output: Vec::new(),
                }),
                router: ReplyRouter::new(),
            }),
        }
    }

    /// Entry point for everything the transport receives.
    pub fn deliver(&self, inbound: Inbound) {
        match inbound {
            Inbound::Reply(reply) => {
                if let ReplyBody::Status { status, reason } = &reply.body {
                    self.apply_engine_status(*status, *reason);
                }
                if self.inner.router.route(reply) == RouteOutcome::Unexpected {
                    self.fail("reply for unknown transaction");
                }
            }
            Inbound::Stream { kind, data } => {
                self.inner
                    .state
                    .lock()
                    .output
                    .push(StreamOutput { kind, data });
            }
            Inbound::Disconnected { reason } => self.fail(reason),
        }
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.state.lock().status
    }

    #[must_use]
    pub fn reason(&self) -> StatusReason {
        self.inner.state.lock().reason
    }

    fn apply_engine_status(&self, status: EngineStatus, reason: StatusReason) {
        self.transition(status.session_status(), reason);
    }

    /// Move to `status` unless already terminal. Returns whether it moved.
    fn transition(&self, status: SessionStatus, reason: StatusReason) -> bool {
        let mut state = self.inner.state.lock();
        if state.status.is_terminal() {
            debug!(ignored = %status, current = %state.status, "status change after end");
            return false;
        }
        state.status = status;
        state.reason = reason;
        true
    }

    /// Force `Stopped` and fail every outstanding wait.
    fn fail(&self, reason: impl Into<SmolStr>) {
        let reason = reason.into();
        if self.transition(SessionStatus::Stopped, StatusReason::Error) {
            warn!(%reason, "session lost");
        }
        self.inner.router.close(reason);
    }

    fn router(&self) -> &ReplyRouter {
        &self.inner.router
    }

    /// Drain buffered stream output. Usable from any thread holding a clone.
    pub fn take_output(&self) -> Vec<StreamOutput> {
        std::mem::take(&mut self.inner.state.lock().output)
    }
}

#[derive(Debug)]
struct Continuation {
    pending: PendingReply,
    previous: SessionStatus,
}

/// One debuggee thread as seen from the command thread.
pub struct Session {
    info: SessionInfo,
    transport: Box<dyn Transport>,
    link: SessionLink,
    allocator: TransactionAllocator,
    interactions: HashMap<TransactionId, PendingReply>,
    continuation: Option<Continuation>,
    remote_breakpoints: HashMap<BreakpointId, SmolStr>,
    remote_spawnpoints: HashMap<SpawnpointId, SmolStr>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Session {
    #[must_use]
    pub fn new(connection: Connection, settings: SessionSettings) -> Self {
        info!(
            application = %connection.info.application_id,
            thread = %connection.info.thread_id,
            language = %connection.info.language,
            "session attached"
        );
        Self {
            info: connection.info,
            transport: connection.transport,
            link: connection.link,
            allocator: TransactionAllocator::new(),
            interactions: HashMap::new(),
            continuation: None,
            remote_breakpoints: HashMap::new(),
            remote_spawnpoints: HashMap::new(),
            timeout: settings.response_timeout,
        }
    }

    #[must_use]
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    #[must_use]
    pub fn thread_id(&self) -> &str {
        &self.info.thread_id
    }

    #[must_use]
    pub fn application_id(&self) -> &str {
        &self.info.application_id
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.info.language
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.link.status()
    }

    #[must_use]
    pub fn reason(&self) -> StatusReason {
        self.link.reason()
    }

    /// Shared handle for reading status and output without borrowing the session.
    #[must_use]
    pub fn link(&self) -> &SessionLink {
        &self.link
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.status().is_terminal()
    }

    #[must_use]
    pub fn response_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn set_response_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    // ---- execution control ----

    /// Start or continue execution. Returns the continuation transaction,
    /// whose reply carries the next engine status.
    pub fn resume(&mut self, mode: ResumeMode) -> DbgpResult<TransactionId> {
        let previous = self.status();
        if !matches!(previous, SessionStatus::Attached | SessionStatus::Break) {
            return Err(DbgpError::InvalidState {
                operation: mode.command_name(),
                status: previous,
            });
        }
        self.link.transition(SessionStatus::Running, StatusReason::Ok);
        let pending = self.request(RequestKind::Resume(mode))?;
        let id = pending.id();
        self.continuation = Some(Continuation { pending, previous });
        Ok(id)
    }

    /// Block until the last continuation reports back. Returns the status
    /// afterwards; still `Running` if `timeout` elapsed first.
    pub fn wait_for_stop(&mut self, timeout: Option<Duration>) -> DbgpResult<SessionStatus> {
        let Some(continuation) = self.continuation.take() else {
            return Ok(self.status());
        };
        match continuation.pending.wait(timeout) {
            Ok(reply) => self.finish_continuation(reply, continuation.previous),
            Err(DbgpError::Timeout(_)) => {
                self.continuation = Some(continuation);
                Ok(self.status())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Reap a continuation reply that already arrived, without blocking.
    pub fn poll(&mut self) -> DbgpResult<SessionStatus> {
        let Some(continuation) = self.continuation.take() else {
            return Ok(self.status());
        };
        match continuation.pending.try_take() {
            None => {
                self.continuation = Some(continuation);
                Ok(self.status())
            }
            Some(Ok(reply)) => self.finish_continuation(reply, continuation.previous),
            Some(Err(err)) => Err(self.fail(err)),
        }
    }

    fn finish_continuation(
        &mut self,
        reply: Reply,
        previous: SessionStatus,
    ) -> DbgpResult<SessionStatus> {
        match reply.into_result() {
            Ok(ReplyBody::Status { .. }) => {
                let status = self.status();
                if status.is_terminal() {
                    self.close_transport();
                }
                Ok(status)
            }
            Ok(body) => self.mismatch("status", &body),
            Err(err) => {
                // Engine refused to resume; it never left the previous state.
                self.link.transition(previous, StatusReason::Error);
                Err(err)
            }
        }
    }

    /// Ask a running debuggee to pause.
    pub fn break_now(&mut self) -> DbgpResult<()> {
        let status = self.status();
        if status != SessionStatus::Running {
            return Err(DbgpError::InvalidState {
                operation: "break",
                status,
            });
        }
        match self.call(RequestKind::Break)? {
            ReplyBody::Success(_) => Ok(()),
            body => self.mismatch("success", &body),
        }
    }

    /// End the debuggee. The session is `Stopped` afterwards even if the
    /// request could not be delivered.
    pub fn stop(&mut self) -> DbgpResult<()> {
        self.finish("stop", SessionStatus::Stopped, RequestKind::Stop)
    }

    /// Release the debuggee and let it run on without the debugger.
    pub fn detach(&mut self) -> DbgpResult<()> {
        self.finish("detach", SessionStatus::Detached, RequestKind::Detach)
    }

    fn finish(
        &mut self,
        operation: &'static str,
        target: SessionStatus,
        kind: RequestKind,
    ) -> DbgpResult<()> {
        let status = self.status();
        if status.is_terminal() {
            return Err(DbgpError::InvalidState { operation, status });
        }
        // Move first so the engine's own stopping report cannot win the race.
        self.link.transition(target, StatusReason::Ok);
        match self.request(kind) {
            Ok(pending) => {
                if let Err(err) = pending.wait(self.timeout) {
                    debug!(thread = %self.info.thread_id, %err, "no acknowledgement for {operation}");
                }
            }
            Err(err) => debug!(thread = %self.info.thread_id, %err, "{operation} not delivered"),
        }
        info!(thread = %self.info.thread_id, status = %target, "session ended");
        self.link.router().close(format!("session {}", target));
        self.continuation = None;
        self.interactions.clear();
        self.close_transport();
        Ok(())
    }

    /// Ask the debuggee for its status and adopt whatever it reports.
    pub fn update_status(&mut self) -> DbgpResult<SessionStatus> {
        if self.status().is_terminal() {
            return Ok(self.status());
        }
        match self.call(RequestKind::Status)? {
            ReplyBody::Status { .. } => Ok(self.status()),
            body => self.mismatch("status", &body),
        }
    }

    // ---- inspection ----

    pub fn stack_depth(&mut self) -> DbgpResult<u32> {
        match self.inspect("read the stack", RequestKind::StackDepth)? {
            ReplyBody::StackDepth(depth) => Ok(depth),
            body => self.mismatch("stack depth", &body),
        }
    }

    /// Frames up to `depth`; `None` returns the whole stack.
    pub fn stack_get(&mut self, depth: Option<u32>) -> DbgpResult<Vec<StackFrame>> {
        match self.inspect("read the stack", RequestKind::StackGet { depth })? {
            ReplyBody::Stack(frames) => Ok(frames),
            body => self.mismatch("stack", &body),
        }
    }

    pub fn stack_frames(&mut self) -> DbgpResult<Vec<StackFrame>> {
        self.stack_get(None)
    }

    pub fn context_names(&mut self, depth: u32) -> DbgpResult<Vec<ContextName>> {
        match self.inspect("list contexts", RequestKind::ContextNames { depth })? {
            ReplyBody::ContextNames(names) => Ok(names),
            body => self.mismatch("context names", &body),
        }
    }

    pub fn context_get(&mut self, context_id: u32, depth: u32) -> DbgpResult<Vec<Property>> {
        let kind = RequestKind::ContextGet { context_id, depth };
        match self.inspect("read a context", kind)? {
            ReplyBody::Properties(properties) => Ok(properties),
            body => self.mismatch("properties", &body),
        }
    }

    pub fn property_get(&mut self, query: PropertyQuery) -> DbgpResult<Property> {
        match self.inspect("read a property", RequestKind::PropertyGet(query))? {
            ReplyBody::Property(property) => Ok(property),
            body => self.mismatch("property", &body),
        }
    }

    pub fn property_set(&mut self, query: PropertyQuery, value: &str) -> DbgpResult<bool> {
        let kind = RequestKind::PropertySet {
            query,
            value: value.to_string(),
        };
        match self.inspect("set a property", kind)? {
            ReplyBody::Success(ok) => Ok(ok),
            body => self.mismatch("success", &body),
        }
    }

    pub fn property_value(&mut self, query: PropertyQuery) -> DbgpResult<String> {
        match self.inspect("read a property", RequestKind::PropertyValue(query))? {
            ReplyBody::Value(value) => Ok(value),
            body => self.mismatch("value", &body),
        }
    }

    pub fn eval(&mut self, code: &str) -> DbgpResult<Property> {
        let kind = RequestKind::Eval {
            code: code.to_string(),
        };
        match self.inspect("evaluate", kind)? {
            ReplyBody::Property(property) => Ok(property),
            body => self.mismatch("property", &body),
        }
    }

    pub fn source(
        &mut self,
        filename: Option<&str>,
        begin: Option<u32>,
        end: Option<u32>,
    ) -> DbgpResult<String> {
        let kind = RequestKind::Source {
            filename: filename.map(str::to_string),
            begin,
            end,
        };
        match self.inspect("read source", kind)? {
            ReplyBody::Source(text) => Ok(text),
            body => self.mismatch("source", &body),
        }
    }

    pub fn type_map(&mut self) -> DbgpResult<Vec<TypeMapEntry>> {
        match self.inspect("read the type map", RequestKind::TypeMapGet)? {
            ReplyBody::TypeMap(entries) => Ok(entries),
            body => self.mismatch("type map", &body),
        }
    }

    pub fn feature_get(&mut self, name: &str) -> DbgpResult<Feature> {
        let kind = RequestKind::FeatureGet { name: name.into() };
        match self.inspect("read a feature", kind)? {
            ReplyBody::Feature(feature) => Ok(feature),
            body => self.mismatch("feature", &body),
        }
    }

    pub fn feature_set(&mut self, name: &str, value: &str) -> DbgpResult<bool> {
        let kind = RequestKind::FeatureSet {
            name: name.into(),
            value: value.to_string(),
        };
        match self.inspect("set a feature", kind)? {
            ReplyBody::Success(ok) => Ok(ok),
            body => self.mismatch("success", &body),
        }
    }

    /// Change how a debuggee output stream is shared.
    pub fn redirect(&mut self, stream: StreamKind, mode: StreamMode) -> DbgpResult<bool> {
        let kind = match stream {
            StreamKind::Stdout => RequestKind::Stdout(mode),
            StreamKind::Stderr => RequestKind::Stderr(mode),
        };
        match self.inspect("redirect output", kind)? {
            ReplyBody::Success(ok) => Ok(ok),
            body => self.mismatch("success", &body),
        }
    }

    /// Drain debuggee output received since the last call.
    pub fn take_output(&mut self) -> Vec<StreamOutput> {
        self.link.take_output()
    }

    // ---- breakpoint forwarding ----

    pub fn set_breakpoint(&mut self, breakpoint: &Breakpoint) -> DbgpResult<SmolStr> {
        let kind = RequestKind::BreakpointSet(breakpoint.clone());
        match self.inspect("set breakpoint", kind)? {
            ReplyBody::Point { remote_id } => {
                self.remote_breakpoints
                    .insert(breakpoint.id, remote_id.clone());
                Ok(remote_id)
            }
            body => self.mismatch("point", &body),
        }
    }

    pub fn update_breakpoint(
        &mut self,
        id: BreakpointId,
        state: BreakpointState,
    ) -> DbgpResult<()> {
        self.require("update breakpoint")?;
        let Some(remote_id) = self.remote_breakpoints.get(&id).cloned() else {
            debug!(breakpoint = %id, "breakpoint unknown to debuggee");
            return Ok(());
        };
        self.expect_success(RequestKind::BreakpointUpdate { remote_id, state })
    }

    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> DbgpResult<()> {
        self.require("remove breakpoint")?;
        let Some(remote_id) = self.remote_breakpoints.get(&id).cloned() else {
            debug!(breakpoint = %id, "breakpoint unknown to debuggee");
            return Ok(());
        };
        self.expect_success(RequestKind::BreakpointRemove { remote_id })?;
        self.remote_breakpoints.remove(&id);
        Ok(())
    }

    pub fn set_spawnpoint(&mut self, spawnpoint: &Spawnpoint) -> DbgpResult<SmolStr> {
        let kind = RequestKind::SpawnpointSet(spawnpoint.clone());
        match self.inspect("set spawnpoint", kind)? {
            ReplyBody::Point { remote_id } => {
                self.remote_spawnpoints
                    .insert(spawnpoint.id, remote_id.clone());
                Ok(remote_id)
            }
            body => self.mismatch("point", &body),
        }
    }

    pub fn update_spawnpoint(
        &mut self,
        id: SpawnpointId,
        state: BreakpointState,
    ) -> DbgpResult<()> {
        self.require("update spawnpoint")?;
        let Some(remote_id) = self.remote_spawnpoints.get(&id).cloned() else {
            debug!(spawnpoint = %id, "spawnpoint unknown to debuggee");
            return Ok(());
        };
        self.expect_success(RequestKind::SpawnpointUpdate { remote_id, state })
    }

    pub fn remove_spawnpoint(&mut self, id: SpawnpointId) -> DbgpResult<()> {
        self.require("remove spawnpoint")?;
        let Some(remote_id) = self.remote_spawnpoints.get(&id).cloned() else {
            debug!(spawnpoint = %id, "spawnpoint unknown to debuggee");
            return Ok(());
        };
        self.expect_success(RequestKind::SpawnpointRemove { remote_id })?;
        self.remote_spawnpoints.remove(&id);
        Ok(())
    }

    /// Engine-side id of a forwarded breakpoint.
    #[must_use]
    pub fn remote_breakpoint_id(&self, id: BreakpointId) -> Option<&str> {
        self.remote_breakpoints.get(&id).map(SmolStr::as_str)
    }

    #[must_use]
    pub fn remote_spawnpoint_id(&self, id: SpawnpointId) -> Option<&str> {
        self.remote_spawnpoints.get(&id).map(SmolStr::as_str)
    }

    /// Breakpoints this debuggee currently holds.
    pub fn forwarded_breakpoints(&self) -> impl Iterator<Item = BreakpointId> + '_ {
        self.remote_breakpoints.keys().copied()
    }

    pub fn forwarded_spawnpoints(&self) -> impl Iterator<Item = SpawnpointId> + '_ {
        self.remote_spawnpoints.keys().copied()
    }

    // ---- interactive channel ----

    /// Send one interactive line and return its transaction id without
    /// waiting. `Some("")` opens the dialogue; `None` closes it and its
    /// reply is dropped on arrival.
    pub fn interact(&mut self, text: Option<&str>) -> DbgpResult<TransactionId> {
        let kind = RequestKind::Interact {
            text: text.map(str::to_string),
        };
        if text.is_none() {
            let status = self.status();
            if status.is_terminal() {
                return Err(DbgpError::InvalidState {
                    operation: "interact",
                    status,
                });
            }
            let id = self.allocator.next_id();
            self.link.router().discard(id);
            self.send(id, kind)?;
            return Ok(id);
        }
        self.require("interact")?;
        let pending = self.request(kind)?;
        let id = pending.id();
        self.interactions.insert(id, pending);
        Ok(id)
    }

    /// Wait for the reply to an earlier `interact` call.
    pub fn wait_response(
        &mut self,
        id: TransactionId,
        timeout: Option<Duration>,
    ) -> DbgpResult<InteractPrompt> {
        let pending = self
            .interactions
            .remove(&id)
            .ok_or_else(|| DbgpError::not_found(EntityKind::Transaction, id))?;
        let reply = match pending.wait(timeout) {
            Ok(reply) => reply,
            Err(err) => return Err(self.fail(err)),
        };
        match reply.into_result()? {
            ReplyBody::Interact { prompt, more } => Ok(InteractPrompt { prompt, more }),
            body => self.mismatch("interact", &body),
        }
    }

    /// Interactive transactions sent but not yet waited for.
    #[must_use]
    pub fn pending_interactions(&self) -> usize {
        self.interactions.len()
    }

    // ---- plumbing ----

    fn require(&self, operation: &'static str) -> DbgpResult<()> {
        let status = self.status();
        if status.accepts_commands() {
            Ok(())
        } else {
            Err(DbgpError::InvalidState { operation, status })
        }
    }

    fn inspect(&mut self, operation: &'static str, kind: RequestKind) -> DbgpResult<ReplyBody> {
        self.require(operation)?;
        self.call(kind)
    }

    fn expect_success(&mut self, kind: RequestKind) -> DbgpResult<()> {
        match self.call(kind)? {
            ReplyBody::Success(_) => Ok(()),
            body => self.mismatch("success", &body),
        }
    }

    /// Send and wait with the configured timeout.
    fn call(&mut self, kind: RequestKind) -> DbgpResult<ReplyBody> {
        let pending = self.request(kind)?;
        match pending.wait(self.timeout) {
            Ok(reply) => reply.into_result(),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn request(&mut self, kind: RequestKind) -> DbgpResult<PendingReply> {
        let id = self.allocator.next_id();
        let pending = self.link.router().register(id)?;
        self.send(id, kind)?;
        Ok(pending)
    }

    fn send(&mut self, id: TransactionId, kind: RequestKind) -> DbgpResult<()> {
        debug!(
            thread = %self.info.thread_id,
            transaction = %id,
            command = kind.command_name(),
            "send"
        );
        let request = Request {
            transaction_id: id,
            kind,
        };
        if let Err(err) = self.transport.send(&request) {
            self.link.router().cancel(id);
            return Err(self.fail(err));
        }
        Ok(())
    }

    fn mismatch<T>(&mut self, expected: &str, body: &ReplyBody) -> DbgpResult<T> {
        let err = DbgpError::Protocol(
            format!("expected {expected} reply, got {}", body.label()).into(),
        );
        Err(self.fail(err))
    }

    /// Transport-class errors end the session; others pass through.
    fn fail(&mut self, err: DbgpError) -> DbgpError {
        if err.is_transport() {
            self.link.fail(err.to_string());
            self.continuation = None;
            self.interactions.clear();
            self.close_transport();
        }
        err
    }

    fn close_transport(&mut self) {
        self.transport.close();
    }
}
