//! Simulated debugger engine answering requests on its own thread.

use std::sync::Arc;

use crossbeam_channel::{never, select, Receiver};
use indexmap::IndexMap;
use parking_lot::Mutex;
use smol_str::SmolStr;
use tracing::{debug, trace};

use crate::breakpoints::{Breakpoint, BreakpointKind, BreakpointState};
use crate::protocol::{
    ContextName, EngineStatus, Feature, Inbound, Property, PropertyQuery, Reply, ReplyBody,
    Request, RequestKind, ResumeMode, StackFrame, StatusReason, StreamKind, StreamMode,
    TransactionId, TypeMapEntry,
};
use crate::session::SessionLink;

use super::script::{DebuggeeScript, Variable};

const PRIMARY_PROMPT: &str = ">>> ";
const CONTINUATION_PROMPT: &str = "... ";

const ERR_FILE: u32 = 100;
const ERR_UNAVAILABLE: u32 = 5;
const ERR_NO_SUCH_BREAKPOINT: u32 = 205;
const ERR_EVAL: u32 = 206;
const ERR_PROPERTY: u32 = 300;
const ERR_STACK_DEPTH: u32 = 301;
const ERR_CONTEXT: u32 = 302;

/// Out-of-band instructions from the test or demo driving the debuggee.
#[derive(Debug, Clone)]
pub(crate) enum Control {
    /// Stop as if a breakpoint was hit in the background.
    Pause,
    /// Run to completion.
    Finish,
    /// Drop the connection.
    Disconnect,
    Emit(StreamKind, String),
}

pub(crate) struct Engine {
    link: SessionLink,
    script: DebuggeeScript,
    line: u32,
    status: EngineStatus,
    continuation: Option<TransactionId>,
    breakpoints: IndexMap<SmolStr, (Breakpoint, BreakpointState)>,
    spawnpoints: IndexMap<SmolStr, BreakpointState>,
    next_remote: u32,
    stdout: StreamMode,
    stderr: StreamMode,
    block: Vec<String>,
    log: Arc<Mutex<Vec<RequestKind>>>,
}

impl Engine {
    pub(crate) fn new(
        link: SessionLink,
        script: DebuggeeScript,
        log: Arc<Mutex<Vec<RequestKind>>>,
    ) -> Self {
        Self {
            link,
            script,
            line: 1,
            status: EngineStatus::Starting,
            continuation: None,
            breakpoints: IndexMap::new(),
            spawnpoints: IndexMap::new(),
            next_remote: 1,
            stdout: StreamMode::Disable,
            stderr: StreamMode::Disable,
            block: Vec::new(),
            log,
        }
    }

    pub(crate) fn run(mut self, requests: &Receiver<Request>, control: &Receiver<Control>) {
        // A dropped handle leaves the debuggee running on its own.
        let mut unattended = false;
        loop {
            let idle = never();
            let control = if unattended { &idle } else { control };
            let running = select! {
                recv(requests) -> request => match request {
                    Ok(request) => {
                        let open = self.drain(control);
                        if open {
                            self.handle(request);
                        }
                        open
                    }
                    Err(_) => false,
                },
                recv(control) -> message => match message {
                    Ok(message) => self.control(message),
                    Err(_) => {
                        unattended = true;
                        true
                    }
                },
            };
            if !running {
                break;
            }
        }
        debug!(file = %self.script.filename, "simulated debuggee finished");
    }

    /// Apply control messages queued before the request being handled.
    fn drain(&mut self, control: &Receiver<Control>) -> bool {
        while let Ok(message) = control.try_recv() {
            if !self.control(message) {
                return false;
            }
        }
        true
    }

    /// Returns `false` once the debuggee has hung up.
    fn control(&mut self, message: Control) -> bool {
        match message {
            Control::Pause => {
                if self.status == EngineStatus::Running {
                    self.settle(EngineStatus::Break);
                }
            }
            Control::Finish => {
                if !matches!(self.status, EngineStatus::Stopping | EngineStatus::Stopped) {
                    self.settle(EngineStatus::Stopping);
                }
            }
            Control::Emit(kind, data) => self.emit(kind, data),
            Control::Disconnect => {
                self.link.deliver(Inbound::Disconnected {
                    reason: "debuggee exited".into(),
                });
                return false;
            }
        }
        true
    }

    fn reply(&self, id: TransactionId, body: ReplyBody) {
        self.link.deliver(Inbound::Reply(Reply::new(id, body)));
    }

    fn error(&self, id: TransactionId, code: u32, message: &str) {
        self.reply(
            id,
            ReplyBody::Error {
                code,
                message: message.into(),
            },
        );
    }

    fn emit(&self, kind: StreamKind, data: String) {
        let mode = match kind {
            StreamKind::Stdout => self.stdout,
            StreamKind::Stderr => self.stderr,
        };
        if mode != StreamMode::Disable {
            self.link.deliver(Inbound::Stream { kind, data });
        }
    }

    fn status_body(&self) -> ReplyBody {
        ReplyBody::Status {
            status: self.status,
            reason: StatusReason::Ok,
        }
    }

    /// Enter `status` and answer the outstanding continuation, if any.
    fn settle(&mut self, status: EngineStatus) {
        self.status = status;
        if let Some(id) = self.continuation.take() {
            self.reply(id, self.status_body());
        }
    }

    fn handle(&mut self, request: Request) {
        let id = request.transaction_id;
        trace!(transaction = %id, command = request.kind.command_name(), "debuggee received");
        self.log.lock().push(request.kind.clone());
        match request.kind {
            RequestKind::Status => self.reply(id, self.status_body()),
            RequestKind::FeatureGet { name } => {
                let value = self.script.features.get(&name).cloned();
                let supported = value.is_some();
                self.reply(
                    id,
                    ReplyBody::Feature(Feature {
                        name,
                        supported,
                        value,
                    }),
                );
            }
            RequestKind::FeatureSet { name, value } => {
                self.script.features.insert(name, value);
                self.reply(id, ReplyBody::Success(true));
            }
            RequestKind::Resume(mode) => self.resume(id, mode),
            RequestKind::Break => {
                if self.status == EngineStatus::Running {
                    self.reply(id, ReplyBody::Success(true));
                    self.settle(EngineStatus::Break);
                } else {
                    self.error(id, ERR_UNAVAILABLE, "command not available");
                }
            }
            RequestKind::Stop => {
                self.status = EngineStatus::Stopped;
                self.reply(id, self.status_body());
                self.settle(EngineStatus::Stopped);
            }
            RequestKind::Detach => {
                self.status = EngineStatus::Stopping;
                self.reply(id, self.status_body());
                self.settle(EngineStatus::Stopping);
            }
            RequestKind::StackDepth => {
                let depth = u32::try_from(self.frames().len()).unwrap_or(u32::MAX);
                self.reply(id, ReplyBody::StackDepth(depth));
            }
            RequestKind::StackGet { depth } => {
                let frames = self.frames();
                match depth {
                    None => self.reply(id, ReplyBody::Stack(frames)),
                    Some(level) => match frames.into_iter().find(|f| f.level == level) {
                        Some(frame) => self.reply(id, ReplyBody::Stack(vec![frame])),
                        None => self.error(id, ERR_STACK_DEPTH, "stack depth invalid"),
                    },
                }
            }
            RequestKind::ContextNames { .. } => {
                let names = vec![
                    ContextName {
                        id: 0,
                        name: "Locals".into(),
                    },
                    ContextName {
                        id: 1,
                        name: "Globals".into(),
                    },
                ];
                self.reply(id, ReplyBody::ContextNames(names));
            }
            RequestKind::ContextGet { context_id, .. } => match self.context(context_id) {
                Some(variables) => {
                    let properties = variables
                        .iter()
                        .map(|(name, var)| property(name, var))
                        .collect();
                    self.reply(id, ReplyBody::Properties(properties));
                }
                None => self.error(id, ERR_CONTEXT, "invalid context"),
            },
            RequestKind::PropertyGet(query) => match self.lookup(&query) {
                Some(var) => self.reply(id, ReplyBody::Property(property(&query.fullname, &var))),
                None => self.error(id, ERR_PROPERTY, "can not get property"),
            },
            RequestKind::PropertyValue(query) => match self.lookup(&query) {
                Some(var) => self.reply(id, ReplyBody::Value(var.value)),
                None => self.error(id, ERR_PROPERTY, "can not get property"),
            },
            RequestKind::PropertySet { query, value } => {
                let data_type = query.data_type.clone();
                let target = match query.context_id {
                    Some(1) => &mut self.script.globals,
                    _ => &mut self.script.locals,
                };
                let entry = target
                    .entry(query.fullname.clone())
                    .or_insert_with(|| Variable::new("str", ""));
                entry.value = value;
                if let Some(data_type) = data_type {
                    entry.data_type = data_type;
                }
                self.reply(id, ReplyBody::Success(true));
            }
            RequestKind::Eval { code } => match self.evaluate(&code) {
                Some(var) => self.reply(id, ReplyBody::Property(property(&code, &var))),
                None => self.error(id, ERR_EVAL, "error evaluating code"),
            },
            RequestKind::Source {
                filename,
                begin,
                end,
            } => {
                if let Some(name) = filename {
                    if !self.matches_file(&name) {
                        self.error(id, ERR_FILE, "can not open file");
                        return;
                    }
                }
                let first = begin.unwrap_or(1).max(1);
                let last = end.unwrap_or(self.script.line_count());
                let text = self
                    .script
                    .source
                    .iter()
                    .zip(1u32..)
                    .filter(|(_, line)| *line >= first && *line <= last)
                    .map(|(text, _)| text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                self.reply(id, ReplyBody::Source(text));
            }
            RequestKind::TypeMapGet => self.reply(id, ReplyBody::TypeMap(type_map())),
            RequestKind::BreakpointSet(breakpoint) => {
                let remote_id = self.allocate_remote("bp");
                let state = breakpoint.state;
                self.breakpoints
                    .insert(remote_id.clone(), (breakpoint, state));
                self.reply(id, ReplyBody::Point { remote_id });
            }
            RequestKind::BreakpointUpdate { remote_id, state } => {
                match self.breakpoints.get_mut(&remote_id) {
                    Some(entry) => {
                        entry.1 = state;
                        self.reply(id, ReplyBody::Success(true));
                    }
                    None => self.error(id, ERR_NO_SUCH_BREAKPOINT, "no such breakpoint"),
                }
            }
            RequestKind::BreakpointRemove { remote_id } => {
                if self.breakpoints.shift_remove(&remote_id).is_some() {
                    self.reply(id, ReplyBody::Success(true));
                } else {
                    self.error(id, ERR_NO_SUCH_BREAKPOINT, "no such breakpoint");
                }
            }
            RequestKind::SpawnpointSet(spawnpoint) => {
                let remote_id = self.allocate_remote("sp");
                self.spawnpoints.insert(remote_id.clone(), spawnpoint.state);
                self.reply(id, ReplyBody::Point { remote_id });
            }
            RequestKind::SpawnpointUpdate { remote_id, state } => {
                match self.spawnpoints.get_mut(&remote_id) {
                    Some(entry) => {
                        *entry = state;
                        self.reply(id, ReplyBody::Success(true));
                    }
                    None => self.error(id, ERR_NO_SUCH_BREAKPOINT, "no such spawnpoint"),
                }
            }
            RequestKind::SpawnpointRemove { remote_id } => {
                if self.spawnpoints.shift_remove(&remote_id).is_some() {
                    self.reply(id, ReplyBody::Success(true));
                } else {
                    self.error(id, ERR_NO_SUCH_BREAKPOINT, "no such spawnpoint");
                }
            }
            RequestKind::Stdout(mode) => {
                self.stdout = mode;
                self.reply(id, ReplyBody::Success(true));
            }
            RequestKind::Stderr(mode) => {
                self.stderr = mode;
                self.reply(id, ReplyBody::Success(true));
            }
            RequestKind::Interact { text } => self.interact(id, text),
        }
    }

    fn resume(&mut self, id: TransactionId, mode: ResumeMode) {
        self.status = EngineStatus::Running;
        self.continuation = Some(id);
        if self.script.hold_on_run && mode == ResumeMode::Go {
            return;
        }
        let next = match mode {
            ResumeMode::Go => self.next_breakpoint_line(),
            ResumeMode::StepIn | ResumeMode::StepOver => Some(self.line + 1),
            ResumeMode::StepOut => None,
        };
        match next.filter(|line| *line <= self.script.line_count()) {
            Some(line) => {
                self.line = line;
                self.settle(EngineStatus::Break);
            }
            None => {
                self.emit(StreamKind::Stdout, "6\n".to_string());
                self.settle(EngineStatus::Stopping);
            }
        }
    }

    /// First enabled line breakpoint after the current line; temporary
    /// breakpoints go away once hit.
    fn next_breakpoint_line(&mut self) -> Option<u32> {
        let hit = self
            .breakpoints
            .iter()
            .filter(|(_, (_, state))| *state == BreakpointState::Enabled)
            .filter_map(|(remote, (bp, _))| match &bp.kind {
                BreakpointKind::Line { filename, lineno }
                    if *lineno > self.line && self.matches_file(filename) =>
                {
                    Some((remote.clone(), *lineno, bp.temporary))
                }
                _ => None,
            })
            .min_by_key(|(_, line, _)| *line)?;
        if hit.2 {
            self.breakpoints.shift_remove(&hit.0);
        }
        Some(hit.1)
    }

    fn matches_file(&self, name: &str) -> bool {
        self.script.filename == name || self.script.filename.ends_with(&format!("/{name}"))
    }

    fn allocate_remote(&mut self, prefix: &str) -> SmolStr {
        let id = self.next_remote;
        self.next_remote += 1;
        SmolStr::new(format!("{prefix}-{id}"))
    }

    fn frames(&self) -> Vec<StackFrame> {
        vec![
            StackFrame {
                level: 0,
                kind: "file".into(),
                filename: self.script.filename.clone(),
                lineno: self.line,
                location: Some(self.script.function.clone()),
            },
            StackFrame {
                level: 1,
                kind: "file".into(),
                filename: self.script.filename.clone(),
                lineno: self.script.line_count(),
                location: Some("<module>".into()),
            },
        ]
    }

    fn context(&self, context_id: u32) -> Option<&IndexMap<SmolStr, Variable>> {
        match context_id {
            0 => Some(&self.script.locals),
            1 => Some(&self.script.globals),
            _ => None,
        }
    }

    fn lookup(&self, query: &PropertyQuery) -> Option<Variable> {
        let name = query.fullname.as_str();
        match query.context_id {
            Some(context) => self.context(context)?.get(name).cloned(),
            None => self
                .script
                .locals
                .get(name)
                .or_else(|| self.script.globals.get(name))
                .cloned(),
        }
    }

    /// Variable names, integer literals and `a + b` over those.
    fn evaluate(&self, code: &str) -> Option<Variable> {
        let code = code.trim();
        if let Some((left, right)) = code.split_once('+') {
            let sum = self.integer(left.trim())? + self.integer(right.trim())?;
            return Some(Variable::new("int", sum.to_string()));
        }
        if let Ok(value) = code.parse::<i64>() {
            return Some(Variable::new("int", value.to_string()));
        }
        self.lookup(&PropertyQuery::new(code))
    }

    fn integer(&self, operand: &str) -> Option<i64> {
        operand
            .parse::<i64>()
            .ok()
            .or_else(|| self.lookup(&PropertyQuery::new(operand))?.value.parse().ok())
    }

    fn interact(&mut self, id: TransactionId, text: Option<String>) {
        let Some(line) = text else {
            self.block.clear();
            self.reply(
                id,
                ReplyBody::Interact {
                    prompt: SmolStr::default(),
                    more: false,
                },
            );
            return;
        };
        let trimmed = line.trim_end();
        if trimmed.ends_with(':') || (!self.block.is_empty() && !trimmed.is_empty()) {
            self.block.push(line);
            self.reply(
                id,
                ReplyBody::Interact {
                    prompt: CONTINUATION_PROMPT.into(),
                    more: true,
                },
            );
            return;
        }
        if !self.block.is_empty() {
            let lines = std::mem::take(&mut self.block).len();
            self.emit(StreamKind::Stdout, format!("executed {lines} line block\n"));
        } else if let Some((name, expr)) = trimmed.split_once('=') {
            if let Some(var) = self.evaluate(expr) {
                self.script.locals.insert(name.trim().into(), var);
            }
        } else if !trimmed.is_empty() {
            let output = match self.evaluate(trimmed) {
                Some(var) => format!("{}\n", var.value),
                None => format!("NameError: name '{trimmed}' is not defined\n"),
            };
            self.link.deliver(Inbound::Stream {
                kind: StreamKind::Stdout,
                data: output,
            });
        }
        self.reply(
            id,
            ReplyBody::Interact {
                prompt: PRIMARY_PROMPT.into(),
                more: false,
            },
        );
    }
}

fn property(name: &str, var: &Variable) -> Property {
    Property {
        name: name.into(),
        fullname: name.into(),
        data_type: var.data_type.clone(),
        value: Some(var.value.clone()),
        children: Vec::new(),
    }
}

fn type_map() -> Vec<TypeMapEntry> {
    [
        ("int", "int"),
        ("float", "float"),
        ("str", "string"),
        ("bool", "bool"),
        ("list", "array"),
        ("dict", "hash"),
        ("NoneType", "null"),
    ]
    .into_iter()
    .map(|(name, data_type)| TypeMapEntry {
        name: name.into(),
        data_type: data_type.into(),
    })
    .collect()
}
