//! A debuggee process: its sessions, the current selection and its
//! breakpoint store.

use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::breakpoints::{
    Breakpoint, BreakpointId, BreakpointSpec, BreakpointState, BreakpointStore, Spawnpoint,
    SpawnpointId, SpawnpointSpec,
};
use crate::error::{DbgpError, DbgpResult, EntityKind};
use crate::session::{Session, SessionInfo, StreamOutput};

#[derive(Debug)]
pub struct Application {
    id: SmolStr,
    language: SmolStr,
    sessions: Vec<Session>,
    /// Thread id of the current session.
    current: Option<SmolStr>,
    points: BreakpointStore,
    /// Threads that missed a point change while running.
    unsynced: Vec<SmolStr>,
}

impl Application {
    #[must_use]
    pub fn new(id: impl Into<SmolStr>, language: impl Into<SmolStr>) -> Self {
        Self {
            id: id.into(),
            language: language.into(),
            sessions: Vec::new(),
            current: None,
            points: BreakpointStore::new(),
            unsynced: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Add a newly connected thread. The first one becomes current, and
    /// stored points for the application's language are pushed to it.
    pub fn attach(&mut self, mut session: Session) {
        if session.status().accepts_commands() {
            reconcile(&self.points, &self.language, &mut session);
        } else if session.is_live() {
            self.unsynced.push(session.thread_id().into());
        }
        if self.current.is_none() {
            self.current = Some(session.thread_id().into());
        }
        self.sessions.push(session);
    }

    /// Sessions in attach order.
    #[must_use]
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    #[must_use]
    pub fn session(&self, thread_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.thread_id() == thread_id)
    }

    fn current_index(&self) -> Option<usize> {
        let current = self.current.as_deref()?;
        self.sessions.iter().position(|s| s.thread_id() == current)
    }

    #[must_use]
    pub fn current_session(&self) -> Option<&Session> {
        self.current_index().map(|index| &self.sessions[index])
    }

    pub fn current_session_mut(&mut self) -> Option<&mut Session> {
        let index = self.current_index()?;
        Some(&mut self.sessions[index])
    }

    /// The current session, or `NotFound` when there is none.
    pub fn require_current(&mut self) -> DbgpResult<&mut Session> {
        let id = self.id.clone();
        self.current_session_mut()
            .ok_or_else(|| DbgpError::not_found(EntityKind::Session, format!("current ({id})")))
    }

    /// Make `thread_id` current. On a miss the selection is left as it was.
    pub fn select_session(&mut self, thread_id: &str) -> DbgpResult<&Session> {
        let index = self
            .sessions
            .iter()
            .position(|s| s.thread_id() == thread_id)
            .ok_or_else(|| DbgpError::not_found(EntityKind::Session, thread_id))?;
        self.current = Some(thread_id.into());
        Ok(&self.sessions[index])
    }

    /// Number of sessions not yet stopped or detached.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_live()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Reap continuation replies that arrived since the last command, then
    /// bring threads that missed point changes up to date once they break.
    pub fn poll(&mut self) {
        for session in &mut self.sessions {
            if let Err(err) = session.poll() {
                warn!(thread = %session.thread_id(), %err, "continuation failed");
            }
        }
        self.resync();
    }

    fn resync(&mut self) {
        let mut waiting = Vec::new();
        for thread in std::mem::take(&mut self.unsynced) {
            let Some(session) = self
                .sessions
                .iter_mut()
                .find(|s| s.thread_id() == thread.as_str())
            else {
                continue;
            };
            if !session.is_live() {
                continue;
            }
            if session.status().accepts_commands() {
                debug!(application = %self.id, %thread, "resyncing points");
                reconcile(&self.points, &self.language, session);
            } else {
                waiting.push(thread);
            }
        }
        self.unsynced = waiting;
    }

    /// Threads still waiting for a point resync.
    #[must_use]
    pub fn unsynced_threads(&self) -> &[SmolStr] {
        &self.unsynced
    }

    /// Drop stopped and detached sessions, moving the selection to the
    /// first live session when the current one goes.
    pub fn prune(&mut self) -> Vec<SessionInfo> {
        let mut removed = Vec::new();
        self.sessions.retain(|session| {
            if session.is_live() {
                true
            } else {
                removed.push(session.info().clone());
                false
            }
        });
        for info in &removed {
            info!(application = %self.id, thread = %info.thread_id, "session removed");
        }
        if self.current_index().is_none() {
            self.current = self.sessions.first().map(|s| SmolStr::new(s.thread_id()));
        }
        removed
    }

    pub fn set_response_timeout(&mut self, timeout: Option<std::time::Duration>) {
        for session in &mut self.sessions {
            session.set_response_timeout(timeout);
        }
    }

    pub fn stop_all(&mut self) {
        for session in &mut self.sessions {
            if !session.is_live() {
                continue;
            }
            if let Err(err) = session.stop() {
                warn!(thread = %session.thread_id(), %err, "stop failed");
            }
        }
    }

    /// Stream output from every session, tagged with its thread id.
    pub fn take_output(&mut self) -> Vec<(SmolStr, StreamOutput)> {
        let mut output = Vec::new();
        for session in &mut self.sessions {
            let thread: SmolStr = session.thread_id().into();
            output.extend(
                session
                    .take_output()
                    .into_iter()
                    .map(|chunk| (thread.clone(), chunk)),
            );
        }
        output
    }

    #[must_use]
    pub fn points(&self) -> &BreakpointStore {
        &self.points
    }

    /// Sessions that receive a point change: every session of the
    /// application's language that accepts commands. The current session
    /// must be one of them. Live threads that are running are queued for a
    /// resync instead.
    fn point_targets(&mut self, operation: &'static str) -> DbgpResult<Vec<usize>> {
        if let Some(index) = self.current_index() {
            let status = self.sessions[index].status();
            if !status.accepts_commands() {
                return Err(DbgpError::InvalidState { operation, status });
            }
        }
        let mut targets = Vec::new();
        for (index, session) in self.sessions.iter().enumerate() {
            if !session.language().eq_ignore_ascii_case(&self.language) {
                continue;
            }
            if session.status().accepts_commands() {
                targets.push(index);
            } else if session.is_live() {
                let thread = session.thread_id();
                if !self.unsynced.iter().any(|t| t.as_str() == thread) {
                    self.unsynced.push(thread.into());
                }
            }
        }
        Ok(targets)
    }

    fn mark_unsynced(&mut self, indices: &[usize]) {
        for &index in indices {
            let thread = self.sessions[index].thread_id();
            if !self.unsynced.iter().any(|t| t.as_str() == thread) {
                self.unsynced.push(thread.into());
            }
        }
    }

    // ---- breakpoints ----

    /// Store a breakpoint and forward it to every thread. When one thread
    /// refuses it, the threads already reached drop it again and the store
    /// is left unchanged.
    pub fn set_breakpoint(&mut self, spec: &BreakpointSpec) -> DbgpResult<Breakpoint> {
        spec.build_kind()?;
        let targets = self.point_targets("set breakpoint")?;
        let breakpoint = self.points.add_breakpoint(spec, &self.language)?;
        for (done, &index) in targets.iter().enumerate() {
            if let Err(err) = self.sessions[index].set_breakpoint(&breakpoint) {
                for &reached in &targets[..done] {
                    let session = &mut self.sessions[reached];
                    if let Err(undo) = session.remove_breakpoint(breakpoint.id) {
                        warn!(thread = %session.thread_id(), breakpoint = %breakpoint.id, %undo, "breakpoint not withdrawn");
                    }
                }
                self.points.remove_breakpoint(breakpoint.id)?;
                return Err(err);
            }
        }
        debug!(application = %self.id, breakpoint = %breakpoint.id, threads = targets.len(), "breakpoint set");
        Ok(breakpoint)
    }

    pub fn breakpoint(&self, id: BreakpointId) -> DbgpResult<&Breakpoint> {
        self.points.breakpoint(id)
    }

    pub fn enable_breakpoint(&mut self, id: BreakpointId) -> DbgpResult<Breakpoint> {
        self.change_breakpoint_state(id, BreakpointState::Enabled, "enable breakpoint")
    }

    pub fn disable_breakpoint(&mut self, id: BreakpointId) -> DbgpResult<Breakpoint> {
        self.change_breakpoint_state(id, BreakpointState::Disabled, "disable breakpoint")
    }

    fn change_breakpoint_state(
        &mut self,
        id: BreakpointId,
        state: BreakpointState,
        operation: &'static str,
    ) -> DbgpResult<Breakpoint> {
        let previous = self.points.breakpoint(id)?.state;
        let targets = self.point_targets(operation)?;
        self.points.set_breakpoint_state(id, state)?;
        for (done, &index) in targets.iter().enumerate() {
            if let Err(err) = self.sessions[index].update_breakpoint(id, state) {
                for &reached in &targets[..done] {
                    let session = &mut self.sessions[reached];
                    if let Err(undo) = session.update_breakpoint(id, previous) {
                        warn!(thread = %session.thread_id(), breakpoint = %id, %undo, "breakpoint state not restored");
                    }
                }
                self.points.set_breakpoint_state(id, previous)?;
                return Err(err);
            }
        }
        Ok(self.points.breakpoint(id)?.clone())
    }

    /// Withdraw a breakpoint from every thread, then from the store. A
    /// refusal keeps it stored; threads that already dropped it get it back
    /// on the next resync.
    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> DbgpResult<Breakpoint> {
        self.points.breakpoint(id)?;
        let targets = self.point_targets("remove breakpoint")?;
        for (done, &index) in targets.iter().enumerate() {
            if let Err(err) = self.sessions[index].remove_breakpoint(id) {
                self.mark_unsynced(&targets[..done]);
                return Err(err);
            }
        }
        self.points.remove_breakpoint(id)
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.points.breakpoints_for(&self.language)
    }

    // ---- spawnpoints ----

    pub fn set_spawnpoint(&mut self, spec: &SpawnpointSpec) -> DbgpResult<Spawnpoint> {
        let targets = self.point_targets("set spawnpoint")?;
        let spawnpoint = self.points.add_spawnpoint(spec, &self.language)?;
        for (done, &index) in targets.iter().enumerate() {
            if let Err(err) = self.sessions[index].set_spawnpoint(&spawnpoint) {
                for &reached in &targets[..done] {
                    let session = &mut self.sessions[reached];
                    if let Err(undo) = session.remove_spawnpoint(spawnpoint.id) {
                        warn!(thread = %session.thread_id(), spawnpoint = %spawnpoint.id, %undo, "spawnpoint not withdrawn");
                    }
                }
                self.points.remove_spawnpoint(spawnpoint.id)?;
                return Err(err);
            }
        }
        Ok(spawnpoint)
    }

    pub fn spawnpoint(&self, id: SpawnpointId) -> DbgpResult<&Spawnpoint> {
        self.points.spawnpoint(id)
    }

    pub fn enable_spawnpoint(&mut self, id: SpawnpointId) -> DbgpResult<Spawnpoint> {
        self.change_spawnpoint_state(id, BreakpointState::Enabled, "enable spawnpoint")
    }

    pub fn disable_spawnpoint(&mut self, id: SpawnpointId) -> DbgpResult<Spawnpoint> {
        self.change_spawnpoint_state(id, BreakpointState::Disabled, "disable spawnpoint")
    }

    fn change_spawnpoint_state(
        &mut self,
        id: SpawnpointId,
        state: BreakpointState,
        operation: &'static str,
    ) -> DbgpResult<Spawnpoint> {
        let previous = self.points.spawnpoint(id)?.state;
        let targets = self.point_targets(operation)?;
        self.points.set_spawnpoint_state(id, state)?;
        for (done, &index) in targets.iter().enumerate() {
            if let Err(err) = self.sessions[index].update_spawnpoint(id, state) {
                for &reached in &targets[..done] {
                    let session = &mut self.sessions[reached];
                    if let Err(undo) = session.update_spawnpoint(id, previous) {
                        warn!(thread = %session.thread_id(), spawnpoint = %id, %undo, "spawnpoint state not restored");
                    }
                }
                self.points.set_spawnpoint_state(id, previous)?;
                return Err(err);
            }
        }
        Ok(self.points.spawnpoint(id)?.clone())
    }

    pub fn remove_spawnpoint(&mut self, id: SpawnpointId) -> DbgpResult<Spawnpoint> {
        self.points.spawnpoint(id)?;
        let targets = self.point_targets("remove spawnpoint")?;
        for (done, &index) in targets.iter().enumerate() {
            if let Err(err) = self.sessions[index].remove_spawnpoint(id) {
                self.mark_unsynced(&targets[..done]);
                return Err(err);
            }
        }
        self.points.remove_spawnpoint(id)
    }

    pub fn spawnpoints(&self) -> impl Iterator<Item = &Spawnpoint> {
        self.points.spawnpoints_for(&self.language)
    }
}

/// Make `session` hold exactly the stored points of `language`, in their
/// stored state. Failures are logged and left for the operator.
fn reconcile(points: &BreakpointStore, language: &str, session: &mut Session) {
    let withdrawn: Vec<_> = session
        .forwarded_breakpoints()
        .filter(|id| points.breakpoint(*id).is_err())
        .collect();
    for id in withdrawn {
        if let Err(err) = session.remove_breakpoint(id) {
            warn!(thread = %session.thread_id(), breakpoint = %id, %err, "breakpoint not synced");
        }
    }
    for breakpoint in points.breakpoints_for(language) {
        let result = if session.remote_breakpoint_id(breakpoint.id).is_some() {
            session.update_breakpoint(breakpoint.id, breakpoint.state)
        } else {
            session.set_breakpoint(breakpoint).map(drop)
        };
        if let Err(err) = result {
            warn!(thread = %session.thread_id(), breakpoint = %breakpoint.id, %err, "breakpoint not synced");
        }
    }

    let withdrawn: Vec<_> = session
        .forwarded_spawnpoints()
        .filter(|id| points.spawnpoint(*id).is_err())
        .collect();
    for id in withdrawn {
        if let Err(err) = session.remove_spawnpoint(id) {
            warn!(thread = %session.thread_id(), spawnpoint = %id, %err, "spawnpoint not synced");
        }
    }
    for spawnpoint in points.spawnpoints_for(language) {
        let result = if session.remote_spawnpoint_id(spawnpoint.id).is_some() {
            session.update_spawnpoint(spawnpoint.id, spawnpoint.state)
        } else {
            session.set_spawnpoint(spawnpoint).map(drop)
        };
        if let Err(err) = result {
            warn!(thread = %session.thread_id(), spawnpoint = %spawnpoint.id, %err, "spawnpoint not synced");
        }
    }
}
