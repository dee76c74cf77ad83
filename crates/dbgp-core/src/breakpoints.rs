//! Breakpoint and spawnpoint records plus their id-keyed store.

use std::fmt;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{DbgpError, DbgpResult, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpawnpointId(pub u32);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SpawnpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakpointState {
    #[default]
    Enabled,
    Disabled,
}

impl BreakpointState {
    pub fn parse(text: &str) -> DbgpResult<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            _ => Err(DbgpError::validation(format!("invalid state '{text}'"))),
        }
    }
}

impl fmt::Display for BreakpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        })
    }
}

/// How `hit_value` is compared against the debuggee's hit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HitCondition {
    /// Break once the hit count reaches the value.
    #[default]
    AtLeast,
    /// Break only when the hit count equals the value.
    Equal,
    /// Break when the hit count is a multiple of the value.
    Multiple,
}

impl HitCondition {
    pub fn parse(text: &str) -> DbgpResult<Self> {
        match text.trim() {
            ">=" => Ok(Self::AtLeast),
            "==" => Ok(Self::Equal),
            "%" => Ok(Self::Multiple),
            _ => Err(DbgpError::validation(format!(
                "invalid hit condition '{text}' (expected >=, == or %)"
            ))),
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::AtLeast => ">=",
            Self::Equal => "==",
            Self::Multiple => "%",
        }
    }
}

/// Breakpoint type tag as typed by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointType {
    Line,
    Conditional,
    Watch,
    Exception,
    Call,
    Return,
}

impl BreakpointType {
    pub fn parse(text: &str) -> DbgpResult<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "line" => Ok(Self::Line),
            "conditional" => Ok(Self::Conditional),
            "watch" => Ok(Self::Watch),
            "exception" => Ok(Self::Exception),
            "call" => Ok(Self::Call),
            "return" => Ok(Self::Return),
            _ => Err(DbgpError::validation(format!(
                "invalid breakpoint type '{text}'"
            ))),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Conditional => "conditional",
            Self::Watch => "watch",
            Self::Exception => "exception",
            Self::Call => "call",
            Self::Return => "return",
        }
    }
}

/// Breakpoint kinds, each carrying exactly the fields it uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointKind {
    Line {
        filename: SmolStr,
        lineno: u32,
    },
    Conditional {
        expression: String,
        filename: Option<SmolStr>,
        lineno: Option<u32>,
    },
    Watch {
        expression: String,
        filename: Option<SmolStr>,
        lineno: Option<u32>,
    },
    Exception {
        exception: SmolStr,
    },
    Call {
        function: SmolStr,
        filename: Option<SmolStr>,
    },
    Return {
        function: SmolStr,
        filename: Option<SmolStr>,
    },
}

impl BreakpointKind {
    #[must_use]
    pub fn breakpoint_type(&self) -> BreakpointType {
        match self {
            Self::Line { .. } => BreakpointType::Line,
            Self::Conditional { .. } => BreakpointType::Conditional,
            Self::Watch { .. } => BreakpointType::Watch,
            Self::Exception { .. } => BreakpointType::Exception,
            Self::Call { .. } => BreakpointType::Call,
            Self::Return { .. } => BreakpointType::Return,
        }
    }
}

impl fmt::Display for BreakpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line { filename, lineno } => write!(f, "line {filename}:{lineno}"),
            Self::Conditional {
                expression,
                filename,
                lineno,
            }
            | Self::Watch {
                expression,
                filename,
                lineno,
            } => {
                write!(f, "{} `{expression}`", self.breakpoint_type().as_str())?;
                match (filename, lineno) {
                    (Some(file), Some(line)) => write!(f, " at {file}:{line}"),
                    (Some(file), None) => write!(f, " in {file}"),
                    _ => Ok(()),
                }
            }
            Self::Exception { exception } => write!(f, "exception {exception}"),
            Self::Call { function, filename } | Self::Return { function, filename } => {
                write!(f, "{} {function}", self.breakpoint_type().as_str())?;
                if let Some(file) = filename {
                    write!(f, " in {file}")?;
                }
                Ok(())
            }
        }
    }
}

/// Loose field bundle collected from operator input.
///
/// `build_kind` checks that the fields required by the chosen type are
/// present; everything else is carried along as optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSpec {
    pub breakpoint_type: BreakpointType,
    pub state: BreakpointState,
    pub filename: Option<SmolStr>,
    pub lineno: Option<u32>,
    pub function: Option<SmolStr>,
    pub exception: Option<SmolStr>,
    pub expression: Option<String>,
    pub hit_value: Option<u32>,
    pub hit_condition: Option<HitCondition>,
    pub temporary: bool,
}

impl BreakpointSpec {
    #[must_use]
    pub fn new(breakpoint_type: BreakpointType) -> Self {
        Self {
            breakpoint_type,
            state: BreakpointState::Enabled,
            filename: None,
            lineno: None,
            function: None,
            exception: None,
            expression: None,
            hit_value: None,
            hit_condition: None,
            temporary: false,
        }
    }

    #[must_use]
    pub fn line(filename: impl Into<SmolStr>, lineno: u32) -> Self {
        let mut spec = Self::new(BreakpointType::Line);
        spec.filename = Some(filename.into());
        spec.lineno = Some(lineno);
        spec
    }

    /// Build the typed kind, failing when a required field is absent.
    pub fn build_kind(&self) -> DbgpResult<BreakpointKind> {
        let kind_name = self.breakpoint_type.as_str();
        let filename = non_empty(self.filename.as_ref());
        let lineno = match self.lineno {
            Some(0) => {
                return Err(DbgpError::validation(
                    "line numbers start at 1 (got 0)",
                ))
            }
            other => other,
        };
        let missing = |field: &str| {
            DbgpError::validation(format!("{kind_name} breakpoint requires {field}"))
        };
        let kind = match self.breakpoint_type {
            BreakpointType::Line => BreakpointKind::Line {
                filename: filename.ok_or_else(|| missing("a filename"))?,
                lineno: lineno.ok_or_else(|| missing("a line number"))?,
            },
            BreakpointType::Conditional => BreakpointKind::Conditional {
                expression: self.expression_field().ok_or_else(|| missing("an expression"))?,
                filename,
                lineno,
            },
            BreakpointType::Watch => BreakpointKind::Watch {
                expression: self.expression_field().ok_or_else(|| missing("an expression"))?,
                filename,
                lineno,
            },
            BreakpointType::Exception => BreakpointKind::Exception {
                exception: non_empty(self.exception.as_ref())
                    .ok_or_else(|| missing("an exception name"))?,
            },
            BreakpointType::Call => BreakpointKind::Call {
                function: non_empty(self.function.as_ref())
                    .ok_or_else(|| missing("a function name"))?,
                filename,
            },
            BreakpointType::Return => BreakpointKind::Return {
                function: non_empty(self.function.as_ref())
                    .ok_or_else(|| missing("a function name"))?,
                filename,
            },
        };
        if self.hit_condition.is_some() && self.hit_value.is_none() {
            return Err(DbgpError::validation(
                "a hit condition requires a hit value",
            ));
        }
        Ok(kind)
    }

    fn expression_field(&self) -> Option<String> {
        self.expression
            .as_ref()
            .filter(|text| !text.trim().is_empty())
            .cloned()
    }
}

fn non_empty(value: Option<&SmolStr>) -> Option<SmolStr> {
    value.filter(|text| !text.trim().is_empty()).cloned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub kind: BreakpointKind,
    pub state: BreakpointState,
    /// Removed by the debuggee after the first hit.
    pub temporary: bool,
    pub hit_value: Option<u32>,
    pub hit_condition: Option<HitCondition>,
    pub language: SmolStr,
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "breakpoint {} [{}] {}", self.id, self.state, self.kind)?;
        if let Some(value) = self.hit_value {
            let condition = self.hit_condition.unwrap_or_default();
            write!(f, " hit {} {value}", condition.symbol())?;
        }
        if self.temporary {
            f.write_str(" (temporary)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnpointSpec {
    pub filename: Option<SmolStr>,
    pub lineno: Option<u32>,
    pub state: BreakpointState,
}

impl SpawnpointSpec {
    #[must_use]
    pub fn new(filename: impl Into<SmolStr>, lineno: u32) -> Self {
        Self {
            filename: Some(filename.into()),
            lineno: Some(lineno),
            state: BreakpointState::Enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spawnpoint {
    pub id: SpawnpointId,
    pub filename: SmolStr,
    pub lineno: u32,
    pub state: BreakpointState,
    pub language: SmolStr,
}

impl fmt::Display for Spawnpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "spawnpoint {} [{}] {}:{}",
            self.id, self.state, self.filename, self.lineno
        )
    }
}

/// Id-keyed records with a counter that never goes backwards.
#[derive(Debug, Clone)]
struct PointTable<T> {
    kind: EntityKind,
    next_id: u32,
    entries: IndexMap<u32, T>,
}

impl<T> PointTable<T> {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            next_id: 1,
            entries: IndexMap::new(),
        }
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn get(&self, id: u32) -> DbgpResult<&T> {
        self.entries
            .get(&id)
            .ok_or_else(|| DbgpError::not_found(self.kind, id))
    }

    fn get_mut(&mut self, id: u32) -> DbgpResult<&mut T> {
        let kind = self.kind;
        self.entries
            .get_mut(&id)
            .ok_or_else(|| DbgpError::not_found(kind, id))
    }

    fn remove(&mut self, id: u32) -> DbgpResult<T> {
        self.entries
            .shift_remove(&id)
            .ok_or_else(|| DbgpError::not_found(self.kind, id))
    }
}

/// Breakpoints and spawnpoints of one application.
///
/// Pure bookkeeping: nothing here talks to a debuggee.
#[derive(Debug, Clone)]
pub struct BreakpointStore {
    breakpoints: PointTable<Breakpoint>,
    spawnpoints: PointTable<Spawnpoint>,
}

impl Default for BreakpointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            breakpoints: PointTable::new(EntityKind::Breakpoint),
            spawnpoints: PointTable::new(EntityKind::Spawnpoint),
        }
    }

    /// Validate and store a breakpoint. Nothing is stored on failure.
    pub fn add_breakpoint(
        &mut self,
        spec: &BreakpointSpec,
        language: &str,
    ) -> DbgpResult<Breakpoint> {
        let kind = spec.build_kind()?;
        let id = BreakpointId(self.breakpoints.allocate());
        let breakpoint = Breakpoint {
            id,
            kind,
            state: spec.state,
            temporary: spec.temporary,
            hit_value: spec.hit_value,
            hit_condition: spec.hit_value.map(|_| spec.hit_condition.unwrap_or_default()),
            language: language.into(),
        };
        self.breakpoints.entries.insert(id.0, breakpoint.clone());
        Ok(breakpoint)
    }

    pub fn breakpoint(&self, id: BreakpointId) -> DbgpResult<&Breakpoint> {
        self.breakpoints.get(id.0)
    }

    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> DbgpResult<Breakpoint> {
        self.breakpoints.remove(id.0)
    }

    pub fn enable_breakpoint(&mut self, id: BreakpointId) -> DbgpResult<&Breakpoint> {
        self.set_breakpoint_state(id, BreakpointState::Enabled)
    }

    pub fn disable_breakpoint(&mut self, id: BreakpointId) -> DbgpResult<&Breakpoint> {
        self.set_breakpoint_state(id, BreakpointState::Disabled)
    }

    pub fn set_breakpoint_state(
        &mut self,
        id: BreakpointId,
        state: BreakpointState,
    ) -> DbgpResult<&Breakpoint> {
        let entry = self.breakpoints.get_mut(id.0)?;
        entry.state = state;
        Ok(entry)
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.entries.values()
    }

    pub fn breakpoints_for<'a>(
        &'a self,
        language: &'a str,
    ) -> impl Iterator<Item = &'a Breakpoint> + 'a {
        self.breakpoints()
            .filter(move |bp| bp.language.eq_ignore_ascii_case(language))
    }

    pub fn add_spawnpoint(
        &mut self,
        spec: &SpawnpointSpec,
        language: &str,
    ) -> DbgpResult<Spawnpoint> {
        let filename = non_empty(spec.filename.as_ref())
            .ok_or_else(|| DbgpError::validation("spawnpoint requires a filename"))?;
        let lineno = match spec.lineno {
            None => return Err(DbgpError::validation("spawnpoint requires a line number")),
            Some(0) => return Err(DbgpError::validation("line numbers start at 1 (got 0)")),
            Some(line) => line,
        };
        let id = SpawnpointId(self.spawnpoints.allocate());
        let spawnpoint = Spawnpoint {
            id,
            filename,
            lineno,
            state: spec.state,
            language: language.into(),
        };
        self.spawnpoints.entries.insert(id.0, spawnpoint.clone());
        Ok(spawnpoint)
    }

    pub fn spawnpoint(&self, id: SpawnpointId) -> DbgpResult<&Spawnpoint> {
        self.spawnpoints.get(id.0)
    }

    pub fn remove_spawnpoint(&mut self, id: SpawnpointId) -> DbgpResult<Spawnpoint> {
        self.spawnpoints.remove(id.0)
    }

    pub fn enable_spawnpoint(&mut self, id: SpawnpointId) -> DbgpResult<&Spawnpoint> {
        self.set_spawnpoint_state(id, BreakpointState::Enabled)
    }

    pub fn disable_spawnpoint(&mut self, id: SpawnpointId) -> DbgpResult<&Spawnpoint> {
        self.set_spawnpoint_state(id, BreakpointState::Disabled)
    }

    pub fn set_spawnpoint_state(
        &mut self,
        id: SpawnpointId,
        state: BreakpointState,
    ) -> DbgpResult<&Spawnpoint> {
        let entry = self.spawnpoints.get_mut(id.0)?;
        entry.state = state;
        Ok(entry)
    }

    pub fn spawnpoints(&self) -> impl Iterator<Item = &Spawnpoint> {
        self.spawnpoints.entries.values()
    }

    pub fn spawnpoints_for<'a>(
        &'a self,
        language: &'a str,
    ) -> impl Iterator<Item = &'a Spawnpoint> + 'a {
        self.spawnpoints()
            .filter(move |sp| sp.language.eq_ignore_ascii_case(language))
    }
}
