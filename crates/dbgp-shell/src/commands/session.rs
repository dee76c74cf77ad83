//! Session scope: execution control, inspection and breakpoints for the
//! threads of one application.

use std::io;

use clap::{Args, Parser, Subcommand};
use dbgp_core::protocol::PropertyQuery;
use dbgp_core::{
    run_dialogue, Application, BreakpointId, BreakpointSpec, BreakpointState, BreakpointType,
    HitCondition, LineSource, ResumeMode, Session, SessionLink, SessionStatus, SpawnpointId,
    SpawnpointSpec, StreamKind, StreamMode,
};

use super::{help_table, Outcome};
use crate::context::ShellContext;
use crate::error::{ShellError, ShellResult};
use crate::render::{self, Printer};

#[derive(Debug, Parser)]
#[command(name = "dbgp", multicall = true, disable_help_subcommand = true)]
pub struct SessionLine {
    #[command(subcommand)]
    pub command: SessionCommand,
}

fn parse_type(text: &str) -> Result<BreakpointType, String> {
    BreakpointType::parse(text).map_err(|err| err.to_string())
}

fn parse_state(text: &str) -> Result<BreakpointState, String> {
    BreakpointState::parse(text).map_err(|err| err.to_string())
}

fn parse_hit_condition(text: &str) -> Result<HitCondition, String> {
    HitCondition::parse(text).map_err(|err| err.to_string())
}

#[derive(Debug, Args)]
pub struct BreakpointArgs {
    /// line, conditional, watch, exception, call or return.
    #[arg(short = 't', value_parser = parse_type)]
    pub kind: BreakpointType,
    #[arg(short = 's', default_value = "enabled", value_parser = parse_state)]
    pub state: BreakpointState,
    #[arg(short = 'f')]
    pub file: Option<String>,
    #[arg(short = 'n')]
    pub line: Option<u32>,
    #[arg(short = 'm')]
    pub function: Option<String>,
    #[arg(short = 'x')]
    pub exception: Option<String>,
    /// Condition or watch expression.
    #[arg(short = 'c')]
    pub expression: Option<String>,
    /// Hit count.
    #[arg(short = 'h')]
    pub hit_value: Option<u32>,
    /// >=, == or %.
    #[arg(short = 'o', value_parser = parse_hit_condition)]
    pub hit_condition: Option<HitCondition>,
    /// 1 removes the breakpoint after its first hit.
    #[arg(short = 'r', default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub temporary: u8,
    /// Expression given after `--`.
    #[arg(allow_hyphen_values = true)]
    pub data: Option<String>,
}

impl BreakpointArgs {
    fn into_spec(self) -> BreakpointSpec {
        let mut spec = BreakpointSpec::new(self.kind);
        spec.state = self.state;
        spec.filename = self.file.map(Into::into);
        spec.lineno = self.line;
        spec.function = self.function.map(Into::into);
        spec.exception = self.exception.map(Into::into);
        spec.expression = self.expression.or(self.data);
        spec.hit_value = self.hit_value;
        spec.hit_condition = self.hit_condition;
        spec.temporary = self.temporary == 1;
        spec
    }
}

#[derive(Debug, Args)]
pub struct PropertyTarget {
    /// Full property name.
    #[arg(short = 'n')]
    pub name: String,
    /// Stack depth.
    #[arg(short = 'd')]
    pub depth: Option<u32>,
    /// Context id.
    #[arg(short = 'c')]
    pub context: Option<u32>,
}

impl PropertyTarget {
    fn query(self) -> PropertyQuery {
        let mut query = PropertyQuery::new(self.name);
        query.depth = self.depth;
        query.context_id = self.context;
        query
    }
}

#[derive(Debug, Args)]
pub struct PointRef {
    /// Id shown by the matching `_list` command.
    #[arg(short = 'd')]
    pub id: u32,
}

#[derive(Debug, Subcommand)]
#[command(rename_all = "snake_case")]
pub enum SessionCommand {
    /// List the application's threads.
    Threads,
    /// Show or select the current thread.
    #[command(visible_alias = "select")]
    Thread { id: Option<String> },
    /// Stop the current thread.
    Stop,
    /// Detach from the current thread and let it run.
    Detach,
    /// Return to the top level.
    #[command(visible_aliases = ["exit", "q"])]
    Quit,
    /// Run to the next breakpoint.
    Run,
    /// Step into the next statement.
    #[command(visible_alias = "step_into")]
    Step,
    /// Step over the next statement.
    StepOver,
    /// Run until the current function returns.
    StepOut,
    /// Interrupt a running thread.
    Break,
    /// Ask the debuggee for its status.
    Status,
    /// Query a debugger feature.
    FeatureGet {
        #[arg(short = 'n')]
        name: String,
    },
    /// Change a debugger feature.
    FeatureSet {
        #[arg(short = 'n')]
        name: String,
        #[arg(short = 'v')]
        value: String,
    },
    /// Number of stack frames.
    StackDepth,
    /// Show the stack, or one frame with `-d`.
    StackGet {
        #[arg(short = 'd')]
        depth: Option<u32>,
    },
    /// List variable contexts.
    ContextNames {
        #[arg(short = 'd', default_value_t = 0)]
        depth: u32,
    },
    /// Show the variables of a context.
    ContextGet {
        #[arg(short = 'c', default_value_t = 0)]
        context: u32,
        #[arg(short = 'd', default_value_t = 0)]
        depth: u32,
    },
    /// Show the language type map.
    TypeMap,
    /// Evaluate an expression.
    Eval {
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true, trailing_var_arg = true)]
        code: Vec<String>,
    },
    /// Show source lines.
    Source {
        #[arg(short = 'f')]
        file: Option<String>,
        #[arg(short = 'b')]
        begin: Option<u32>,
        #[arg(short = 'e')]
        end: Option<u32>,
    },
    /// Show a property.
    PropertyGet {
        #[command(flatten)]
        target: PropertyTarget,
        /// Maximum data length.
        #[arg(short = 'm')]
        max_data: Option<u32>,
        #[arg(short = 't')]
        data_type: Option<String>,
        /// Page of children.
        #[arg(short = 'p')]
        page: Option<u32>,
    },
    /// Assign a property.
    PropertySet {
        #[command(flatten)]
        target: PropertyTarget,
        #[arg(short = 't')]
        data_type: Option<String>,
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true, trailing_var_arg = true)]
        value: Vec<String>,
    },
    /// Show a property's value only.
    PropertyValue(PropertyTarget),
    /// Set a breakpoint.
    #[command(disable_help_flag = true)]
    BreakpointSet(BreakpointArgs),
    /// Show a breakpoint.
    BreakpointGet(PointRef),
    BreakpointEnable(PointRef),
    BreakpointDisable(PointRef),
    BreakpointRemove(PointRef),
    /// List breakpoints.
    BreakpointList,
    /// Set a spawnpoint.
    SpawnpointSet {
        #[arg(short = 'f')]
        file: String,
        #[arg(short = 'n')]
        line: u32,
        #[arg(short = 's', default_value = "enabled", value_parser = parse_state)]
        state: BreakpointState,
    },
    /// Show a spawnpoint.
    SpawnpointGet(PointRef),
    SpawnpointEnable(PointRef),
    SpawnpointDisable(PointRef),
    SpawnpointRemove(PointRef),
    /// List spawnpoints.
    SpawnpointList,
    /// Share debuggee stdout: 0 off, 1 copy, 2 redirect.
    Stdout {
        #[arg(short = 'c', default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
        mode: u8,
    },
    /// Share debuggee stderr: 0 off, 1 copy, 2 redirect.
    Stderr {
        #[arg(short = 'c', default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
        mode: u8,
    },
    /// Send one line to the debuggee's interactive interpreter.
    Interact {
        #[arg(num_args = 0.., allow_hyphen_values = true, trailing_var_arg = true)]
        code: Vec<String>,
    },
    /// Talk to the interactive interpreter until end of input.
    Interactive,
    /// List commands.
    Help,
}

pub fn dispatch(
    ctx: &mut ShellContext,
    app_id: &str,
    command: SessionCommand,
    input: &mut dyn LineSource,
    out: &mut Printer<'_>,
) -> ShellResult<Outcome> {
    let app = ctx.application_mut(app_id)?;
    match command {
        SessionCommand::Threads => {
            let current = app.current_session().map(Session::thread_id);
            let lines: Vec<_> = app
                .sessions()
                .iter()
                .map(|s| render::session_line(s, current == Some(s.thread_id())))
                .collect();
            out.lines(lines)?;
        }
        SessionCommand::Thread { id: None } => {
            let session = app.require_current()?;
            out.line(render::session_line(session, true))?;
        }
        SessionCommand::Thread { id: Some(id) } => {
            let session = app.select_session(&id)?;
            out.success(format!("current thread is {}", session.thread_id()))?;
        }
        SessionCommand::Stop => {
            let session = app.require_current()?;
            session.stop()?;
            out.success(format!("stopped {}", session.thread_id()))?;
            return Ok(leave_when_idle(app));
        }
        SessionCommand::Detach => {
            let session = app.require_current()?;
            session.detach()?;
            out.success(format!("detached from {}", session.thread_id()))?;
            return Ok(leave_when_idle(app));
        }
        SessionCommand::Quit => return Ok(Outcome::Leave),
        SessionCommand::Run => resume(app.require_current()?, ResumeMode::Go, out)?,
        SessionCommand::Step => resume(app.require_current()?, ResumeMode::StepIn, out)?,
        SessionCommand::StepOver => resume(app.require_current()?, ResumeMode::StepOver, out)?,
        SessionCommand::StepOut => resume(app.require_current()?, ResumeMode::StepOut, out)?,
        SessionCommand::Break => {
            let session = app.require_current()?;
            session.break_now()?;
            report_stop(session, out)?;
        }
        SessionCommand::Status => {
            let session = app.require_current()?;
            let status = session.update_status()?;
            out.line(format!(
                "{} {}",
                session.thread_id(),
                render::status_text(status, session.reason())
            ))?;
        }
        SessionCommand::FeatureGet { name } => {
            let feature = app.require_current()?.feature_get(&name)?;
            out.line(render::feature(&feature))?;
        }
        SessionCommand::FeatureSet { name, value } => {
            if app.require_current()?.feature_set(&name, &value)? {
                out.success(format!("{name} = {value}"))?;
            } else {
                out.warning(format!("{name} was not changed"))?;
            }
        }
        SessionCommand::StackDepth => {
            let depth = app.require_current()?.stack_depth()?;
            out.line(format!("stack depth: {depth}"))?;
        }
        SessionCommand::StackGet { depth } => {
            // -d 0 asks for the whole stack.
            let frames = app
                .require_current()?
                .stack_get(depth.filter(|level| *level > 0))?;
            out.lines(frames.iter().map(render::frame))?;
        }
        SessionCommand::ContextNames { depth } => {
            let names = app.require_current()?.context_names(depth)?;
            out.lines(names.iter().map(render::context_name))?;
        }
        SessionCommand::ContextGet { context, depth } => {
            let properties = app.require_current()?.context_get(context, depth)?;
            if properties.is_empty() {
                out.line("no variables")?;
            }
            out.lines(properties.iter().flat_map(render::property))?;
        }
        SessionCommand::TypeMap => {
            let entries = app.require_current()?.type_map()?;
            out.lines(entries.iter().map(render::type_map_entry))?;
        }
        SessionCommand::Eval { code } => {
            let property = app.require_current()?.eval(&code.join(" "))?;
            out.lines(render::property(&property))?;
        }
        SessionCommand::Source { file, begin, end } => {
            let text = app
                .require_current()?
                .source(file.as_deref(), begin, end)?;
            out.lines(render::source(&text, begin.unwrap_or(1).max(1)))?;
        }
        SessionCommand::PropertyGet {
            target,
            max_data,
            data_type,
            page,
        } => {
            let mut query = target.query();
            query.max_data = max_data;
            query.data_type = data_type.map(Into::into);
            query.page = page;
            let property = app.require_current()?.property_get(query)?;
            out.lines(render::property(&property))?;
        }
        SessionCommand::PropertySet {
            target,
            data_type,
            value,
        } => {
            let mut query = target.query();
            query.data_type = data_type.map(Into::into);
            let name = query.fullname.clone();
            let value = value.join(" ");
            if app.require_current()?.property_set(query, &value)? {
                out.success(format!("{name} = {value}"))?;
            } else {
                out.warning(format!("{name} was not changed"))?;
            }
        }
        SessionCommand::PropertyValue(target) => {
            let value = app.require_current()?.property_value(target.query())?;
            out.line(value)?;
        }
        SessionCommand::BreakpointSet(args) => {
            let breakpoint = app.set_breakpoint(&args.into_spec())?;
            out.success(format!("set {breakpoint}"))?;
        }
        SessionCommand::BreakpointGet(point) => {
            out.line(app.breakpoint(BreakpointId(point.id))?.to_string())?;
        }
        SessionCommand::BreakpointEnable(point) => {
            let breakpoint = app.enable_breakpoint(BreakpointId(point.id))?;
            out.success(breakpoint.to_string())?;
        }
        SessionCommand::BreakpointDisable(point) => {
            let breakpoint = app.disable_breakpoint(BreakpointId(point.id))?;
            out.success(breakpoint.to_string())?;
        }
        SessionCommand::BreakpointRemove(point) => {
            let breakpoint = app.remove_breakpoint(BreakpointId(point.id))?;
            out.success(format!("removed breakpoint {}", breakpoint.id))?;
        }
        SessionCommand::BreakpointList => {
            let lines: Vec<_> = app.breakpoints().map(ToString::to_string).collect();
            if lines.is_empty() {
                out.line("no breakpoints")?;
            }
            out.lines(lines)?;
        }
        SessionCommand::SpawnpointSet { file, line, state } => {
            let mut spec = SpawnpointSpec::new(file, line);
            spec.state = state;
            let spawnpoint = app.set_spawnpoint(&spec)?;
            out.success(format!("set {spawnpoint}"))?;
        }
        SessionCommand::SpawnpointGet(point) => {
            out.line(app.spawnpoint(SpawnpointId(point.id))?.to_string())?;
        }
        SessionCommand::SpawnpointEnable(point) => {
            let spawnpoint = app.enable_spawnpoint(SpawnpointId(point.id))?;
            out.success(spawnpoint.to_string())?;
        }
        SessionCommand::SpawnpointDisable(point) => {
            let spawnpoint = app.disable_spawnpoint(SpawnpointId(point.id))?;
            out.success(spawnpoint.to_string())?;
        }
        SessionCommand::SpawnpointRemove(point) => {
            let spawnpoint = app.remove_spawnpoint(SpawnpointId(point.id))?;
            out.success(format!("removed spawnpoint {}", spawnpoint.id))?;
        }
        SessionCommand::SpawnpointList => {
            let lines: Vec<_> = app.spawnpoints().map(ToString::to_string).collect();
            if lines.is_empty() {
                out.line("no spawnpoints")?;
            }
            out.lines(lines)?;
        }
        SessionCommand::Stdout { mode } => redirect(app, StreamKind::Stdout, mode, out)?,
        SessionCommand::Stderr { mode } => redirect(app, StreamKind::Stderr, mode, out)?,
        SessionCommand::Interact { code } => {
            let session = app.require_current()?;
            let id = session.interact(Some(&code.join(" ")))?;
            let prompt = session.wait_response(id, session.response_timeout())?;
            for chunk in session.take_output() {
                out.stream(&chunk)?;
            }
            let more = if prompt.more { " (continuation)" } else { "" };
            out.line(format!("prompt '{}'{more}", prompt.prompt))?;
        }
        SessionCommand::Interactive => {
            let session = app.require_current()?;
            let mut dialogue = Dialogue {
                input,
                link: session.link().clone(),
                out,
                failed: None,
            };
            let result = run_dialogue(session, &mut dialogue);
            if let Some(err) = dialogue.failed.take() {
                return Err(ShellError::Io(err));
            }
            let sent = result?;
            out.line("")?;
            out.line(format!("left interactive mode after {sent} lines"))?;
        }
        SessionCommand::Help => out.lines(help_table::<SessionLine>())?,
    }
    Ok(Outcome::Continue)
}

fn leave_when_idle(app: &Application) -> Outcome {
    if app.session_count() == 0 {
        Outcome::Leave
    } else {
        Outcome::Continue
    }
}

fn resume(session: &mut Session, mode: ResumeMode, out: &mut Printer<'_>) -> ShellResult<()> {
    session.resume(mode)?;
    report_stop(session, out)
}

/// Wait for the last resume to settle and say where the thread ended up.
fn report_stop(session: &mut Session, out: &mut Printer<'_>) -> ShellResult<()> {
    let status = session.wait_for_stop(session.response_timeout())?;
    match status {
        SessionStatus::Break => {
            let frames = session.stack_get(Some(0))?;
            match frames.first() {
                Some(top) => out.accent(format!("break at {}", render::frame(top)))?,
                None => out.accent("break")?,
            }
        }
        SessionStatus::Running => out.line(format!("{} is running", session.thread_id()))?,
        other => out.line(format!(
            "{} {}",
            session.thread_id(),
            render::status_text(other, session.reason())
        ))?,
    }
    Ok(())
}

fn redirect(
    app: &mut Application,
    kind: StreamKind,
    code: u8,
    out: &mut Printer<'_>,
) -> ShellResult<()> {
    let mode = StreamMode::from_code(code)?;
    if app.require_current()?.redirect(kind, mode)? {
        out.success(format!("{kind} mode set to {code}"))?;
    } else {
        out.warning(format!("{kind} mode was not changed"))?;
    }
    Ok(())
}

/// Line source for `interactive` that shows debuggee output before each
/// prompt.
struct Dialogue<'i, 'p, 'o> {
    input: &'i mut dyn LineSource,
    link: SessionLink,
    out: &'p mut Printer<'o>,
    failed: Option<io::Error>,
}

impl LineSource for Dialogue<'_, '_, '_> {
    fn next_line(&mut self, prompt: &str) -> Option<String> {
        if self.failed.is_some() {
            return None;
        }
        for chunk in self.link.take_output() {
            if let Err(err) = self.out.stream(&chunk) {
                self.failed = Some(err);
                return None;
            }
        }
        self.input.next_line(prompt)
    }
}
