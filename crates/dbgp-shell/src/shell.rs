//! The command loop.

use std::io::{self, Write};

use dbgp_core::LineSource;
use smol_str::SmolStr;
use tracing::debug;

use crate::commands::{self, server, session, Outcome, Parsed};
use crate::context::ShellContext;
use crate::error::ShellError;
use crate::render::Printer;
use crate::style::Style;
use crate::tokenize::tokenize;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    Server,
    Session(SmolStr),
}

pub struct Shell {
    ctx: ShellContext,
    style: Style,
    scope: Scope,
}

impl Shell {
    #[must_use]
    pub fn new(ctx: ShellContext, style: Style) -> Self {
        Self {
            ctx,
            style,
            scope: Scope::Server,
        }
    }

    #[must_use]
    pub fn context(&self) -> &ShellContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ShellContext {
        &mut self.ctx
    }

    /// Application whose session scope is active.
    #[must_use]
    pub fn active_application(&self) -> Option<&str> {
        match &self.scope {
            Scope::Server => None,
            Scope::Session(app) => Some(app),
        }
    }

    #[must_use]
    pub fn prompt(&self) -> String {
        match &self.scope {
            Scope::Server => "dbg> ".to_string(),
            Scope::Session(app) => {
                let thread = self
                    .ctx
                    .registry
                    .application(app)
                    .and_then(|a| a.current_session())
                    .map(|s| SmolStr::new(s.thread_id()));
                match thread {
                    Some(thread) => format!("[dbgp-{app}:{thread}] "),
                    None => format!("[dbgp-{app}] "),
                }
            }
        }
    }

    /// Read and run commands until `quit` or end of input at the top
    /// level, then shut down. Only output failures end the loop early.
    pub fn run(&mut self, input: &mut dyn LineSource, out: &mut dyn Write) -> io::Result<()> {
        let result = self.run_loop(input, out);
        self.ctx.shutdown();
        result
    }

    fn run_loop(&mut self, input: &mut dyn LineSource, out: &mut dyn Write) -> io::Result<()> {
        loop {
            self.refresh(out)?;
            let prompt = self.prompt();
            let Some(line) = input.next_line(&prompt) else {
                if self.scope == Scope::Server {
                    return Ok(());
                }
                self.scope = Scope::Server;
                continue;
            };
            if !self.execute(&line, input, out)? {
                return Ok(());
            }
        }
    }

    /// Run one line. Returns `false` when the shell should exit.
    pub fn execute(
        &mut self,
        line: &str,
        input: &mut dyn LineSource,
        out: &mut dyn Write,
    ) -> io::Result<bool> {
        let mut printer = Printer::new(out, self.style);
        let outcome = match self.dispatch(line, input, &mut printer) {
            Ok(outcome) => outcome,
            Err(ShellError::Io(err)) => return Err(err),
            Err(err) => {
                printer.error(format!("error: {err}"))?;
                Outcome::Continue
            }
        };
        match outcome {
            Outcome::Continue => {}
            Outcome::Enter(app) => {
                debug!(application = %app, "entering session scope");
                self.scope = Scope::Session(app);
            }
            Outcome::Leave => self.scope = Scope::Server,
            Outcome::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn dispatch(
        &mut self,
        line: &str,
        input: &mut dyn LineSource,
        out: &mut Printer<'_>,
    ) -> Result<Outcome, ShellError> {
        let words = tokenize(line)?;
        if words.is_empty() {
            return Ok(Outcome::Continue);
        }
        match self.scope.clone() {
            Scope::Server => match commands::parse::<server::ServerLine>(&words)? {
                Parsed::Command(parsed) => server::dispatch(&mut self.ctx, parsed.command, out),
                Parsed::Help(text) => {
                    out.line(text)?;
                    Ok(Outcome::Continue)
                }
            },
            Scope::Session(app) => match commands::parse::<session::SessionLine>(&words)? {
                Parsed::Command(parsed) => {
                    session::dispatch(&mut self.ctx, &app, parsed.command, input, out)
                }
                Parsed::Help(text) => {
                    out.line(text)?;
                    Ok(Outcome::Continue)
                }
            },
        }
    }

    /// Take in new connections, reap finished continuations, show debuggee
    /// output and drop what has ended.
    fn refresh(&mut self, out: &mut dyn Write) -> io::Result<()> {
        let mut printer = Printer::new(out, self.style);
        let registry = &mut self.ctx.registry;
        for info in registry.accept_pending() {
            printer.accent(format!(
                "attached {}:{} ({})",
                info.application_id, info.thread_id, info.language
            ))?;
        }
        registry.poll();
        let ids: Vec<SmolStr> = registry
            .applications()
            .map(|app| SmolStr::new(app.id()))
            .collect();
        for id in &ids {
            let Some(app) = registry.application_mut(id) else {
                continue;
            };
            for (_, chunk) in app.take_output() {
                printer.stream(&chunk)?;
            }
            for info in app.prune() {
                printer.warning(format!(
                    "session {}:{} ended",
                    info.application_id, info.thread_id
                ))?;
            }
        }
        for id in registry.prune() {
            printer.warning(format!("application {id} has no sessions left"))?;
            if self.scope == Scope::Session(id) {
                self.scope = Scope::Server;
            }
        }
        self.ctx.forget_missing();
        Ok(())
    }
}
