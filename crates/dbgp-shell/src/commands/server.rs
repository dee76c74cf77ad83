//! Top-level scope: connection management and application selection.

use std::net::SocketAddr;

use clap::{Parser, Subcommand, ValueEnum};
use dbgp_core::{ConnectionManager, ProxyConfig};

use super::{help_table, Outcome};
use crate::config::{default_proxy_key, Endpoint, DEFAULT_HOST};
use crate::context::ShellContext;
use crate::error::ShellResult;
use crate::logging::LogLevel;
use crate::render::{self, Printer};

/// Port debuggers connect to when none is given.
pub const DEFAULT_PORT: u16 = 9000;

#[derive(Debug, Parser)]
#[command(name = "dbg", multicall = true, disable_help_subcommand = true)]
pub struct ServerLine {
    #[command(subcommand)]
    pub command: ServerCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListenAction {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StopScope {
    All,
}

#[derive(Debug, Subcommand)]
#[command(rename_all = "snake_case")]
pub enum ServerCommand {
    /// Show or set the key debuggees must present.
    Key { key: Option<String> },
    /// Start or stop listening for debuggers.
    ///
    /// Without `-p`, `start` uses the configured listen address, else
    /// 127.0.0.1:9000.
    Listen {
        /// Address to listen on; defaults to the configured address, else 127.0.0.1:9000.
        #[arg(short = 'p', value_name = "[HOST:]PORT", value_parser = Endpoint::parse)]
        address: Option<Endpoint>,
        #[arg(value_enum)]
        action: ListenAction,
    },
    /// Register with a DBGP proxy.
    Proxyinit {
        /// Accept several sessions for the key.
        #[arg(short = 'M')]
        multiple: bool,
        #[arg(value_name = "[HOST:]PORT", value_parser = Endpoint::parse)]
        address: Endpoint,
    },
    /// Leave the proxy.
    Proxystop,
    /// List attached applications.
    Sessions,
    /// Select an application and work with its threads.
    #[command(visible_alias = "select")]
    Session { id: Option<String> },
    /// Stop the current thread of the selected application, or everything.
    Stop {
        #[arg(value_enum)]
        scope: Option<StopScope>,
    },
    /// Show or change the log level.
    #[command(visible_alias = "loglevel")]
    Errorlevel {
        #[arg(value_parser = LogLevel::parse)]
        level: Option<LogLevel>,
    },
    /// List commands.
    Help,
    /// Stop everything and exit.
    #[command(visible_aliases = ["exit", "q"])]
    Quit,
}

/// What the operator is told once `addr` is up.
#[must_use]
pub fn listener_message(manager: &dyn ConnectionManager, addr: SocketAddr) -> String {
    if manager.is_simulated() {
        format!("simulated listener on {addr} (no socket bound)")
    } else {
        format!("listening on {addr}")
    }
}

pub fn dispatch(
    ctx: &mut ShellContext,
    command: ServerCommand,
    out: &mut Printer<'_>,
) -> ShellResult<Outcome> {
    match command {
        ServerCommand::Key { key: None } => match ctx.manager.key() {
            Some(key) => out.line(format!("server key: {key}"))?,
            None => out.line("no server key")?,
        },
        ServerCommand::Key { key: Some(key) } => {
            let key = key.trim();
            if key.is_empty() {
                ctx.manager.set_key(None);
                out.success("server key cleared")?;
            } else {
                ctx.manager.set_key(Some(key.into()));
                out.success(format!("server key set to {key}"))?;
            }
        }
        ServerCommand::Listen {
            address,
            action: ListenAction::Start,
        } => {
            let endpoint = address
                .or_else(|| ctx.config.listen.clone())
                .unwrap_or(Endpoint {
                    host: DEFAULT_HOST.into(),
                    port: DEFAULT_PORT,
                });
            let addr = ctx.manager.listen(&endpoint.host, endpoint.port)?;
            out.success(listener_message(ctx.manager.as_ref(), addr))?;
        }
        ServerCommand::Listen {
            action: ListenAction::Stop,
            ..
        } => {
            ctx.manager.stop_listening()?;
            out.success("stopped listening")?;
        }
        ServerCommand::Proxyinit { multiple, address } => {
            let key = ctx.manager.key().unwrap_or_else(default_proxy_key);
            let proxy = ProxyConfig {
                host: address.host,
                port: address.port,
                key,
                multiple_sessions: multiple,
            };
            let message = format!(
                "registered with proxy {}:{} as '{}'",
                proxy.host, proxy.port, proxy.key
            );
            ctx.manager.set_proxy(Some(proxy))?;
            out.success(message)?;
        }
        ServerCommand::Proxystop => {
            ctx.manager.set_proxy(None)?;
            out.success("left proxy")?;
        }
        ServerCommand::Sessions => {
            if ctx.registry.is_empty() {
                out.line("no applications attached")?;
            }
            let current = ctx.current_app();
            let lines: Vec<_> = ctx
                .registry
                .applications()
                .map(|app| render::application_line(app, current == Some(app.id())))
                .collect();
            out.lines(lines)?;
        }
        ServerCommand::Session { id } => {
            let id = ctx.select_application(id.as_deref())?;
            return Ok(Outcome::Enter(id));
        }
        ServerCommand::Stop {
            scope: Some(StopScope::All),
        } => {
            ctx.registry.stop_all();
            out.success("stopped all sessions")?;
        }
        ServerCommand::Stop { scope: None } => {
            let app = ctx.current_application_mut()?;
            let session = app.require_current()?;
            session.stop()?;
            out.success(format!(
                "stopped {}:{}",
                session.application_id(),
                session.thread_id()
            ))?;
        }
        ServerCommand::Errorlevel { level: None } => {
            out.line(format!("log level: {}", ctx.log.level()))?;
        }
        ServerCommand::Errorlevel { level: Some(level) } => {
            ctx.log.set_level(level)?;
            out.success(format!("log level set to {level}"))?;
        }
        ServerCommand::Help => out.lines(help_table::<ServerLine>())?,
        ServerCommand::Quit => return Ok(Outcome::Quit),
    }
    Ok(Outcome::Continue)
}
