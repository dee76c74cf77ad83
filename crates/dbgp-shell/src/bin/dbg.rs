//! CLI entrypoint for the DBGP command shell.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dbgp_core::harness::{DebuggeeScript, LoopbackManager};
use dbgp_core::{ConnectionManager, Registry, SessionInfo};
use dbgp_shell::commands::server::listener_message;
use dbgp_shell::input::StdinLines;
use dbgp_shell::style::{self, Style};
use dbgp_shell::{Cli, LogControl, Shell, ShellConfig, ShellContext};
use tracing::info;

/// Application id used for `--simulate` debuggees.
const SIMULATED_APP: &str = "sample";

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", style::error(format!("Error: {err:#}")));
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("DBG_CONFIG").map(PathBuf::from));
    let mut config = match &config_path {
        Some(path) => ShellConfig::load(path)?,
        None => ShellConfig::default(),
    };
    config.apply_cli(&cli);

    let log = LogControl::install(config.log_level)?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting dbg");

    let (mut manager, incoming) = if cli.simulate.is_some() {
        LoopbackManager::simulated()
    } else {
        LoopbackManager::new()
    };
    let registry = Registry::new(incoming, config.session_settings());
    if let Some(count) = cli.simulate {
        manager.set_key(config.key.clone());
        let language = config.language.as_str();
        for index in 1..=count {
            let thread = format!("t{index}");
            let mut info = SessionInfo::new(SIMULATED_APP, &thread, language);
            info.ide_key = config.key.clone();
            let script = DebuggeeScript::sample(language);
            info.file_uri = Some(script.filename.clone());
            manager
                .connect(info, script)
                .with_context(|| format!("failed to start simulated thread {thread}"))?;
        }
        info!(count, "simulated debuggees started");
    }

    let mut ctx = ShellContext::new(registry, Box::new(manager), log, config);
    ctx.start()?;
    if let Some(addr) = ctx.manager.listening_on() {
        println!(
            "{}",
            style::accent(listener_message(ctx.manager.as_ref(), addr))
        );
    }
    let mut shell = Shell::new(ctx, Style::detect());
    shell
        .run(&mut StdinLines, &mut std::io::stdout())
        .context("failed to write to the terminal")?;
    Ok(())
}
