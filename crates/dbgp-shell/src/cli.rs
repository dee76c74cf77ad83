//! Command-line flags for `dbg`.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Endpoint, Language};
use crate::logging::LogLevel;

#[derive(Debug, Default, Parser)]
#[command(
    name = "dbg",
    version,
    about = "Command-line front end for DBGP debuggers",
    after_help = "Examples:\n  dbg -d 9000                 # listen on 127.0.0.1:9000\n  dbg --config dbg.toml       # settings from a file (or DBG_CONFIG)\n  dbg --simulate 2 -l debug   # two simulated debuggee threads"
)]
pub struct Cli {
    /// Configuration file (TOML). Defaults to $DBG_CONFIG when set.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Log level: critical, error, warning, info, debug or trace.
    #[arg(short = 'l', long, value_parser = LogLevel::parse)]
    pub log_level: Option<LogLevel>,
    /// Listen for debuggers on [host:]port at startup.
    #[arg(short = 'd', long, value_name = "[HOST:]PORT", value_parser = Endpoint::parse)]
    pub daemon: Option<Endpoint>,
    /// Language reported by simulated debuggees.
    #[arg(long, value_enum)]
    pub language: Option<Language>,
    /// Server key debuggees must present.
    #[arg(long)]
    pub key: Option<String>,
    /// Reply timeout in milliseconds; 0 waits forever.
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,
    /// Attach N simulated debuggee threads.
    #[arg(long, value_name = "N")]
    pub simulate: Option<u32>,
}
