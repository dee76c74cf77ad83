//! Log setup with a level that can be changed while the shell runs.

use std::fmt;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as fmt_layer, reload, EnvFilter, Registry};

use crate::error::{ShellError, ShellResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Critical,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const NAMES: [&'static str; 6] = ["critical", "error", "warning", "info", "debug", "trace"];

    pub fn parse(text: &str) -> Result<Self, String> {
        match text.trim().to_ascii_lowercase().as_str() {
            "critical" | "fatal" => Ok(Self::Critical),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(format!(
                "unknown log level '{text}' (expected one of {})",
                Self::NAMES.join(", ")
            )),
        }
    }

    /// Filter directive. `tracing` has no level above error, so critical
    /// shares it.
    #[must_use]
    pub fn directive(self) -> &'static str {
        match self {
            Self::Critical | Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warn => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        })
    }
}

/// Handle on the installed subscriber's filter.
pub struct LogControl {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
    level: LogLevel,
}

impl fmt::Debug for LogControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogControl")
            .field("level", &self.level)
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

impl LogControl {
    /// Install the global subscriber writing to stderr. `RUST_LOG`, when
    /// set, takes precedence over `level` until the level is changed.
    pub fn install(level: LogLevel) -> anyhow::Result<Self> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.directive()));
        let (filter, handle) = reload::Layer::new(filter);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer::layer().with_writer(std::io::stderr))
            .try_init()
            .context("failed to install log subscriber")?;
        Ok(Self {
            handle: Some(handle),
            level,
        })
    }

    /// Track the level without a subscriber behind it.
    #[must_use]
    pub fn detached(level: LogLevel) -> Self {
        Self {
            handle: None,
            level,
        }
    }

    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn set_level(&mut self, level: LogLevel) -> ShellResult<()> {
        if let Some(handle) = &self.handle {
            handle
                .reload(EnvFilter::new(level.directive()))
                .map_err(|err| ShellError::Log(err.to_string()))?;
        }
        self.level = level;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse() {
        assert_eq!(LogLevel::parse("WARNING"), Ok(LogLevel::Warn));
        assert_eq!(LogLevel::parse("warn"), Ok(LogLevel::Warn));
        assert_eq!(LogLevel::parse(" critical "), Ok(LogLevel::Critical));
        assert_eq!(LogLevel::Critical.directive(), "error");
        assert!(LogLevel::parse("loud").unwrap_err().contains("critical, error"));
    }

    #[test]
    fn detached_control_records_level() {
        let mut log = LogControl::detached(LogLevel::Info);
        log.set_level(LogLevel::Debug).unwrap();
        assert_eq!(log.level(), LogLevel::Debug);
        assert_eq!(log.level().to_string(), "debug");
    }
}
