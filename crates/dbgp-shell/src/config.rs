//! Shell configuration loading.
//!
//! Settings come from an optional TOML file and are then overridden by
//! command-line flags.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use dbgp_core::{ProxyConfig, SessionSettings};
use serde::Deserialize;
use smol_str::SmolStr;

use crate::cli::Cli;
use crate::logging::LogLevel;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// `[host:]port` as typed by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: SmolStr,
    pub port: u16,
}

impl Endpoint {
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        let (host, port) = match text.rsplit_once(':') {
            Some((host, port)) => (host, port),
            None => ("", text),
        };
        let port = port
            .parse::<u16>()
            .map_err(|_| format!("invalid port in '{text}'"))?;
        let host = if host.is_empty() { DEFAULT_HOST } else { host };
        Ok(Self {
            host: host.into(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Languages the simulated debuggee can pretend to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Language {
    #[default]
    Python,
    Perl,
    Php,
    Tcl,
    Xslt,
}

impl Language {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "python" => Ok(Self::Python),
            "perl" => Ok(Self::Perl),
            "php" => Ok(Self::Php),
            "tcl" => Ok(Self::Tcl),
            "xslt" => Ok(Self::Xslt),
            _ => bail!("invalid config: unknown server.language '{text}'"),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Perl => "perl",
            Self::Php => "php",
            Self::Tcl => "tcl",
            Self::Xslt => "xslt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Start listening here at startup.
    pub listen: Option<Endpoint>,
    pub key: Option<SmolStr>,
    pub language: Language,
    pub proxy: Option<ProxyConfig>,
    /// `None` waits forever.
    pub response_timeout: Option<Duration>,
    pub log_level: LogLevel,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            listen: None,
            key: None,
            language: Language::default(),
            proxy: None,
            response_timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            log_level: LogLevel::default(),
        }
    }
}

impl ShellConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let raw: ConfigToml = toml::from_str(text).context("invalid config")?;
        raw.into_config()
    }

    /// Apply command-line overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        if let Some(endpoint) = &cli.daemon {
            self.listen = Some(endpoint.clone());
        }
        if let Some(language) = cli.language {
            self.language = language;
        }
        if let Some(key) = &cli.key {
            self.key = Some(key.as_str().into());
        }
        if let Some(ms) = cli.timeout_ms {
            self.response_timeout = timeout_from_ms(ms);
        }
    }

    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            response_timeout: self.response_timeout,
        }
    }
}

fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Key used for proxy registration when none is configured.
#[must_use]
pub fn default_proxy_key() -> SmolStr {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .map_or_else(|_| SmolStr::new("dbg"), SmolStr::from)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    listen: Option<ListenSection>,
    server: Option<ServerSection>,
    proxy: Option<ProxySection>,
    session: Option<SessionSection>,
    log: Option<LogSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListenSection {
    host: Option<String>,
    port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerSection {
    key: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProxySection {
    host: Option<String>,
    port: u16,
    multiple_sessions: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionSection {
    response_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogSection {
    level: Option<String>,
}

impl ConfigToml {
    fn into_config(self) -> anyhow::Result<ShellConfig> {
        let mut config = ShellConfig::default();
        if let Some(listen) = self.listen {
            config.listen = Some(Endpoint {
                host: listen.host.as_deref().unwrap_or(DEFAULT_HOST).into(),
                port: listen.port,
            });
        }
        if let Some(server) = self.server {
            config.key = server
                .key
                .filter(|key| !key.trim().is_empty())
                .map(SmolStr::from);
            if let Some(language) = server.language {
                config.language = Language::parse(&language)?;
            }
        }
        if let Some(proxy) = self.proxy {
            if proxy.port == 0 {
                bail!("invalid config: proxy.port must be non-zero");
            }
            config.proxy = Some(ProxyConfig {
                host: proxy.host.as_deref().unwrap_or(DEFAULT_HOST).into(),
                port: proxy.port,
                key: config.key.clone().unwrap_or_else(default_proxy_key),
                multiple_sessions: proxy.multiple_sessions.unwrap_or(false),
            });
        }
        if let Some(ms) = self.session.and_then(|s| s.response_timeout_ms) {
            config.response_timeout = timeout_from_ms(ms);
        }
        if let Some(level) = self.log.and_then(|log| log.level) {
            config.log_level = LogLevel::parse(&level)
                .map_err(|err| anyhow::anyhow!("invalid config: log.level: {err}"))?;
        }
        Ok(config)
    }
}
