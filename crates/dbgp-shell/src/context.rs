//! Everything the command loop operates on.

use anyhow::Context;
use dbgp_core::{Application, ConnectionManager, DbgpError, EntityKind, Registry};
use smol_str::SmolStr;
use tracing::info;

use crate::config::ShellConfig;
use crate::error::{ShellError, ShellResult};
use crate::logging::LogControl;

/// Owns the registry, the connection manager and the log control. Built in
/// `main`, shut down explicitly when the shell exits.
pub struct ShellContext {
    pub registry: Registry,
    pub manager: Box<dyn ConnectionManager>,
    pub log: LogControl,
    pub config: ShellConfig,
    /// Application the session scope targets.
    current_app: Option<SmolStr>,
}

impl ShellContext {
    #[must_use]
    pub fn new(
        registry: Registry,
        manager: Box<dyn ConnectionManager>,
        log: LogControl,
        config: ShellConfig,
    ) -> Self {
        Self {
            registry,
            manager,
            log,
            config,
            current_app: None,
        }
    }

    /// Apply configured key, listener and proxy to the connection manager.
    pub fn start(&mut self) -> anyhow::Result<()> {
        self.manager.set_key(self.config.key.clone());
        if let Some(endpoint) = &self.config.listen {
            self.manager
                .listen(&endpoint.host, endpoint.port)
                .with_context(|| format!("failed to listen on {endpoint}"))?;
        }
        if let Some(proxy) = &self.config.proxy {
            self.manager
                .set_proxy(Some(proxy.clone()))
                .context("failed to register with proxy")?;
        }
        Ok(())
    }

    #[must_use]
    pub fn current_app(&self) -> Option<&str> {
        self.current_app.as_deref()
    }

    /// Select `id`, or the first application when `None`.
    pub fn select_application(&mut self, id: Option<&str>) -> ShellResult<SmolStr> {
        let id = match id {
            Some(id) => {
                if self.registry.application(id).is_none() {
                    return Err(DbgpError::not_found(EntityKind::Application, id).into());
                }
                SmolStr::new(id)
            }
            None => self
                .registry
                .first_application_id()
                .ok_or(ShellError::NoApplication)?,
        };
        self.current_app = Some(id.clone());
        Ok(id)
    }

    pub fn application_mut(&mut self, id: &str) -> ShellResult<&mut Application> {
        self.registry
            .application_mut(id)
            .ok_or(ShellError::NoApplication)
    }

    /// The selected application, falling back to the first one.
    pub fn current_application_mut(&mut self) -> ShellResult<&mut Application> {
        let id = match self.current_app.clone() {
            Some(id) if self.registry.application(&id).is_some() => id,
            _ => self.select_application(None)?,
        };
        self.application_mut(&id)
    }

    /// Forget the selection once its application is gone.
    pub fn forget_missing(&mut self) {
        if let Some(id) = &self.current_app {
            if self.registry.application(id).is_none() {
                self.current_app = None;
            }
        }
    }

    pub fn shutdown(&mut self) {
        info!("shutting down");
        self.registry.stop_all();
        self.manager.shutdown();
    }
}
