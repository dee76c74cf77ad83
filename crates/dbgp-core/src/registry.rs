//! Live applications and the seam to the connection manager.

use std::net::SocketAddr;
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};
use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::{debug, info};

use crate::application::Application;
use crate::error::DbgpResult;
use crate::session::{Connection, Session, SessionInfo, SessionSettings};

/// Proxy registration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: SmolStr,
    pub port: u16,
    /// Key the proxy uses to route debuggees to this front end.
    pub key: SmolStr,
    /// Accept more than one session for the key.
    pub multiple_sessions: bool,
}

/// Listener, key admission and proxy relay. Accepted debuggees are handed
/// to the registry as `Connection`s over a channel.
pub trait ConnectionManager {
    /// Start listening and return the bound address.
    fn listen(&mut self, host: &str, port: u16) -> DbgpResult<SocketAddr>;

    fn stop_listening(&mut self) -> DbgpResult<()>;

    fn listening_on(&self) -> Option<SocketAddr>;

    /// True when `listen` only records the address without binding it.
    fn is_simulated(&self) -> bool {
        false
    }

    /// Set or clear the key debuggees must present.
    fn set_key(&mut self, key: Option<SmolStr>);

    fn key(&self) -> Option<SmolStr>;

    /// Register with (`Some`) or leave (`None`) a proxy.
    fn set_proxy(&mut self, proxy: Option<ProxyConfig>) -> DbgpResult<()>;

    fn proxy(&self) -> Option<&ProxyConfig>;

    /// Stop listening and leave any proxy.
    fn shutdown(&mut self);
}

/// All attached applications, keyed by application id in attach order.
#[derive(Debug)]
pub struct Registry {
    applications: IndexMap<SmolStr, Application>,
    incoming: Receiver<Connection>,
    settings: SessionSettings,
    disconnected: bool,
}

impl Registry {
    #[must_use]
    pub fn new(incoming: Receiver<Connection>, settings: SessionSettings) -> Self {
        Self {
            applications: IndexMap::new(),
            incoming,
            settings,
            disconnected: false,
        }
    }

    /// Attach every connection waiting in the channel.
    pub fn accept_pending(&mut self) -> Vec<SessionInfo> {
        let mut attached = Vec::new();
        while !self.disconnected {
            match self.incoming.try_recv() {
                Ok(connection) => attached.push(self.attach(connection)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("connection channel closed");
                    self.disconnected = true;
                }
            }
        }
        attached
    }

    /// Turn a connection into a session of its application, creating the
    /// application on first sight.
    pub fn attach(&mut self, connection: Connection) -> SessionInfo {
        let info = connection.info.clone();
        let application = self
            .applications
            .entry(info.application_id.clone())
            .or_insert_with(|| {
                info!(application = %info.application_id, language = %info.language, "application attached");
                Application::new(info.application_id.clone(), info.language.clone())
            });
        application.attach(Session::new(connection, self.settings));
        info
    }

    pub fn applications(&self) -> impl Iterator<Item = &Application> {
        self.applications.values()
    }

    #[must_use]
    pub fn application(&self, id: &str) -> Option<&Application> {
        self.applications.get(id)
    }

    pub fn application_mut(&mut self, id: &str) -> Option<&mut Application> {
        self.applications.get_mut(id)
    }

    #[must_use]
    pub fn first_application_id(&self) -> Option<SmolStr> {
        self.applications.keys().next().cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.applications.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    pub fn poll(&mut self) {
        for application in self.applications.values_mut() {
            application.poll();
        }
    }

    /// Prune terminal sessions and drop applications left without any.
    /// Returns the ids of dropped applications.
    pub fn prune(&mut self) -> Vec<SmolStr> {
        let mut dropped = Vec::new();
        self.applications.retain(|id, application| {
            application.prune();
            if application.is_empty() {
                info!(application = %id, "application gone");
                dropped.push(id.clone());
                false
            } else {
                true
            }
        });
        dropped
    }

    pub fn stop_all(&mut self) {
        for application in self.applications.values_mut() {
            application.stop_all();
        }
    }

    #[must_use]
    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// Applies to attached sessions and to those attached later.
    pub fn set_response_timeout(&mut self, timeout: Option<Duration>) {
        self.settings.response_timeout = timeout;
        for application in self.applications.values_mut() {
            application.set_response_timeout(timeout);
        }
    }
}
