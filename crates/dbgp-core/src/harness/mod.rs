//! In-process debuggees for tests and demos.
//!
//! `LoopbackManager` plays the connection manager without opening sockets:
//! its listener is simulated, it records proxy settings, applies key and
//! listener admission, and hands connections to the registry over the usual
//! channel. Debuggees are either
//! simulated engines on their own thread (`connect`) or driven reply by
//! reply from the test itself (`connect_manual`).

mod engine;
mod script;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tracing::{debug, info};

use crate::error::{DbgpError, DbgpResult};
use crate::protocol::{Inbound, Reply, ReplyBody, Request, RequestKind, StreamKind, TransactionId};
use crate::registry::{ConnectionManager, ProxyConfig};
use crate::session::{Connection, SessionInfo, SessionLink, Transport};

use engine::{Control, Engine};
pub use script::{DebuggeeScript, Variable};

/// Request sender owned by the session; closing it ends the debuggee.
struct LoopbackTransport {
    tx: Option<Sender<Request>>,
}

impl Transport for LoopbackTransport {
    fn send(&mut self, request: &Request) -> DbgpResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| DbgpError::transport("connection closed"))?;
        tx.send(request.clone())
            .map_err(|_| DbgpError::transport("debuggee is gone"))
    }

    fn close(&mut self) {
        self.tx = None;
    }
}

#[derive(Debug)]
pub struct LoopbackManager {
    connections: Sender<Connection>,
    listening: Option<SocketAddr>,
    key: Option<SmolStr>,
    proxy: Option<ProxyConfig>,
    /// Admit debuggees without a listener.
    preattached: bool,
    shut_down: bool,
}

impl LoopbackManager {
    /// A manager that admits debuggees only while its simulated listener
    /// is up. The receiver feeds a `Registry`.
    #[must_use]
    pub fn new() -> (Self, Receiver<Connection>) {
        let (connections, incoming) = unbounded();
        let manager = Self {
            connections,
            listening: None,
            key: None,
            proxy: None,
            preattached: false,
            shut_down: false,
        };
        (manager, incoming)
    }

    /// A manager that admits debuggees whether or not it listens, for
    /// sessions started in-process.
    #[must_use]
    pub fn simulated() -> (Self, Receiver<Connection>) {
        let (mut manager, incoming) = Self::new();
        manager.preattached = true;
        (manager, incoming)
    }

    fn admit(&self, info: &SessionInfo) -> DbgpResult<()> {
        if self.shut_down {
            return Err(DbgpError::transport("connection manager is shut down"));
        }
        if self.listening.is_none() && !self.preattached {
            return Err(DbgpError::validation(format!(
                "connection from {}:{} rejected: not listening",
                info.application_id, info.thread_id
            )));
        }
        if let Some(key) = &self.key {
            if info.ide_key.as_ref() != Some(key) {
                return Err(DbgpError::validation(format!(
                    "connection from {}:{} rejected: server key mismatch",
                    info.application_id, info.thread_id
                )));
            }
        }
        Ok(())
    }

    /// Start a simulated debuggee running `script`.
    pub fn connect(
        &mut self,
        info: SessionInfo,
        script: DebuggeeScript,
    ) -> DbgpResult<DebuggeeHandle> {
        self.admit(&info)?;
        let (request_tx, request_rx) = unbounded();
        let (control_tx, control_rx) = unbounded();
        let link = SessionLink::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine = Engine::new(link.clone(), script, Arc::clone(&log));
        std::thread::Builder::new()
            .name(format!("debuggee-{}-{}", info.application_id, info.thread_id))
            .spawn(move || engine.run(&request_rx, &control_rx))
            .map_err(|err| DbgpError::transport(format!("spawn debuggee: {err}")))?;
        self.hand_over(info, request_tx, link)?;
        Ok(DebuggeeHandle {
            control: control_tx,
            log,
        })
    }

    /// Attach a debuggee whose every reply is supplied by the caller.
    pub fn connect_manual(&mut self, info: SessionInfo) -> DbgpResult<ManualDebuggee> {
        self.admit(&info)?;
        let (request_tx, requests) = unbounded();
        let link = SessionLink::new();
        self.hand_over(info, request_tx, link.clone())?;
        Ok(ManualDebuggee { requests, link })
    }

    fn hand_over(
        &self,
        info: SessionInfo,
        request_tx: Sender<Request>,
        link: SessionLink,
    ) -> DbgpResult<()> {
        debug!(application = %info.application_id, thread = %info.thread_id, "loopback connection");
        let connection = Connection {
            info,
            transport: Box::new(LoopbackTransport {
                tx: Some(request_tx),
            }),
            link,
        };
        self.connections
            .send(connection)
            .map_err(|_| DbgpError::transport("registry is gone"))
    }
}

impl ConnectionManager for LoopbackManager {
    fn listen(&mut self, host: &str, port: u16) -> DbgpResult<SocketAddr> {
        let ip = match host {
            "" | "localhost" => IpAddr::V4(Ipv4Addr::LOCALHOST),
            other => other
                .parse()
                .map_err(|_| DbgpError::validation(format!("invalid listen host '{other}'")))?,
        };
        let addr = SocketAddr::new(ip, port);
        info!(%addr, "simulated listener up");
        self.listening = Some(addr);
        Ok(addr)
    }

    fn stop_listening(&mut self) -> DbgpResult<()> {
        match self.listening.take() {
            Some(addr) => {
                info!(%addr, "stopped listening");
                Ok(())
            }
            None => Err(DbgpError::validation("not listening")),
        }
    }

    fn listening_on(&self) -> Option<SocketAddr> {
        self.listening
    }

    fn is_simulated(&self) -> bool {
        true
    }

    fn set_key(&mut self, key: Option<SmolStr>) {
        self.key = key;
    }

    fn key(&self) -> Option<SmolStr> {
        self.key.clone()
    }

    fn set_proxy(&mut self, proxy: Option<ProxyConfig>) -> DbgpResult<()> {
        match (&proxy, &self.proxy) {
            (None, None) => return Err(DbgpError::validation("no proxy registered")),
            (Some(config), _) => {
                info!(host = %config.host, port = config.port, key = %config.key, "proxy registered");
            }
            (None, Some(_)) => info!("proxy stopped"),
        }
        self.proxy = proxy;
        Ok(())
    }

    fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    fn shutdown(&mut self) {
        self.listening = None;
        self.proxy = None;
        self.shut_down = true;
    }
}

/// Driver side of a simulated debuggee.
#[derive(Debug, Clone)]
pub struct DebuggeeHandle {
    control: Sender<Control>,
    log: Arc<Mutex<Vec<RequestKind>>>,
}

impl DebuggeeHandle {
    /// Pause a running debuggee as if it hit a breakpoint.
    pub fn pause(&self) {
        let _ = self.control.send(Control::Pause);
    }

    /// Let a running debuggee run to its end.
    pub fn finish(&self) {
        let _ = self.control.send(Control::Finish);
    }

    /// Drop the connection from the debuggee side.
    pub fn disconnect(&self) {
        let _ = self.control.send(Control::Disconnect);
    }

    /// Write to a debuggee stream; only forwarded once redirected.
    pub fn emit(&self, kind: StreamKind, data: &str) {
        let _ = self.control.send(Control::Emit(kind, data.to_string()));
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<RequestKind> {
        self.log.lock().clone()
    }
}

/// A debuggee the test answers by hand.
#[derive(Debug)]
pub struct ManualDebuggee {
    requests: Receiver<Request>,
    link: SessionLink,
}

impl ManualDebuggee {
    /// Next request the front end sent, if one arrives in time.
    #[must_use]
    pub fn expect_request(&self, timeout: Duration) -> Option<Request> {
        self.requests.recv_timeout(timeout).ok()
    }

    pub fn reply(&self, transaction_id: TransactionId, body: ReplyBody) {
        self.link
            .deliver(Inbound::Reply(Reply::new(transaction_id, body)));
    }

    pub fn emit(&self, kind: StreamKind, data: &str) {
        self.link.deliver(Inbound::Stream {
            kind,
            data: data.to_string(),
        });
    }

    pub fn disconnect(&self, reason: &str) {
        self.link.deliver(Inbound::Disconnected {
            reason: reason.into(),
        });
    }
}
