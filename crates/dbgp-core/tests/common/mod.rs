#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use dbgp_core::harness::{DebuggeeHandle, DebuggeeScript, LoopbackManager, ManualDebuggee};
use dbgp_core::{Registry, SessionInfo, SessionSettings};

pub const WAIT: Duration = Duration::from_secs(2);

pub fn settings() -> SessionSettings {
    SessionSettings {
        response_timeout: Some(WAIT),
    }
}

pub fn loopback() -> (LoopbackManager, Registry) {
    let (manager, incoming) = LoopbackManager::simulated();
    (manager, Registry::new(incoming, settings()))
}

pub fn attach_simulated(
    manager: &mut LoopbackManager,
    registry: &mut Registry,
    app: &str,
    thread: &str,
    script: DebuggeeScript,
) -> DebuggeeHandle {
    let handle = manager
        .connect(SessionInfo::new(app, thread, "python"), script)
        .unwrap();
    let attached = registry.accept_pending();
    assert_eq!(attached.len(), 1);
    handle
}

pub fn attach_manual(
    manager: &mut LoopbackManager,
    registry: &mut Registry,
    app: &str,
    thread: &str,
) -> ManualDebuggee {
    let debuggee = manager
        .connect_manual(SessionInfo::new(app, thread, "python"))
        .unwrap();
    registry.accept_pending();
    debuggee
}

/// Poll `check` until it holds or two seconds pass.
pub fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}
