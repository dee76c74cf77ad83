mod common;

use dbgp_core::harness::{DebuggeeHandle, DebuggeeScript};
use dbgp_core::protocol::{EngineStatus, ReplyBody, RequestKind, StatusReason};
use dbgp_core::{
    BreakpointId, BreakpointSpec, BreakpointState, BreakpointType, DbgpError, EntityKind,
    ResumeMode, SessionStatus, SpawnpointSpec,
};

use common::{attach_manual, attach_simulated, eventually, loopback, WAIT};

#[test]
fn selecting_an_unknown_thread_keeps_the_selection() {
    let (mut manager, mut registry) = loopback();
    let script = DebuggeeScript::sample("python");
    attach_simulated(&mut manager, &mut registry, "app", "t1", script.clone());
    attach_simulated(&mut manager, &mut registry, "app", "t2", script);
    let app = registry.application_mut("app").unwrap();

    assert_eq!(app.current_session().unwrap().thread_id(), "t1");
    app.select_session("t2").unwrap();
    assert_eq!(app.current_session().unwrap().thread_id(), "t2");

    let err = app.select_session("bogus").unwrap_err();
    assert_eq!(
        err,
        DbgpError::NotFound {
            kind: EntityKind::Session,
            id: "bogus".into()
        }
    );
    assert_eq!(app.current_session().unwrap().thread_id(), "t2");

    let threads: Vec<_> = app.sessions().iter().map(|s| s.thread_id()).collect();
    assert_eq!(threads, vec!["t1", "t2"]);
}

#[test]
fn breakpoints_are_refused_while_running_and_accepted_after_break() {
    let (mut manager, mut registry) = loopback();
    let debuggee = attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t1",
        DebuggeeScript::sample("python").hold_on_run(),
    );
    let app = registry.application_mut("app").unwrap();
    app.require_current().unwrap().resume(ResumeMode::Go).unwrap();

    let spec = BreakpointSpec::line("sample.py", 5);
    assert_eq!(
        app.set_breakpoint(&spec).unwrap_err(),
        DbgpError::InvalidState {
            operation: "set breakpoint",
            status: SessionStatus::Running
        }
    );
    assert_eq!(app.breakpoints().count(), 0);
    assert!(matches!(
        app.require_current().unwrap().stack_get(None),
        Err(DbgpError::InvalidState { .. })
    ));

    debuggee.pause();
    assert!(eventually(|| app.current_session().unwrap().status()
        == SessionStatus::Break));

    let frames = app.require_current().unwrap().stack_get(None).unwrap();
    assert_eq!(frames.len(), 2);
    let bp = app.set_breakpoint(&spec).unwrap();
    assert_eq!(bp.id, BreakpointId(1));
    assert_eq!(
        app.current_session().unwrap().remote_breakpoint_id(bp.id),
        Some("bp-1")
    );
}

#[test]
fn validation_runs_before_the_state_check() {
    let (mut manager, mut registry) = loopback();
    attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t1",
        DebuggeeScript::sample("python").hold_on_run(),
    );
    let app = registry.application_mut("app").unwrap();
    app.require_current().unwrap().resume(ResumeMode::Go).unwrap();

    let incomplete = BreakpointSpec::new(BreakpointType::Exception);
    assert!(matches!(
        app.set_breakpoint(&incomplete),
        Err(DbgpError::Validation(_))
    ));
    assert!(matches!(
        app.enable_breakpoint(BreakpointId(3)),
        Err(DbgpError::NotFound { .. })
    ));
}

#[test]
fn breakpoint_changes_reach_the_debuggee() {
    let (mut manager, mut registry) = loopback();
    let debuggee = attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t1",
        DebuggeeScript::sample("python"),
    );
    let app = registry.application_mut("app").unwrap();

    let bp = app.set_breakpoint(&BreakpointSpec::line("a.py", 10)).unwrap();
    assert_eq!(
        app.disable_breakpoint(bp.id).unwrap().state,
        BreakpointState::Disabled
    );
    assert_eq!(
        app.breakpoint(bp.id).unwrap().state,
        BreakpointState::Disabled
    );
    app.remove_breakpoint(bp.id).unwrap();
    assert!(matches!(
        app.breakpoint(bp.id),
        Err(DbgpError::NotFound { .. })
    ));

    let sp = app
        .set_spawnpoint(&SpawnpointSpec::new("worker.py", 12))
        .unwrap();
    app.disable_spawnpoint(sp.id).unwrap();
    app.enable_spawnpoint(sp.id).unwrap();
    app.remove_spawnpoint(sp.id).unwrap();

    let sent: Vec<_> = debuggee
        .requests()
        .iter()
        .map(RequestKind::command_name)
        .collect();
    assert_eq!(
        sent,
        vec![
            "breakpoint_set",
            "breakpoint_update",
            "breakpoint_remove",
            "spawnpoint_set",
            "spawnpoint_update",
            "spawnpoint_update",
            "spawnpoint_remove",
        ]
    );
}

#[test]
fn failed_forwarding_rolls_back_the_store() {
    let (mut manager, mut registry) = loopback();
    let debuggee = attach_manual(&mut manager, &mut registry, "app", "t1");
    let responder = std::thread::spawn(move || {
        let request = debuggee.expect_request(WAIT).unwrap();
        debuggee.reply(
            request.transaction_id,
            ReplyBody::Error {
                code: 201,
                message: "breakpoint type not supported".into(),
            },
        );
        debuggee
    });

    let app = registry.application_mut("app").unwrap();
    let mut spec = BreakpointSpec::new(BreakpointType::Watch);
    spec.expression = Some("total".into());
    let err = app.set_breakpoint(&spec).unwrap_err();
    let _debuggee = responder.join().unwrap();

    assert!(matches!(err, DbgpError::Engine { code: 201, .. }));
    assert_eq!(app.breakpoints().count(), 0);
    assert_eq!(
        app.current_session().unwrap().status(),
        SessionStatus::Attached
    );
}

#[test]
fn new_threads_receive_existing_breakpoints() {
    let (mut manager, mut registry) = loopback();
    let script = DebuggeeScript::sample("python");
    attach_simulated(&mut manager, &mut registry, "app", "t1", script.clone());
    registry
        .application_mut("app")
        .unwrap()
        .set_breakpoint(&BreakpointSpec::line("sample.py", 3))
        .unwrap();

    let second = attach_simulated(&mut manager, &mut registry, "app", "t2", script);
    let app = registry.application_mut("app").unwrap();
    assert_eq!(
        app.session("t2")
            .unwrap()
            .remote_breakpoint_id(BreakpointId(1)),
        Some("bp-1")
    );
    assert!(matches!(
        second.requests().first(),
        Some(RequestKind::BreakpointSet(_))
    ));

    app.select_session("t2").unwrap();
    let session = app.require_current().unwrap();
    session.resume(ResumeMode::Go).unwrap();
    assert_eq!(
        session.wait_for_stop(Some(WAIT)).unwrap(),
        SessionStatus::Break
    );
    assert_eq!(session.stack_frames().unwrap()[0].lineno, 3);
}

#[test]
fn pruning_retargets_the_current_session() {
    let (mut manager, mut registry) = loopback();
    let first = attach_manual(&mut manager, &mut registry, "app", "t1");
    let _second = attach_manual(&mut manager, &mut registry, "app", "t2");
    let _third = attach_manual(&mut manager, &mut registry, "app", "t3");

    first.disconnect("reset by peer");
    let app = registry.application_mut("app").unwrap();
    assert_eq!(app.session_count(), 2);
    assert_eq!(app.current_session().unwrap().thread_id(), "t1");

    let removed = app.prune();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].thread_id, "t1");
    assert_eq!(app.current_session().unwrap().thread_id(), "t2");
    assert!(!app.is_empty());
}

#[test]
fn status_reported_by_the_debuggee_is_adopted() {
    let (mut manager, mut registry) = loopback();
    let debuggee = attach_manual(&mut manager, &mut registry, "app", "t1");
    let responder = std::thread::spawn(move || {
        let request = debuggee.expect_request(WAIT).unwrap();
        assert_eq!(request.kind, RequestKind::Status);
        debuggee.reply(
            request.transaction_id,
            ReplyBody::Status {
                status: EngineStatus::Break,
                reason: StatusReason::Exception,
            },
        );
        debuggee
    });
    let app = registry.application_mut("app").unwrap();
    let session = app.require_current().unwrap();
    assert_eq!(session.update_status().unwrap(), SessionStatus::Break);
    assert_eq!(session.reason(), StatusReason::Exception);
    let _debuggee = responder.join().unwrap();
}

fn commands(debuggee: &DebuggeeHandle) -> Vec<&'static str> {
    debuggee
        .requests()
        .iter()
        .map(RequestKind::command_name)
        .collect()
}

#[test]
fn point_changes_reach_every_thread_of_the_application() {
    let (mut manager, mut registry) = loopback();
    let script = DebuggeeScript::sample("python");
    let first = attach_simulated(&mut manager, &mut registry, "app", "t1", script.clone());
    let second = attach_simulated(&mut manager, &mut registry, "app", "t2", script);
    let app = registry.application_mut("app").unwrap();

    let bp = app.set_breakpoint(&BreakpointSpec::line("a.py", 10)).unwrap();
    app.disable_breakpoint(bp.id).unwrap();
    let sp = app
        .set_spawnpoint(&SpawnpointSpec::new("worker.py", 12))
        .unwrap();
    for thread in ["t1", "t2"] {
        let session = app.session(thread).unwrap();
        assert_eq!(session.remote_breakpoint_id(bp.id), Some("bp-1"), "{thread}");
        assert!(session.remote_spawnpoint_id(sp.id).is_some(), "{thread}");
    }

    let third = attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t3",
        DebuggeeScript::sample("python"),
    );
    let app = registry.application_mut("app").unwrap();
    app.remove_breakpoint(bp.id).unwrap();
    app.remove_spawnpoint(sp.id).unwrap();

    let expected = vec![
        "breakpoint_set",
        "breakpoint_update",
        "spawnpoint_set",
        "breakpoint_remove",
        "spawnpoint_remove",
    ];
    assert_eq!(commands(&first), expected);
    assert_eq!(commands(&second), expected);
    assert_eq!(
        commands(&third),
        vec![
            "breakpoint_set",
            "spawnpoint_set",
            "breakpoint_remove",
            "spawnpoint_remove",
        ]
    );
    assert!(matches!(
        third.requests().first(),
        Some(RequestKind::BreakpointSet(point)) if point.state == BreakpointState::Disabled
    ));
    assert_eq!(app.breakpoints().count(), 0);
    assert_eq!(app.spawnpoints().count(), 0);
    assert!(app.sessions().iter().all(|s| s.forwarded_breakpoints().count() == 0));
}

#[test]
fn running_threads_catch_up_once_they_break() {
    let (mut manager, mut registry) = loopback();
    attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t1",
        DebuggeeScript::sample("python"),
    );
    let busy = attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t2",
        DebuggeeScript::sample("python").hold_on_run(),
    );
    let app = registry.application_mut("app").unwrap();
    app.select_session("t2").unwrap();
    app.require_current().unwrap().resume(ResumeMode::Go).unwrap();
    app.select_session("t1").unwrap();

    let bp = app.set_breakpoint(&BreakpointSpec::line("a.py", 10)).unwrap();
    app.disable_breakpoint(bp.id).unwrap();
    assert!(eventually(|| commands(&busy) == ["run"]));
    let unsynced: Vec<_> = app.unsynced_threads().iter().map(|t| t.as_str()).collect();
    assert_eq!(unsynced, vec!["t2"]);

    busy.pause();
    assert!(eventually(|| {
        app.poll();
        app.session("t2").unwrap().status() == SessionStatus::Break
    }));
    assert!(app.unsynced_threads().is_empty());
    assert_eq!(commands(&busy), vec!["run", "breakpoint_set"]);
    assert!(matches!(
        busy.requests().last(),
        Some(RequestKind::BreakpointSet(point)) if point.state == BreakpointState::Disabled
    ));

    app.remove_breakpoint(bp.id).unwrap();
    assert_eq!(commands(&busy), vec!["run", "breakpoint_set", "breakpoint_remove"]);
}
