mod common;

use dbgp_core::harness::DebuggeeScript;
use dbgp_core::protocol::PropertyQuery;
use dbgp_core::{
    BreakpointSpec, DbgpError, ResumeMode, SessionStatus, StreamKind, StreamMode,
};

use common::{attach_simulated, eventually, loopback, WAIT};

#[test]
fn run_pause_stop_is_terminal() {
    let (mut manager, mut registry) = loopback();
    let debuggee = attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t1",
        DebuggeeScript::sample("python").hold_on_run(),
    );
    let session = registry
        .application_mut("app")
        .unwrap()
        .require_current()
        .unwrap();
    assert_eq!(session.status(), SessionStatus::Attached);

    session.resume(ResumeMode::Go).unwrap();
    assert_eq!(session.status(), SessionStatus::Running);

    debuggee.pause();
    assert!(eventually(|| session.status() == SessionStatus::Break));

    session.stop().unwrap();
    assert_eq!(session.status(), SessionStatus::Stopped);

    assert_eq!(
        session.resume(ResumeMode::Go).unwrap_err(),
        DbgpError::InvalidState {
            operation: "run",
            status: SessionStatus::Stopped
        }
    );
    assert!(matches!(
        session.stop(),
        Err(DbgpError::InvalidState { .. })
    ));
    assert_eq!(session.update_status().unwrap(), SessionStatus::Stopped);
}

#[test]
fn stop_is_accepted_from_attached_and_running() {
    let (mut manager, mut registry) = loopback();
    let script = DebuggeeScript::sample("python").hold_on_run();
    attach_simulated(&mut manager, &mut registry, "app", "t1", script.clone());
    attach_simulated(&mut manager, &mut registry, "app", "t2", script);
    let app = registry.application_mut("app").unwrap();

    app.require_current().unwrap().stop().unwrap();

    app.select_session("t2").unwrap();
    let running = app.require_current().unwrap();
    running.resume(ResumeMode::Go).unwrap();
    running.stop().unwrap();
    assert_eq!(running.status(), SessionStatus::Stopped);
    assert_eq!(app.session_count(), 0);
}

#[test]
fn step_into_advances_one_line() {
    let (mut manager, mut registry) = loopback();
    attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t1",
        DebuggeeScript::sample("python"),
    );
    let session = registry
        .application_mut("app")
        .unwrap()
        .require_current()
        .unwrap();

    session.resume(ResumeMode::StepIn).unwrap();
    assert_eq!(session.wait_for_stop(Some(WAIT)).unwrap(), SessionStatus::Break);
    let frames = session.stack_frames().unwrap();
    assert_eq!(frames[0].lineno, 2);
    assert_eq!(frames[0].location.as_deref(), Some("compute"));
    assert_eq!(session.stack_depth().unwrap(), 2);
    assert_eq!(session.stack_get(Some(1)).unwrap().len(), 1);
}

#[test]
fn run_stops_at_line_breakpoint_then_finishes() {
    let (mut manager, mut registry) = loopback();
    attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t1",
        DebuggeeScript::sample("python"),
    );
    let app = registry.application_mut("app").unwrap();
    app.set_breakpoint(&BreakpointSpec::line("sample.py", 4))
        .unwrap();
    let session = app.require_current().unwrap();
    assert!(session
        .redirect(StreamKind::Stdout, StreamMode::Copy)
        .unwrap());

    session.resume(ResumeMode::Go).unwrap();
    assert_eq!(session.wait_for_stop(Some(WAIT)).unwrap(), SessionStatus::Break);
    assert_eq!(session.stack_frames().unwrap()[0].lineno, 4);

    session.resume(ResumeMode::Go).unwrap();
    assert_eq!(
        session.wait_for_stop(Some(WAIT)).unwrap(),
        SessionStatus::Stopped
    );
    let output: Vec<_> = session.take_output().into_iter().map(|o| o.data).collect();
    assert_eq!(output, vec!["6\n".to_string()]);
}

#[test]
fn break_interrupts_a_running_session() {
    let (mut manager, mut registry) = loopback();
    attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t1",
        DebuggeeScript::sample("python").hold_on_run(),
    );
    let session = registry
        .application_mut("app")
        .unwrap()
        .require_current()
        .unwrap();

    assert!(matches!(
        session.break_now(),
        Err(DbgpError::InvalidState {
            status: SessionStatus::Attached,
            ..
        })
    ));
    session.resume(ResumeMode::Go).unwrap();
    session.break_now().unwrap();
    assert_eq!(session.wait_for_stop(Some(WAIT)).unwrap(), SessionStatus::Break);
    assert_eq!(session.update_status().unwrap(), SessionStatus::Break);
}

#[test]
fn detach_and_disconnect_end_sessions() {
    let (mut manager, mut registry) = loopback();
    let script = DebuggeeScript::sample("python");
    attach_simulated(&mut manager, &mut registry, "app", "t1", script.clone());
    let lost = attach_simulated(&mut manager, &mut registry, "other", "t9", script);

    let app = registry.application_mut("app").unwrap();
    app.require_current().unwrap().detach().unwrap();
    assert_eq!(
        app.current_session().unwrap().status(),
        SessionStatus::Detached
    );
    assert_eq!(app.session_count(), 0);

    lost.disconnect();
    let other = registry.application("other").unwrap();
    assert!(eventually(|| other.current_session().unwrap().status()
        == SessionStatus::Stopped));

    let mut dropped = registry.prune();
    dropped.sort();
    assert_eq!(dropped, vec!["app", "other"]);
    assert!(registry.is_empty());
}

#[test]
fn inspection_in_attached_state() {
    let (mut manager, mut registry) = loopback();
    attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t1",
        DebuggeeScript::sample("python"),
    );
    let session = registry
        .application_mut("app")
        .unwrap()
        .require_current()
        .unwrap();

    let contexts: Vec<_> = session
        .context_names(0)
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(contexts, vec!["Locals", "Globals"]);

    let locals: Vec<_> = session
        .context_get(0, 0)
        .unwrap()
        .into_iter()
        .map(|p| (p.name, p.value.unwrap_or_default()))
        .collect();
    assert_eq!(
        locals,
        vec![("n".into(), "4".to_string()), ("total".into(), "0".to_string())]
    );

    assert!(session
        .property_set(PropertyQuery::new("total"), "5")
        .unwrap());
    assert_eq!(
        session.property_value(PropertyQuery::new("total")).unwrap(),
        "5"
    );
    assert_eq!(
        session.property_get(PropertyQuery::new("n")).unwrap().data_type,
        "int"
    );
    assert_eq!(session.eval("n + 2").unwrap().value.as_deref(), Some("6"));
    assert_eq!(
        session.source(None, Some(2), Some(3)).unwrap(),
        "    total = 0\n    for i in range(n):"
    );
    assert!(!session.type_map().unwrap().is_empty());

    let feature = session.feature_get("language_name").unwrap();
    assert!(feature.supported);
    assert_eq!(feature.value.as_deref(), Some("python"));
    assert!(!session.feature_get("notify_ok").unwrap().supported);
    assert!(session.feature_set("max_depth", "3").unwrap());
    assert_eq!(
        session.feature_get("max_depth").unwrap().value.as_deref(),
        Some("3")
    );
}

#[test]
fn engine_errors_leave_state_alone() {
    let (mut manager, mut registry) = loopback();
    attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t1",
        DebuggeeScript::sample("python"),
    );
    let session = registry
        .application_mut("app")
        .unwrap()
        .require_current()
        .unwrap();

    assert!(matches!(
        session.eval("undefined_name"),
        Err(DbgpError::Engine { code: 206, .. })
    ));
    assert!(matches!(
        session.context_get(7, 0),
        Err(DbgpError::Engine { code: 302, .. })
    ));
    assert_eq!(session.status(), SessionStatus::Attached);
    assert_eq!(session.stack_depth().unwrap(), 2);
}

#[test]
fn stream_output_follows_redirection() {
    let (mut manager, mut registry) = loopback();
    let debuggee = attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t1",
        DebuggeeScript::sample("python"),
    );
    let session = registry
        .application_mut("app")
        .unwrap()
        .require_current()
        .unwrap();

    debuggee.emit(StreamKind::Stderr, "dropped\n");
    session
        .redirect(StreamKind::Stderr, StreamMode::Redirect)
        .unwrap();
    debuggee.emit(StreamKind::Stderr, "warning: slow\n");
    // A status round trip orders the emits before the check.
    session.update_status().unwrap();

    let output = session.take_output();
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].kind, StreamKind::Stderr);
    assert_eq!(output[0].data, "warning: slow\n");
}
