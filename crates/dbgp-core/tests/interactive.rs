mod common;

use std::time::Duration;

use dbgp_core::harness::DebuggeeScript;
use dbgp_core::protocol::{ReplyBody, RequestKind, TransactionId};
use dbgp_core::{
    run_dialogue, DbgpError, InteractPrompt, ResumeMode, ScriptedLines, SessionStatus,
};

use common::{attach_manual, attach_simulated, loopback, WAIT};

fn prompt(text: &str, more: bool) -> ReplyBody {
    ReplyBody::Interact {
        prompt: text.into(),
        more,
    }
}

#[test]
fn replies_resolve_their_own_waiters_across_sessions() {
    let (mut manager, mut registry) = loopback();
    let first = attach_manual(&mut manager, &mut registry, "a", "t1");
    let second = attach_manual(&mut manager, &mut registry, "b", "t2");

    // Give the second session an older transaction before the one we wait on.
    let b = registry.application_mut("b").unwrap().require_current().unwrap();
    let older = b.interact(Some("")).unwrap();
    let in_b = b.interact(Some("y")).unwrap();
    let in_a = registry
        .application_mut("a")
        .unwrap()
        .require_current()
        .unwrap()
        .interact(Some("x = 1"))
        .unwrap();

    let request_a = first.expect_request(WAIT).unwrap();
    assert_eq!(request_a.transaction_id, in_a);
    assert_eq!(
        request_a.kind,
        RequestKind::Interact {
            text: Some("x = 1".into())
        }
    );
    let request_older = second.expect_request(WAIT).unwrap();
    let request_b = second.expect_request(WAIT).unwrap();
    assert_eq!(request_older.transaction_id, older);

    // Replies for the other session land first.
    second.reply(request_older.transaction_id, prompt(">>> ", false));
    second.reply(request_b.transaction_id, prompt("b> ", false));
    first.reply(request_a.transaction_id, prompt("... ", true));

    let a = registry.application_mut("a").unwrap().require_current().unwrap();
    assert_eq!(
        a.wait_response(in_a, Some(WAIT)).unwrap(),
        InteractPrompt {
            prompt: "... ".into(),
            more: true
        }
    );
    let b = registry.application_mut("b").unwrap().require_current().unwrap();
    assert_eq!(b.wait_response(in_b, Some(WAIT)).unwrap().prompt, "b> ");
    assert_eq!(b.wait_response(older, Some(WAIT)).unwrap().prompt, ">>> ");
    assert_eq!(b.pending_interactions(), 0);
}

#[test]
fn replies_within_a_session_can_arrive_out_of_order() {
    let (mut manager, mut registry) = loopback();
    let debuggee = attach_manual(&mut manager, &mut registry, "a", "t1");
    let session = registry.application_mut("a").unwrap().require_current().unwrap();

    let first = session.interact(Some("one")).unwrap();
    let second = session.interact(Some("two")).unwrap();
    assert_eq!(first, TransactionId(1));
    assert_eq!(second, TransactionId(2));
    let _ = debuggee.expect_request(WAIT).unwrap();
    let _ = debuggee.expect_request(WAIT).unwrap();

    debuggee.reply(second, prompt("second> ", false));
    debuggee.reply(first, prompt("first> ", false));

    assert_eq!(
        session.wait_response(first, Some(WAIT)).unwrap().prompt,
        "first> "
    );
    assert_eq!(
        session.wait_response(second, Some(WAIT)).unwrap().prompt,
        "second> "
    );
    assert_eq!(session.status(), SessionStatus::Attached);
}

#[test]
fn dialogue_runs_until_input_ends() {
    let (mut manager, mut registry) = loopback();
    let debuggee = attach_simulated(
        &mut manager,
        &mut registry,
        "app",
        "t1",
        DebuggeeScript::sample("python"),
    );
    let session = registry.application_mut("app").unwrap().require_current().unwrap();

    let mut input = ScriptedLines::new(["x = 5", "x + 1", "for i in x:", "  pass", ""]);
    let sent = run_dialogue(session, &mut input).unwrap();

    assert_eq!(sent, 5);
    assert_eq!(
        input.prompts(),
        [">>> ", ">>> ", ">>> ", "... ", "... ", ">>> "]
    );
    let output: Vec<_> = session.take_output().into_iter().map(|o| o.data).collect();
    assert_eq!(output, vec!["6\n".to_string()]);

    // The stop signal's reply was dropped, not treated as unexpected.
    assert_eq!(session.update_status().unwrap(), SessionStatus::Attached);
    assert_eq!(
        debuggee.requests().iter().filter(|kind| matches!(kind, RequestKind::Interact { text: None })).count(),
        1
    );
}

#[test]
fn missing_reply_times_out_and_stops_the_session() {
    let (mut manager, mut registry) = loopback();
    let _debuggee = attach_manual(&mut manager, &mut registry, "a", "t1");
    let session = registry.application_mut("a").unwrap().require_current().unwrap();

    let id = session.interact(Some("sleep()")).unwrap();
    assert_eq!(
        session
            .wait_response(id, Some(Duration::from_millis(20)))
            .unwrap_err(),
        DbgpError::Timeout(id)
    );
    assert_eq!(session.status(), SessionStatus::Stopped);
}

#[test]
fn reply_for_unknown_transaction_stops_the_session() {
    let (mut manager, mut registry) = loopback();
    let debuggee = attach_manual(&mut manager, &mut registry, "a", "t1");
    debuggee.reply(TransactionId(42), ReplyBody::Success(true));
    let app = registry.application("a").unwrap();
    assert_eq!(
        app.current_session().unwrap().status(),
        SessionStatus::Stopped
    );
}

#[test]
fn interaction_needs_a_paused_session() {
    let (mut manager, mut registry) = loopback();
    let debuggee = attach_manual(&mut manager, &mut registry, "a", "t1");
    let session = registry.application_mut("a").unwrap().require_current().unwrap();

    session.resume(ResumeMode::Go).unwrap();
    let _ = debuggee.expect_request(WAIT).unwrap();
    assert!(matches!(
        session.interact(Some("x")),
        Err(DbgpError::InvalidState {
            status: SessionStatus::Running,
            ..
        })
    ));
}
