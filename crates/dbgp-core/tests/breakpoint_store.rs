use std::collections::HashSet;

use dbgp_core::{
    BreakpointId, BreakpointKind, BreakpointSpec, BreakpointState, BreakpointStore,
    BreakpointType, DbgpError, EntityKind, HitCondition, SpawnpointId, SpawnpointSpec,
};
use expect_test::expect;

fn complete_spec(kind: BreakpointType) -> BreakpointSpec {
    let mut spec = BreakpointSpec::new(kind);
    match kind {
        BreakpointType::Line => {
            spec.filename = Some("a.py".into());
            spec.lineno = Some(10);
        }
        BreakpointType::Conditional | BreakpointType::Watch => {
            spec.expression = Some("x > 1".into());
        }
        BreakpointType::Exception => spec.exception = Some("ValueError".into()),
        BreakpointType::Call | BreakpointType::Return => spec.function = Some("compute".into()),
    }
    spec
}

/// Every way of dropping one required field from a complete spec.
fn incomplete_specs(kind: BreakpointType) -> Vec<BreakpointSpec> {
    let base = complete_spec(kind);
    match kind {
        BreakpointType::Line => {
            let mut no_file = base.clone();
            no_file.filename = None;
            let mut empty_file = base.clone();
            empty_file.filename = Some("".into());
            let mut no_line = base;
            no_line.lineno = None;
            vec![no_file, empty_file, no_line]
        }
        BreakpointType::Conditional | BreakpointType::Watch => {
            let mut spec = base;
            spec.expression = None;
            vec![spec]
        }
        BreakpointType::Exception => {
            let mut spec = base;
            spec.exception = Some("  ".into());
            vec![spec]
        }
        BreakpointType::Call | BreakpointType::Return => {
            let mut spec = base;
            spec.function = None;
            vec![spec]
        }
    }
}

const ALL_KINDS: [BreakpointType; 6] = [
    BreakpointType::Line,
    BreakpointType::Conditional,
    BreakpointType::Watch,
    BreakpointType::Exception,
    BreakpointType::Call,
    BreakpointType::Return,
];

#[test]
fn missing_required_field_is_rejected_and_not_stored() {
    let mut store = BreakpointStore::new();
    for kind in ALL_KINDS {
        for spec in incomplete_specs(kind) {
            let err = store.add_breakpoint(&spec, "python").unwrap_err();
            assert!(
                matches!(err, DbgpError::Validation(_)),
                "{kind:?}: unexpected {err:?}"
            );
        }
    }
    assert_eq!(store.breakpoints().count(), 0);
}

#[test]
fn ids_are_unique_across_removals() {
    let mut store = BreakpointStore::new();
    let mut seen = HashSet::new();
    for kind in ALL_KINDS {
        let bp = store.add_breakpoint(&complete_spec(kind), "python").unwrap();
        assert!(seen.insert(bp.id));
        store.remove_breakpoint(bp.id).unwrap();
    }
    for kind in ALL_KINDS {
        let bp = store.add_breakpoint(&complete_spec(kind), "python").unwrap();
        assert!(seen.insert(bp.id), "id {} reused", bp.id);
    }
    assert_eq!(seen.len(), 12);
}

#[test]
fn unknown_ids_are_not_found() {
    let mut store = BreakpointStore::new();
    let missing = BreakpointId(99);
    let expected = DbgpError::NotFound {
        kind: EntityKind::Breakpoint,
        id: "99".into(),
    };
    assert_eq!(store.enable_breakpoint(missing).unwrap_err(), expected);
    assert_eq!(store.disable_breakpoint(missing).unwrap_err(), expected);
    assert_eq!(store.remove_breakpoint(missing).unwrap_err(), expected);
    assert!(matches!(
        store.remove_spawnpoint(SpawnpointId(1)),
        Err(DbgpError::NotFound {
            kind: EntityKind::Spawnpoint,
            ..
        })
    ));
}

#[test]
fn enable_is_idempotent() {
    let mut store = BreakpointStore::new();
    let bp = store
        .add_breakpoint(&complete_spec(BreakpointType::Call), "python")
        .unwrap();
    assert_eq!(
        store.enable_breakpoint(bp.id).unwrap().state,
        BreakpointState::Enabled
    );
    assert_eq!(
        store.enable_breakpoint(bp.id).unwrap().state,
        BreakpointState::Enabled
    );
}

#[test]
fn added_record_reads_back_unchanged() {
    let mut store = BreakpointStore::new();
    let mut spec = complete_spec(BreakpointType::Watch);
    spec.filename = Some("m.py".into());
    spec.lineno = Some(7);
    spec.temporary = true;
    spec.state = BreakpointState::Disabled;
    let added = store.add_breakpoint(&spec, "python").unwrap();
    let read = store.breakpoint(added.id).unwrap();
    assert_eq!(read, &added);
    assert_eq!(
        read.kind,
        BreakpointKind::Watch {
            expression: "x > 1".into(),
            filename: Some("m.py".into()),
            lineno: Some(7),
        }
    );
    assert!(read.temporary);
    assert_eq!(read.state, BreakpointState::Disabled);
}

#[test]
fn line_breakpoint_lifecycle() {
    let mut store = BreakpointStore::new();
    let bp = store
        .add_breakpoint(&BreakpointSpec::line("a.py", 10), "X")
        .unwrap();
    assert_eq!(bp.id, BreakpointId(1));
    store.disable_breakpoint(bp.id).unwrap();
    assert_eq!(
        store.breakpoint(bp.id).unwrap().state,
        BreakpointState::Disabled
    );
    store.remove_breakpoint(bp.id).unwrap();
    assert!(matches!(
        store.breakpoint(bp.id),
        Err(DbgpError::NotFound { .. })
    ));
}

#[test]
fn spawnpoints_have_their_own_ids() {
    let mut store = BreakpointStore::new();
    store
        .add_breakpoint(&BreakpointSpec::line("a.py", 1), "python")
        .unwrap();
    let sp = store
        .add_spawnpoint(&SpawnpointSpec::new("worker.py", 3), "python")
        .unwrap();
    assert_eq!(sp.id, SpawnpointId(1));
    assert_eq!(sp.to_string(), "spawnpoint 1 [enabled] worker.py:3");

    let missing_line = SpawnpointSpec {
        filename: Some("worker.py".into()),
        lineno: None,
        state: BreakpointState::Enabled,
    };
    assert!(matches!(
        store.add_spawnpoint(&missing_line, "python"),
        Err(DbgpError::Validation(_))
    ));
    assert_eq!(store.spawnpoints().count(), 1);

    store.disable_spawnpoint(sp.id).unwrap();
    store.disable_spawnpoint(sp.id).unwrap();
    assert_eq!(
        store.spawnpoint(sp.id).unwrap().state,
        BreakpointState::Disabled
    );
}

#[test]
fn stored_points_render_one_line_each() {
    let mut store = BreakpointStore::new();
    for kind in ALL_KINDS {
        store.add_breakpoint(&complete_spec(kind), "python").unwrap();
    }
    let mut counted = BreakpointSpec::line("b.py", 3);
    counted.temporary = true;
    counted.hit_value = Some(2);
    counted.hit_condition = Some(HitCondition::Multiple);
    let id = store.add_breakpoint(&counted, "python").unwrap().id;
    store
        .set_breakpoint_state(id, BreakpointState::Disabled)
        .unwrap();
    store
        .add_spawnpoint(&SpawnpointSpec::new("worker.py", 12), "python")
        .unwrap();

    let listing: Vec<String> = store
        .breakpoints()
        .map(ToString::to_string)
        .chain(store.spawnpoints().map(ToString::to_string))
        .collect();
    expect![[r#"
        breakpoint 1 [enabled] line a.py:10
        breakpoint 2 [enabled] conditional `x > 1`
        breakpoint 3 [enabled] watch `x > 1`
        breakpoint 4 [enabled] exception ValueError
        breakpoint 5 [enabled] call compute
        breakpoint 6 [enabled] return compute
        breakpoint 7 [disabled] line b.py:3 hit % 2 (temporary)
        spawnpoint 1 [enabled] worker.py:12"#]]
    .assert_eq(&listing.join("\n"));
}
