//! Tests for synchronous dispatch and argument marshaling

use super::helpers::{faulted_code, harness, returned, DOUBLE};
use crate::bridge::{DispatchResult, JournalEvent};
use crate::interpreter::{faults, Outcome, Value};

#[test]
fn test_sync_round_trip() {
    let source = r#"
        proc main
            push 21
            native double
            ret
        end
    "#;

    let mut h = harness(source);
    assert_eq!(h.run(), returned(Value::Int(42)));
    h.assert_settled();

    let main = h.main;
    assert_eq!(
        h.journal(),
        vec![
            JournalEvent::DispatchStarted {
                caller: main,
                routine: "double".to_string(),
                id: DOUBLE,
            },
            JournalEvent::RoutineFinished {
                caller: main,
                routine: "double".to_string(),
                result: DispatchResult::Value(Value::Int(42)),
            },
            JournalEvent::FrameTornDown {
                frame: main,
                faulted: false,
            },
        ]
    );
}

#[test]
fn test_last_argument_on_top() {
    let source = r#"
        proc main
            push 10
            push 3
            native sub2
        end
    "#;

    assert_eq!(harness(source).run(), returned(Value::Int(7)));
}

#[test]
fn test_void_result_pushes_nothing() {
    let source = r#"
        proc main
            push 5
            native noop
        end
    "#;

    let mut h = harness(source);
    assert_eq!(h.run(), returned(Value::Int(5)));
    assert!(h.journal().contains(&JournalEvent::RoutineFinished {
        caller: h.main,
        routine: "noop".to_string(),
        result: DispatchResult::Void,
    }));
}

#[test]
fn test_routine_failure_faults_caller() {
    let source = r#"
        proc main
            native fail_sync
            push 1
        end
    "#;

    let mut h = harness(source);
    let outcome = h.run();
    assert_eq!(faulted_code(&outcome), faults::ROUTINE_FAILURE);

    let Outcome::Faulted(fault) = outcome else {
        unreachable!();
    };
    assert!(fault.message.contains("fail_sync"));
    assert!(fault.message.contains("boom"));
}

#[test]
fn test_routine_failure_caught_by_script() {
    let source = r#"
        proc main
            catch handler
            native fail_sync
            push 1
            ret
        handler:
        end
    "#;

    assert_eq!(
        harness(source).run(),
        returned(Value::Str("`fail_sync` failed: boom".to_string()))
    );
}

#[test]
fn test_unknown_routine() {
    let source = r#"
        proc main
            native 99
        end
    "#;

    let outcome = harness(source).run();
    assert_eq!(faulted_code(&outcome), faults::UNKNOWN_ROUTINE);
}

#[test]
fn test_argument_shape_mismatch() {
    let source = r#"
        proc main
            push "x"
            native double
        end
    "#;

    let Outcome::Faulted(fault) = harness(source).run() else {
        unreachable!("Expected a fault");
    };
    assert_eq!(fault.code, faults::ARGUMENT_CONVERSION);
    assert!(fault.message.contains("argument 0 of `double`"));
    assert!(fault.message.contains("expected int, found str"));
}

#[test]
fn test_missing_argument() {
    let source = r#"
        proc main
            native sub2
        end
    "#;

    let Outcome::Faulted(fault) = harness(source).run() else {
        unreachable!("Expected a fault");
    };
    assert_eq!(fault.code, faults::ARGUMENT_CONVERSION);
    assert_eq!(fault.message, "`sub2` takes 2 arguments, found 0 on the stack");
}

#[test]
fn test_short_argument_list() {
    let source = r#"
        proc main
            push 5
            native sub2
        end
    "#;

    let Outcome::Faulted(fault) = harness(source).run() else {
        unreachable!("Expected a fault");
    };
    assert_eq!(fault.code, faults::ARGUMENT_CONVERSION);
    assert!(fault.message.contains("found 1 on the stack"));
    assert!(!fault.message.contains("argument 0"));
}
