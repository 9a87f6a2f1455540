//! Tests for faults inside frames
//!
//! Faults either unwind to the frame's `catch` handler or end the frame

use super::helpers::{build_vm, build_vm_with, returned, run};
use crate::config::VmConfig;
use crate::interpreter::faults;
use crate::interpreter::{Fault, Outcome, Value, VmError};

fn fault_code(outcome: Outcome) -> String {
    let Outcome::Faulted(fault) = outcome else {
        unreachable!("Expected Outcome::Faulted, got {:?}", outcome);
    };
    fault.code
}

#[test]
fn test_stack_underflow_faults_frame() {
    let source = r#"
        proc main
            pop
        end
    "#;

    assert_eq!(fault_code(run(source)), faults::STACK_UNDERFLOW);
}

#[test]
fn test_type_error() {
    let source = r#"
        proc main
            push 1
            push "x"
            sub
        end
    "#;

    let Outcome::Faulted(fault) = run(source) else {
        unreachable!("Expected a fault");
    };
    assert_eq!(fault.code, faults::TYPE_ERROR);
    assert!(fault.message.contains("cannot sub int and str"));
}

#[test]
fn test_division_by_zero() {
    let source = r#"
        proc main
            push 1
            push 0
            div
        end
    "#;

    assert_eq!(fault_code(run(source)), faults::DIVISION_BY_ZERO);
}

#[test]
fn test_overflow_faults() {
    let source = r#"
        proc main
            push 9223372036854775807
            push 1
            add
        end
    "#;

    assert_eq!(fault_code(run(source)), faults::TYPE_ERROR);
}

#[test]
fn test_throw_with_message() {
    let source = r#"
        proc main
            push "boom"
            throw
        end
    "#;

    assert_eq!(
        run(source),
        Outcome::Faulted(Fault::new(faults::THROWN, "boom"))
    );
}

#[test]
fn test_catch_receives_message_and_continues() {
    let source = r#"
        proc main
            catch handler
            push 5
            push "boom"
            throw
            push 99
            ret
        handler:
            push " handled"
            add
        end
    "#;

    assert_eq!(run(source), returned(Value::Str("boom handled".to_string())));
}

#[test]
fn test_handler_is_disarmed_after_use() {
    let source = r#"
        proc main
            catch handler
            push "first"
            throw
        handler:
            pop
            push "second"
            throw
        end
    "#;

    assert_eq!(
        run(source),
        Outcome::Faulted(Fault::new(faults::THROWN, "second"))
    );
}

#[test]
fn test_last_fault_recorded() {
    let source = r#"
        proc main
            push "oops"
            throw
        end
    "#;

    let mut vm = build_vm(source);
    vm.run().unwrap();
    assert_eq!(vm.last_fault().unwrap().message, "oops");
}

#[test]
fn test_raise_on_frame_from_outside() {
    let source = r#"
        proc main
            catch handler
            push 1
            ret
        handler:
        end
    "#;

    let mut vm = build_vm(source);
    let main = vm.current_frame().unwrap();

    // arm the handler first
    crate::interpreter::step(&mut vm).unwrap();
    vm.raise(main, Fault::new("HOST", "from outside")).unwrap();

    assert_eq!(vm.run().unwrap(), returned(Value::Str("from outside".to_string())));
}

#[test]
fn test_native_without_handler_faults() {
    let source = r#"
        proc main
            native 1
        end
    "#;

    assert_eq!(fault_code(run(source)), faults::NO_NATIVE_HANDLER);
}

#[test]
fn test_step_limit() {
    let source = r#"
        proc main
        spin:
            jump spin
        end
    "#;

    let config = VmConfig {
        max_steps: Some(100),
        ..VmConfig::default()
    };
    let mut vm = build_vm_with(source, config);

    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::StepLimit(100)));
}

#[test]
fn test_frame_limit_loads_faulted_frame() {
    let source = r#"
        proc main
            push 1
        end
    "#;

    let config = VmConfig {
        max_frames: 1,
        ..VmConfig::default()
    };
    let mut vm = build_vm_with(source, config);
    let library = super::helpers::library(source);
    vm.load_frame(library.get("main").unwrap());

    crate::interpreter::run_until_done(&mut vm).unwrap();
    assert_eq!(vm.last_fault().unwrap().code, faults::STACK_OVERFLOW);
    // The entry frame itself was within the limit
    assert_eq!(vm.exit(), Some(&returned(Value::Int(1))));
}

#[test]
fn test_blocked_frame_on_top_is_internal_error() {
    let source = r#"
        proc main
            push 1
        end
    "#;

    let mut vm = build_vm(source);
    let main = vm.current_frame().unwrap();
    vm.block(main).unwrap();

    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::BlockedFrame(id) if id == main));
}
