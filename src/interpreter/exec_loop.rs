//! Core execution loop
//!
//! This module contains the step() function - the heart of the interpreter.
//! It executes one instruction of the current frame, tears frames down when
//! they return or fault, and hands `native` instructions to the host.
//!
//! ## Function Organization
//! Functions are ordered by importance/call hierarchy:
//! 1. run_until_done() - Top-level driver (calls step repeatedly)
//! 2. step() - Executes one instruction of the current frame
//! 3. execute() - Pure instruction semantics on a single frame

use super::types::fault::{
    BAD_JUMP, DIVISION_BY_ZERO, NO_NATIVE_HANDLER, STACK_UNDERFLOW, THROWN, TYPE_ERROR,
};
use super::types::{Fault, Frame, FrameId, Op, RoutineId, Step, Teardown, Value};
use super::vm::{Vm, VmError};
use anyhow::Context;
use tracing::{debug, info, trace};

/* ===================== Public API ===================== */

/// Run the VM until no frames are left
pub fn run_until_done(vm: &mut Vm) -> Result<(), VmError> {
    loop {
        match step(vm)? {
            Step::Continue => continue,
            Step::Done => return Ok(()),
        }
    }
}

/// Execute one step of the VM
///
/// A step is one of:
/// 1. Handling a fault delivered to the current frame from outside
/// 2. Tearing down the current frame when it ran off the end of its code
/// 3. Executing one instruction
pub fn step(vm: &mut Vm) -> Result<Step, VmError> {
    let Some(frame) = vm.frames.last() else {
        return Ok(Step::Done);
    };
    if frame.blocked {
        return Err(VmError::BlockedFrame(frame.id));
    }
    if let Some(limit) = vm.config.max_steps {
        if vm.steps >= limit {
            return Err(VmError::StepLimit(limit));
        }
    }
    vm.steps += 1;

    let Vm { frames, logged, .. } = vm;
    let Some(frame) = frames.last_mut() else {
        return Ok(Step::Done);
    };

    if let Some(fault) = frame.pending_fault.take() {
        return handle_fault(vm, fault);
    }

    let Some(op) = frame.program.code.get(frame.ip).cloned() else {
        // Ran off the end: same as `ret`
        return finish_frame(vm, None);
    };
    frame.ip += 1;
    trace!(frame = %frame.id, ip = frame.ip - 1, ?op, "exec");

    let caller = frame.id;
    match execute(frame, op, logged) {
        Ok(Flow::Next) => Ok(Step::Continue),
        Ok(Flow::Return) => finish_frame(vm, None),
        Ok(Flow::Native(id)) => call_native(vm, id, caller),
        Err(fault) => handle_fault(vm, fault),
    }
}

/* ===================== Frame Lifecycle ===================== */

/// Route a fault on the current frame: jump to its handler or tear it down
fn handle_fault(vm: &mut Vm, fault: Fault) -> Result<Step, VmError> {
    let Some(frame) = vm.frames.last_mut() else {
        return Ok(Step::Done);
    };

    match frame.handler.take() {
        Some(target) => {
            debug!(frame = %frame.id, %fault, target, "fault caught");
            frame.stack.clear();
            frame.stack.push(Value::Str(fault.message));
            frame.ip = target;
            Ok(Step::Continue)
        }
        None => finish_frame(vm, Some(fault)),
    }
}

/// Pop the current frame and report it to the teardown hook
fn finish_frame(vm: &mut Vm, fault: Option<Fault>) -> Result<Step, VmError> {
    let Some(frame) = vm.frames.pop() else {
        return Ok(Step::Done);
    };

    let teardown = Teardown {
        frame: frame.id,
        fault,
        stack: frame.stack,
    };

    if let Some(fault) = &teardown.fault {
        debug!(frame = %teardown.frame, %fault, "frame faulted");
        vm.last_fault = Some(fault.clone());
    } else {
        debug!(frame = %teardown.frame, "frame returned");
    }
    if vm.entry == Some(teardown.frame) {
        vm.exit = Some(teardown.outcome());
    }

    if let Some(hook) = vm.teardown.clone() {
        let id = teardown.frame;
        hook.on_frame_teardown(vm, teardown)
            .with_context(|| format!("teardown hook failed for frame {id}"))?;
    }

    Ok(Step::Continue)
}

/// Hand a `native` instruction to the host
fn call_native(vm: &mut Vm, id: RoutineId, caller: FrameId) -> Result<Step, VmError> {
    let Some(handler) = vm.native.clone() else {
        return handle_fault(
            vm,
            Fault::new(NO_NATIVE_HANDLER, format!("native #{id} called with no host attached")),
        );
    };

    handler
        .on_native_call(vm, id, caller)
        .with_context(|| format!("native handler failed for #{id}"))?;
    Ok(Step::Continue)
}

/* ===================== Instructions ===================== */

/// What the loop does after an instruction
enum Flow {
    Next,
    Return,
    Native(RoutineId),
}

fn execute(frame: &mut Frame, op: Op, logged: &mut Vec<Value>) -> Result<Flow, Fault> {
    match op {
        Op::PushInt(n) => frame.stack.push(Value::Int(n)),
        Op::PushStr(s) => frame.stack.push(Value::Str(s)),
        Op::PushBytes(b) => frame.stack.push(Value::Bytes(b)),
        Op::PushBool(b) => frame.stack.push(Value::Bool(b)),
        Op::PushNull => frame.stack.push(Value::Null),

        Op::Pop => {
            pop(frame)?;
        }
        Op::Dup => {
            let top = frame
                .stack
                .last()
                .cloned()
                .ok_or_else(|| underflow("dup"))?;
            frame.stack.push(top);
        }
        Op::Swap => {
            let b = pop(frame)?;
            let a = pop(frame)?;
            frame.stack.push(b);
            frame.stack.push(a);
        }

        Op::Add => {
            let b = pop(frame)?;
            let a = pop(frame)?;
            let sum = match (a, b) {
                (Value::Int(a), Value::Int(b)) => Value::Int(checked(a.checked_add(b), "add")?),
                (Value::Str(a), Value::Str(b)) => Value::Str(a + &b),
                (a, b) => return Err(operand_error("add", &a, &b)),
            };
            frame.stack.push(sum);
        }
        Op::Sub | Op::Mul | Op::Div => {
            let b = pop(frame)?;
            let a = pop(frame)?;
            let (Value::Int(x), Value::Int(y)) = (&a, &b) else {
                return Err(operand_error(op_name(&op), &a, &b));
            };
            let result = match op {
                Op::Sub => checked(x.checked_sub(*y), "sub")?,
                Op::Mul => checked(x.checked_mul(*y), "mul")?,
                _ => {
                    if *y == 0 {
                        return Err(Fault::new(DIVISION_BY_ZERO, "division by zero"));
                    }
                    checked(x.checked_div(*y), "div")?
                }
            };
            frame.stack.push(Value::Int(result));
        }
        Op::Eq => {
            let b = pop(frame)?;
            let a = pop(frame)?;
            frame.stack.push(Value::Bool(a == b));
        }
        Op::Not => {
            let v = pop(frame)?;
            frame.stack.push(Value::Bool(!v.is_truthy()));
        }

        Op::Jump(target) => {
            frame.ip = jump_target(frame, target)?;
        }
        Op::JumpIf(target) => {
            let target = jump_target(frame, target)?;
            if pop(frame)?.is_truthy() {
                frame.ip = target;
            }
        }
        Op::Catch(target) => {
            frame.handler = Some(jump_target(frame, target)?);
        }
        Op::Throw => {
            let message = match pop(frame)? {
                Value::Str(s) => s,
                other => other.to_string(),
            };
            return Err(Fault::new(THROWN, message));
        }

        Op::Native(id) => return Ok(Flow::Native(id)),
        Op::Log => {
            let v = pop(frame)?;
            info!(target: "rebound::script", frame = %frame.id, "{}", v);
            logged.push(v);
        }
        Op::Ret => return Ok(Flow::Return),
    }

    Ok(Flow::Next)
}

/* ===================== Helpers ===================== */

fn pop(frame: &mut Frame) -> Result<Value, Fault> {
    frame.stack.pop().ok_or_else(|| underflow("pop"))
}

fn underflow(what: &str) -> Fault {
    Fault::new(STACK_UNDERFLOW, format!("{what} on empty stack"))
}

fn jump_target(frame: &Frame, target: usize) -> Result<usize, Fault> {
    if target > frame.program.code.len() {
        return Err(Fault::new(
            BAD_JUMP,
            format!("target {target} outside `{}`", frame.program.name),
        ));
    }
    Ok(target)
}

fn checked(result: Option<i64>, what: &str) -> Result<i64, Fault> {
    result.ok_or_else(|| Fault::new(TYPE_ERROR, format!("integer overflow in {what}")))
}

fn operand_error(what: &str, a: &Value, b: &Value) -> Fault {
    Fault::new(
        TYPE_ERROR,
        format!("cannot {what} {} and {}", a.kind(), b.kind()),
    )
}

fn op_name(op: &Op) -> &'static str {
    match op {
        Op::Sub => "sub",
        Op::Mul => "mul",
        Op::Div => "div",
        _ => "apply",
    }
}
