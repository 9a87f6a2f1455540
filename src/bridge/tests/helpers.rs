//! Test helpers for bridge tests
//!
//! A registry of small routines covering every dispatch shape, and a harness
//! that assembles a program against it and runs it with the journal on.

use crate::bridge::{Bridge, FromValue, JournalEvent, NativeCtx, Registry, RoutineError};
use crate::config::{BridgeConfig, VmConfig};
use crate::interpreter::{asm, FrameId, Outcome, RoutineId, Value, Vm};
use std::rc::Rc;

pub const DOUBLE: RoutineId = 1;
pub const SUB2: RoutineId = 2;
pub const NOOP: RoutineId = 3;
pub const FAIL_SYNC: RoutineId = 4;
pub const INVOKE: RoutineId = 10;
pub const TRY_INVOKE: RoutineId = 11;
pub const SUM_THEN_REPORT: RoutineId = 12;
pub const CALL_BOTH: RoutineId = 13;
pub const BOTH_AT_ONCE: RoutineId = 14;
pub const FIRE_AND_FORGET: RoutineId = 15;
pub const STALL: RoutineId = 16;

/* ===================== Routines ===================== */

fn double((n,): (i64,)) -> Result<i64, RoutineError> {
    n.checked_mul(2)
        .ok_or_else(|| RoutineError::msg(format!("{n} * 2 overflows")))
}

fn sub2((a, b): (i64, i64)) -> Result<i64, RoutineError> {
    a.checked_sub(b)
        .ok_or_else(|| RoutineError::msg(format!("{a} - {b} overflows")))
}

fn noop((): ()) -> Result<(), RoutineError> {
    Ok(())
}

fn fail_sync((): ()) -> Result<(), RoutineError> {
    Err(RoutineError::msg("boom"))
}

async fn invoke(ctx: NativeCtx, (name,): (String,)) -> Result<Option<Value>, RoutineError> {
    Ok(ctx.invoke_named(&name)?.await?)
}

async fn try_invoke(ctx: NativeCtx, (name,): (String,)) -> Result<Value, RoutineError> {
    match ctx.invoke_named(&name)?.await {
        Ok(value) => Ok(value.unwrap_or(Value::Null)),
        Err(fault) => Ok(Value::Str(fault.message)),
    }
}

async fn sum_then_report(ctx: NativeCtx, (): ()) -> Result<i64, RoutineError> {
    let answer: i64 = ctx.call("answer").await?;
    answer
        .checked_sub(10)
        .ok_or_else(|| RoutineError::msg(format!("{answer} - 10 overflows")))
}

async fn call_both(ctx: NativeCtx, (): ()) -> Result<(), RoutineError> {
    ctx.call::<Option<Value>>("call_a").await?;
    ctx.call::<Option<Value>>("call_b").await?;
    Ok(())
}

async fn both_at_once(ctx: NativeCtx, (): ()) -> Result<i64, RoutineError> {
    let left = ctx.invoke_named("left")?;
    let right = ctx.invoke_named("right")?;
    let (left, right) = futures::join!(left, right);
    Ok(i64::from_value(left?)? + i64::from_value(right?)?)
}

async fn fire_and_forget(ctx: NativeCtx, (name,): (String,)) -> Result<i64, RoutineError> {
    let _ignored = ctx.invoke_named(&name)?;
    Ok(1)
}

async fn stall(_ctx: NativeCtx, (): ()) -> Result<(), RoutineError> {
    futures::future::pending::<()>().await;
    Ok(())
}

pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register_sync(DOUBLE, "double", double)
        .and_then(|r| r.register_sync(SUB2, "sub2", sub2))
        .and_then(|r| r.register_sync(NOOP, "noop", noop))
        .and_then(|r| r.register_sync(FAIL_SYNC, "fail_sync", fail_sync))
        .and_then(|r| r.register_suspending(INVOKE, "invoke", invoke))
        .and_then(|r| r.register_suspending(TRY_INVOKE, "try_invoke", try_invoke))
        .and_then(|r| r.register_suspending(SUM_THEN_REPORT, "sum_then_report", sum_then_report))
        .and_then(|r| r.register_suspending(CALL_BOTH, "call_both", call_both))
        .and_then(|r| r.register_suspending(BOTH_AT_ONCE, "both_at_once", both_at_once))
        .and_then(|r| r.register_suspending(FIRE_AND_FORGET, "fire_and_forget", fire_and_forget))
        .and_then(|r| r.register_suspending(STALL, "stall", stall))
        .expect("Registration failed");
    registry
}

/* ===================== Harness ===================== */

pub struct Harness {
    pub vm: Vm,
    pub bridge: Bridge,
    pub main: FrameId,
}

impl Harness {
    pub fn run(&mut self) -> Outcome {
        self.vm.run().expect("VM error")
    }

    pub fn journal(&self) -> Vec<JournalEvent> {
        self.bridge.journal()
    }

    /// Nothing pending, nothing suspended
    pub fn assert_settled(&self) {
        assert_eq!(self.bridge.pending(), 0, "pending calls left");
        assert_eq!(self.bridge.suspended(), 0, "suspended routines left");
    }
}

pub fn harness(source: &str) -> Harness {
    harness_with(source, VmConfig::default())
}

/// Assemble `source` against the test registry and load its `main`
pub fn harness_with(source: &str, config: VmConfig) -> Harness {
    let registry = registry();
    let library = asm::assemble_library(source, &registry.symbols()).expect("Assemble failed");
    let main = library.get("main").expect("No `main` procedure");

    let bridge = Bridge::with_config(registry, &BridgeConfig { journal: true }).with_library(library);
    let mut vm = Vm::new(config);
    bridge.install(&mut vm);
    let main = vm.load_entry(Rc::clone(&main));

    Harness { vm, bridge, main }
}

pub fn returned(v: Value) -> Outcome {
    Outcome::Returned(Some(v))
}

pub fn faulted_code(outcome: &Outcome) -> &str {
    match outcome {
        Outcome::Faulted(fault) => &fault.code,
        other => unreachable!("Expected Outcome::Faulted, got {:?}", other),
    }
}
