//! Built-in host routines
//!
//! These are the routines the `rebound` binary registers. Programs refer to
//! them by name (`native sum_then_report`); the assembler resolves names
//! through [`registry`]'s symbol table.

use crate::bridge::{NativeCtx, Registry, RegistryError, RoutineError};
use crate::interpreter::{RoutineId, Value};
use tracing::info;

pub const PRINT: RoutineId = 1;
pub const ADD: RoutineId = 2;
pub const CONCAT: RoutineId = 3;
pub const INVOKE: RoutineId = 10;
pub const TRY_INVOKE: RoutineId = 11;
pub const SUM_THEN_REPORT: RoutineId = 12;
pub const CALL_BOTH: RoutineId = 13;

/// Registry with every built-in routine
pub fn registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    registry
        .register_sync(PRINT, "print", print)?
        .register_sync(ADD, "add", add)?
        .register_sync(CONCAT, "concat", concat)?
        .register_suspending(INVOKE, "invoke", invoke)?
        .register_suspending(TRY_INVOKE, "try_invoke", try_invoke)?
        .register_suspending(SUM_THEN_REPORT, "sum_then_report", sum_then_report)?
        .register_suspending(CALL_BOTH, "call_both", call_both)?;
    Ok(registry)
}

/* ===================== Synchronous ===================== */

/// Write a value to stdout
///
/// Arguments: (value: any)
fn print((value,): (Value,)) -> Result<(), RoutineError> {
    info!(target: "rebound::print", %value);
    println!("{}", value);
    Ok(())
}

/// Arguments: (a: int, b: int)
fn add((a, b): (i64, i64)) -> Result<i64, RoutineError> {
    a.checked_add(b)
        .ok_or_else(|| RoutineError::msg(format!("{a} + {b} overflows")))
}

/// Arguments: (a: str, b: str)
fn concat((a, b): (String, String)) -> Result<String, RoutineError> {
    Ok(a + &b)
}

/* ===================== Suspending ===================== */

/// Run a procedure and return its result
///
/// Arguments: (procedure: str)
/// A fault inside the procedure is raised on the caller unchanged.
async fn invoke(ctx: NativeCtx, (name,): (String,)) -> Result<Option<Value>, RoutineError> {
    Ok(ctx.invoke_named(&name)?.await?)
}

/// Like `invoke`, but a fault becomes its message
///
/// Arguments: (procedure: str)
async fn try_invoke(ctx: NativeCtx, (name,): (String,)) -> Result<Value, RoutineError> {
    match ctx.invoke_named(&name)?.await {
        Ok(value) => Ok(value.unwrap_or(Value::Null)),
        Err(fault) => Ok(Value::Str(fault.message)),
    }
}

/// Run `answer`, report its result minus ten
async fn sum_then_report(ctx: NativeCtx, (): ()) -> Result<i64, RoutineError> {
    let answer: i64 = ctx.call("answer").await?;
    let report = answer
        .checked_sub(10)
        .ok_or_else(|| RoutineError::msg(format!("{answer} - 10 overflows")))?;
    info!(answer, report, "sum_then_report");
    Ok(report)
}

/// Run `call_a`, then `call_b`
async fn call_both(ctx: NativeCtx, (): ()) -> Result<(), RoutineError> {
    ctx.call::<Option<Value>>("call_a").await?;
    ctx.call::<Option<Value>>("call_b").await?;
    Ok(())
}
