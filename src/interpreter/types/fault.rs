//! Interpreter-level faults
//!
//! A fault is the interpreter's error value: it unwinds a frame unless the
//! frame armed a `catch` handler. Codes are stable strings so scripts and
//! host routines can match on them.

use serde::{Deserialize, Serialize};

/// Fault raised inside a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Fault {
    pub code: String,
    pub message: String,
}

impl Fault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/* ===================== Fault Codes ===================== */

pub const STACK_UNDERFLOW: &str = "STACK_UNDERFLOW";
pub const STACK_OVERFLOW: &str = "STACK_OVERFLOW";
pub const TYPE_ERROR: &str = "TYPE_ERROR";
pub const DIVISION_BY_ZERO: &str = "DIVISION_BY_ZERO";
pub const BAD_JUMP: &str = "BAD_JUMP";
/// Raised by the `throw` instruction
pub const THROWN: &str = "THROWN";
/// No native handler is installed on the VM
pub const NO_NATIVE_HANDLER: &str = "NO_NATIVE_HANDLER";
pub const UNKNOWN_ROUTINE: &str = "UNKNOWN_ROUTINE";
pub const ARGUMENT_CONVERSION: &str = "ARGUMENT_CONVERSION";
pub const ROUTINE_FAILURE: &str = "ROUTINE_FAILURE";
/// A routine suspended without any nested invocation that could resume it
pub const ROUTINE_STALLED: &str = "ROUTINE_STALLED";
pub const UNKNOWN_PROCEDURE: &str = "UNKNOWN_PROCEDURE";
