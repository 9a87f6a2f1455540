//! Static checks on assembled programs
//!
//! Catches what the VM would otherwise only report at run time: jumps that
//! leave the program and `native` instructions no routine answers to.

use crate::interpreter::types::{Op, Program, RoutineId};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub program: String,
    pub index: usize,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]: {}", self.program, self.index, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a program
///
/// `is_known` reports whether a routine id is registered.
pub fn validate(program: &Program, is_known: impl Fn(RoutineId) -> bool) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let len = program.code.len();

    for (index, op) in program.code.iter().enumerate() {
        let mut report = |message: String| {
            errors.push(ValidationError {
                program: program.name.clone(),
                index,
                message,
            })
        };

        match op {
            Op::Jump(target) | Op::JumpIf(target) | Op::Catch(target) if *target > len => {
                report(format!("target {} is past the end ({})", target, len));
            }
            Op::Native(id) if !is_known(*id) => {
                report(format!("no routine registered for native #{}", id));
            }
            _ => {}
        }
    }

    errors
}
