//! Frames and their outcomes

use super::fault::Fault;
use super::ops::Program;
use super::values::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/* ===================== Frames ===================== */

/// Opaque frame handle
///
/// Allocated from a per-VM counter and never reused, so a handle stays
/// unambiguous after its frame is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Execution frame - one per loaded program
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: FrameId,
    pub program: Rc<Program>,
    /// Index of the next instruction
    pub ip: usize,
    /// Operand stack
    pub stack: Vec<Value>,
    /// Armed `catch` target, if any
    pub handler: Option<usize>,
    /// Fault delivered from outside (e.g. by a native routine), handled on
    /// the frame's next step
    pub pending_fault: Option<Fault>,
    /// Waiting on a suspended native routine; must not be stepped
    pub blocked: bool,
}

impl Frame {
    pub fn new(id: FrameId, program: Rc<Program>) -> Self {
        Self {
            id,
            program,
            ip: 0,
            stack: Vec::new(),
            handler: None,
            pending_fault: None,
            blocked: false,
        }
    }
}

/* ===================== Teardown ===================== */

/// A frame that was just popped, as reported to the teardown hook
#[derive(Debug, Clone)]
pub struct Teardown {
    pub frame: FrameId,
    /// Uncaught fault that ended the frame, if it faulted
    pub fault: Option<Fault>,
    /// What was left on the frame's stack
    pub stack: Vec<Value>,
}

impl Teardown {
    pub fn faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Pop the frame's final stack value, if one exists
    pub fn pop_value(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    /// Outcome of the frame without consuming the teardown
    pub fn outcome(&self) -> Outcome {
        match &self.fault {
            Some(fault) => Outcome::Faulted(fault.clone()),
            None => Outcome::Returned(self.stack.last().cloned()),
        }
    }
}

/// How a frame ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Outcome {
    /// Returned normally; `None` is the void result
    Returned(Option<Value>),
    Faulted(Fault),
}

/* ===================== Step Result ===================== */

/// Result of executing one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Continue to next step
    Continue,
    /// No frames left
    Done,
}
