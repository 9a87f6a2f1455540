//! Type definitions for the interpreter
//!
//! This module contains all the core types used by the VM:
//! - Stack values (Value)
//! - Instructions and programs (Op, Program, Library)
//! - Frames and their outcomes (Frame, Teardown, Outcome)
//! - Faults (Fault and its codes)

pub mod control;
pub mod fault;
pub mod ops;
pub mod values;

// Re-export all types for convenient access
pub use control::{Frame, FrameId, Outcome, Step, Teardown};
pub use fault::Fault;
pub use ops::{Library, Op, Program, RoutineId};
pub use values::{Value, ValueKind};
