//! # Interpreter - Frame-Stack VM
//!
//! A small stack machine that runs one frame at a time and reports to the
//! host through two registration points.
//!
//! ## Core Principles
//!
//! 1. **Stack of frames**: All state in `frames: Vec<Frame>`, no recursion;
//!    the last frame is the only one that steps
//! 2. **Host at the edges**: `native` instructions go to a [`NativeHandler`],
//!    popped frames go to a [`TeardownHook`]
//! 3. **Faults are values**: Script errors unwind a frame to its `catch`
//!    handler or tear it down as faulted; they never escape as Rust errors

pub mod asm;
pub mod exec_loop;
pub mod hooks;
pub mod types;
pub mod vm;

#[cfg(test)]
mod tests;

// Re-export commonly used items
pub use exec_loop::{run_until_done, step};
pub use hooks::{NativeHandler, TeardownHook};
pub use types::fault as faults;
pub use types::{
    Fault, Frame, FrameId, Library, Op, Outcome, Program, RoutineId, Step, Teardown, Value,
    ValueKind,
};
pub use vm::{Vm, VmError};
