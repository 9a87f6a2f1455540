//! Host registration points
//!
//! The VM knows nothing about host routines. It hands every `native`
//! instruction to one [`NativeHandler`] and reports every popped frame to one
//! [`TeardownHook`]. Both receive the VM mutably so they can push values,
//! raise faults and load further frames before stepping resumes.
//!
//! An `Err` from either hook is treated as an internal failure of the host
//! layer and halts the VM. Script-visible failures must be delivered as
//! faults instead.

use super::types::{FrameId, RoutineId, Teardown};
use super::vm::Vm;

/// Receives `native` instructions
pub trait NativeHandler {
    /// Called after the instruction pointer moved past the `native`
    /// instruction. `caller` is the frame that executed it.
    fn on_native_call(&self, vm: &mut Vm, id: RoutineId, caller: FrameId) -> anyhow::Result<()>;
}

/// Receives frame teardown notifications
pub trait TeardownHook {
    /// Called immediately after a frame is popped, exactly once per frame.
    fn on_frame_teardown(&self, vm: &mut Vm, teardown: Teardown) -> anyhow::Result<()>;
}
