//! Virtual Machine state
//!
//! The VM holds all execution state:
//! - frames: Stack of loaded programs, the last one is current
//! - hooks: Where `native` instructions and frame teardowns are reported
//! - entry/exit: The frame `run` reports on, and how it ended

use super::exec_loop::run_until_done;
use super::hooks::{NativeHandler, TeardownHook};
use super::types::fault::STACK_OVERFLOW;
use super::types::{Fault, Frame, FrameId, Outcome, Program, Value};
use crate::config::VmConfig;
use std::rc::Rc;
use tracing::{debug, warn};

/* ===================== Errors ===================== */

/// Errors that stop the VM itself
///
/// Script failures are never reported here; they are faults on a frame.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("step limit of {0} exceeded")]
    StepLimit(u64),

    #[error("frame {0} is blocked on a native routine but reached the top of the stack")]
    BlockedFrame(FrameId),

    #[error("no active frame")]
    NoActiveFrame,

    #[error("frame {0} is not loaded")]
    UnknownFrame(FrameId),

    #[error("entry frame did not complete")]
    NoExit,

    #[error(transparent)]
    Hook(#[from] anyhow::Error),
}

/* ===================== VM ===================== */

/// Virtual Machine state
pub struct Vm {
    pub(super) frames: Vec<Frame>,
    pub(super) config: VmConfig,
    pub(super) steps: u64,
    pub(super) native: Option<Rc<dyn NativeHandler>>,
    pub(super) teardown: Option<Rc<dyn TeardownHook>>,
    pub(super) entry: Option<FrameId>,
    pub(super) exit: Option<Outcome>,
    pub(super) last_fault: Option<Fault>,
    pub(super) logged: Vec<Value>,
    next_frame: u64,
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        Vm {
            frames: Vec::new(),
            config,
            steps: 0,
            native: None,
            teardown: None,
            entry: None,
            exit: None,
            last_fault: None,
            logged: Vec::new(),
            next_frame: 1,
        }
    }

    /// Register the handler for `native` instructions, replacing any previous one
    pub fn on_native_call(&mut self, handler: Rc<dyn NativeHandler>) {
        self.native = Some(handler);
    }

    /// Register the frame teardown hook, replacing any previous one
    pub fn on_frame_teardown(&mut self, hook: Rc<dyn TeardownHook>) {
        self.teardown = Some(hook);
    }

    /* ===================== Frame Management ===================== */

    /// Push a new frame for `program`; it becomes the current frame
    ///
    /// Past `max_frames` the frame is still created, but already faulted with
    /// `STACK_OVERFLOW`, so whoever waits on it sees a fault instead of the
    /// VM refusing the load.
    pub fn load_frame(&mut self, program: Rc<Program>) -> FrameId {
        let id = FrameId(self.next_frame);
        self.next_frame += 1;

        let mut frame = Frame::new(id, program);
        if self.frames.len() >= self.config.max_frames {
            warn!(frame = %id, depth = self.frames.len(), "frame limit reached");
            frame.pending_fault = Some(Fault::new(
                STACK_OVERFLOW,
                format!("more than {} frames", self.config.max_frames),
            ));
        }

        debug!(frame = %id, program = %frame.program.name, "frame loaded");
        self.frames.push(frame);
        id
    }

    /// Load the frame whose outcome `run` returns
    pub fn load_entry(&mut self, program: Rc<Program>) -> FrameId {
        let id = self.load_frame(program);
        self.entry = Some(id);
        self.exit = None;
        id
    }

    /// Currently active frame
    pub fn current_frame(&self) -> Option<FrameId> {
        self.frames.last().map(|f| f.id)
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.iter().rev().find(|f| f.id == id)
    }

    fn frame_mut(&mut self, id: FrameId) -> Result<&mut Frame, VmError> {
        self.frames
            .iter_mut()
            .rev()
            .find(|f| f.id == id)
            .ok_or(VmError::UnknownFrame(id))
    }

    /// Number of loaded frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /* ===================== Stack Access ===================== */

    /// Pop from the current frame's stack
    pub fn pop_value(&mut self) -> Option<Value> {
        self.frames.last_mut()?.stack.pop()
    }

    /// Push onto the current frame's stack
    pub fn push_value(&mut self, value: Value) -> Result<(), VmError> {
        let frame = self.frames.last_mut().ok_or(VmError::NoActiveFrame)?;
        frame.stack.push(value);
        Ok(())
    }

    /// Push onto a specific frame's stack
    pub fn push_to(&mut self, id: FrameId, value: Value) -> Result<(), VmError> {
        self.frame_mut(id)?.stack.push(value);
        Ok(())
    }

    /* ===================== Faults & Blocking ===================== */

    /// Deliver a fault to a frame
    ///
    /// The frame handles it on its next step: it jumps to its armed handler
    /// or is torn down as faulted.
    pub fn raise(&mut self, id: FrameId, fault: Fault) -> Result<(), VmError> {
        let frame = self.frame_mut(id)?;
        match &frame.pending_fault {
            Some(existing) => {
                warn!(frame = %id, kept = %existing, dropped = %fault, "frame already has a pending fault");
            }
            None => {
                warn!(frame = %id, %fault, "fault raised on frame");
                frame.pending_fault = Some(fault);
            }
        }
        Ok(())
    }

    /// Mark a frame as waiting on a suspended native routine
    pub fn block(&mut self, id: FrameId) -> Result<(), VmError> {
        self.frame_mut(id)?.blocked = true;
        Ok(())
    }

    pub fn unblock(&mut self, id: FrameId) -> Result<(), VmError> {
        self.frame_mut(id)?.blocked = false;
        Ok(())
    }

    pub fn is_blocked(&self, id: FrameId) -> bool {
        self.frame(id).is_some_and(|f| f.blocked)
    }

    /* ===================== Results ===================== */

    /// Fault of the most recent faulted teardown
    pub fn last_fault(&self) -> Option<&Fault> {
        self.last_fault.as_ref()
    }

    /// Outcome of the entry frame, once it has been torn down
    pub fn exit(&self) -> Option<&Outcome> {
        self.exit.as_ref()
    }

    /// Values written by the `log` instruction, oldest first
    pub fn logged(&self) -> &[Value] {
        &self.logged
    }

    /// Instructions executed so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run until no frames are left and return the entry frame's outcome
    pub fn run(&mut self) -> Result<Outcome, VmError> {
        run_until_done(self)?;
        self.exit.clone().ok_or(VmError::NoExit)
    }

    /// Drop every frame without notifying the teardown hook
    ///
    /// Returns how many frames were dropped. Routines waiting on those frames
    /// are never resumed.
    pub fn abort(&mut self) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        self.entry = None;
        debug!(dropped, "vm aborted");
        dropped
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new(VmConfig::default())
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("frames", &self.frames)
            .field("steps", &self.steps)
            .field("entry", &self.entry)
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}
