//! # Bridge - Re-entrant Native Calls
//!
//! Lets a host routine called by the interpreter invoke more interpreter
//! code and wait for it, without blocking the stepping loop or spawning
//! threads.
//!
//! ## Flow
//!
//! 1. `native` instruction -> [`Dispatcher`] pops arguments and starts the
//!    routine. Synchronous routines finish at once.
//! 2. A suspending routine (`async` block) issues invocations through
//!    [`NativeCtx`] and awaits their [`CallFuture`]s. If it is pending, its
//!    calling frame is blocked and stepping continues.
//! 3. [`Shared::flush`] loads the issued frames (recording them in the
//!    [`PendingCallTable`]) and delivers finished results to calling frames.
//! 4. When an invoked frame is torn down, [`CompletionHook`] resolves its
//!    future, which re-polls the routine synchronously, then flushes again.
//!
//! Everything is `Rc`/`RefCell` based and lives on the interpreter's thread.

pub mod convert;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod future;
pub mod hook;
pub mod journal;
pub mod registry;
pub mod table;

#[cfg(test)]
mod tests;

pub use convert::{FromArgs, FromValue, IntoDispatch, IntoValue};
pub use dispatch::{DispatchResult, Dispatcher};
pub use driver::NativeCtx;
pub use error::{BridgeError, ConversionError, DispatchError, FutureError, RegistryError, RoutineError};
pub use future::{CallFuture, FutureState};
pub use hook::CompletionHook;
pub use journal::{Journal, JournalEvent};
pub use registry::{Registry, Routine, RoutineDescriptor, RoutineMode};
pub use table::{InvocationFuture, PendingCallTable};

use crate::config::BridgeConfig;
use crate::interpreter::{FrameId, Library, Vm};
use driver::{Issued, Task, TaskId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, error};

/* ===================== Shared State ===================== */

/// A finished dispatch waiting to reach its calling frame
struct Completion {
    caller: FrameId,
    result: DispatchResult,
}

/// State shared by the dispatcher, the hook and running routines
pub(crate) struct Shared {
    registry: Registry,
    library: RefCell<Library>,
    table: RefCell<PendingCallTable>,
    tasks: RefCell<HashMap<TaskId, Rc<Task>>>,
    /// Invocations issued but not loaded yet
    outbox: RefCell<Vec<Issued>>,
    completions: RefCell<Vec<Completion>>,
    journal: Journal,
    next_task: Cell<u64>,
    /// First internal error raised inside a continuation
    fatal: RefCell<Option<BridgeError>>,
}

impl Shared {
    fn next_task_id(&self) -> TaskId {
        let id = self.next_task.get();
        self.next_task.set(id + 1);
        TaskId(id)
    }

    /// Queue a routine's final result for its calling frame
    fn finish(&self, caller: FrameId, routine: &str, result: DispatchResult) {
        debug!(caller = %caller, routine, ?result, "routine finished");
        self.journal.record(JournalEvent::RoutineFinished {
            caller,
            routine: routine.to_string(),
            result: result.clone(),
        });
        self.completions.borrow_mut().push(Completion { caller, result });
    }

    /// Record an internal error; the next flush halts the VM with it
    fn fail(&self, err: BridgeError) {
        error!(error = %err, "bridge invariant violated");
        let mut fatal = self.fatal.borrow_mut();
        if fatal.is_none() {
            *fatal = Some(err);
        }
    }

    /// Apply everything queued since the last flush
    ///
    /// Issued invocations are loaded first, in issue order (the last one
    /// issued runs first), then finished results reach their calling frames.
    fn flush(&self, vm: &mut Vm) -> anyhow::Result<()> {
        if let Some(err) = self.fatal.borrow_mut().take() {
            return Err(err.into());
        }

        let issued = std::mem::take(&mut *self.outbox.borrow_mut());
        for Issued {
            program,
            future,
            caller,
        } in issued
        {
            let name = program.name.clone();
            let frame = vm.load_frame(program);
            self.journal.record(JournalEvent::FrameLoaded {
                frame,
                program: name,
                caller,
            });
            self.table.borrow_mut().insert(frame, future)?;
        }

        let completions = std::mem::take(&mut *self.completions.borrow_mut());
        for Completion { caller, result } in completions {
            vm.unblock(caller)?;
            match result {
                DispatchResult::Void => {}
                DispatchResult::Value(value) => vm.push_to(caller, value)?,
                DispatchResult::Fault(fault) => vm.raise(caller, fault)?,
            }
        }

        Ok(())
    }
}

/* ===================== Bridge ===================== */

/// Re-entrant native calls for one [`Vm`]
///
/// ```ignore
/// let bridge = Bridge::new(stdlib::registry()?).with_library(library);
/// bridge.install(&mut vm);
/// let outcome = vm.run()?;
/// ```
pub struct Bridge {
    shared: Rc<Shared>,
}

impl Bridge {
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, &BridgeConfig::default())
    }

    pub fn with_config(registry: Registry, config: &BridgeConfig) -> Self {
        Self {
            shared: Rc::new(Shared {
                registry,
                library: RefCell::new(Library::new()),
                table: RefCell::new(PendingCallTable::new()),
                tasks: RefCell::new(HashMap::new()),
                outbox: RefCell::new(Vec::new()),
                completions: RefCell::new(Vec::new()),
                journal: Journal::new(config.journal),
                next_task: Cell::new(1),
                fatal: RefCell::new(None),
            }),
        }
    }

    /// Procedures routines can invoke by name
    pub fn with_library(self, library: Library) -> Self {
        self.set_library(library);
        self
    }

    pub fn set_library(&self, library: Library) {
        *self.shared.library.borrow_mut() = library;
    }

    /// Register the dispatcher and completion hook on `vm`
    ///
    /// A bridge serves one VM at a time: frame ids are per VM.
    pub fn install(&self, vm: &mut Vm) {
        vm.on_native_call(Rc::new(Dispatcher::new(Rc::clone(&self.shared))));
        vm.on_frame_teardown(Rc::new(CompletionHook::new(Rc::clone(&self.shared))));
    }

    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    /// Recorded events, oldest first (empty unless the journal is enabled)
    pub fn journal(&self) -> Vec<JournalEvent> {
        self.shared.journal.events()
    }

    /// Number of invoked frames still waiting to be torn down
    pub fn pending(&self) -> usize {
        self.shared.table.borrow().len()
    }

    pub fn pending_frames(&self) -> Vec<FrameId> {
        self.shared.table.borrow().frames()
    }

    /// Number of routines currently suspended
    pub fn suspended(&self) -> usize {
        self.shared.tasks.borrow().len()
    }

    /// Drop every pending invocation and suspended routine without resolving
    ///
    /// Meant to pair with [`Vm::abort`]: nothing is resumed into a VM whose
    /// frames are gone. Returns how many table entries were dropped.
    pub fn abandon(&self) -> usize {
        let dropped = self.shared.table.borrow_mut().clear();
        let tasks = std::mem::take(&mut *self.shared.tasks.borrow_mut());
        let outbox = std::mem::take(&mut *self.shared.outbox.borrow_mut());
        self.shared.completions.borrow_mut().clear();
        self.shared.fatal.borrow_mut().take();

        debug!(dropped, routines = tasks.len(), unloaded = outbox.len(), "bridge abandoned");
        drop(tasks);
        drop(outbox);
        dropped
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("registry", &self.shared.registry)
            .field("pending", &self.pending())
            .field("suspended", &self.suspended())
            .finish()
    }
}
