//! Native-call dispatcher
//!
//! Entry point for every `native` instruction. Synchronous and suspending
//! routines go through the same path and end the same way: a queued
//! [`DispatchResult`] for the calling frame, delivered by [`Shared::flush`].
//! Any failure on the way becomes a fault on that frame.

use super::driver::{drive, NativeCtx, Task};
use super::error::DispatchError;
use super::journal::JournalEvent;
use super::registry::Body;
use super::Shared;
use crate::interpreter::{Fault, FrameId, NativeHandler, RoutineId, Value, Vm};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::debug;

/// Final result of a dispatch, however many times the routine suspended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum DispatchResult {
    /// Nothing is pushed
    Void,
    /// Pushed on the calling frame
    Value(Value),
    /// Raised on the calling frame
    Fault(Fault),
}

/// [`NativeHandler`] installed by the bridge
pub struct Dispatcher {
    shared: Rc<Shared>,
}

impl Dispatcher {
    pub(crate) fn new(shared: Rc<Shared>) -> Self {
        Self { shared }
    }

    /// Start routine `id` for `caller`
    ///
    /// Returns `Ok(true)` if the routine suspended.
    fn start(&self, vm: &mut Vm, id: RoutineId, caller: FrameId) -> Result<bool, DispatchError> {
        let shared = &self.shared;
        let routine = shared
            .registry
            .get(id)
            .ok_or(DispatchError::UnknownRoutine(id))?;
        let name = &routine.descriptor.name;

        shared.journal.record(JournalEvent::DispatchStarted {
            caller,
            routine: name.clone(),
            id,
        });
        let args = pop_args(vm, name, routine.descriptor.arity())?;

        match &routine.body {
            Body::Sync(body) => {
                let result = body(args)?;
                shared.finish(caller, name, result);
                Ok(false)
            }
            Body::Suspending(body) => {
                let task = Rc::new(Task::new(shared.next_task_id(), caller, name));
                let future = body(NativeCtx::new(shared, &task), args)?;
                *task.future.borrow_mut() = Some(future);
                shared.tasks.borrow_mut().insert(task.id, Rc::clone(&task));

                if let Err(err) = drive(shared, &task) {
                    shared.fail(err);
                }
                Ok(!task.is_finished())
            }
        }
    }
}

impl NativeHandler for Dispatcher {
    fn on_native_call(&self, vm: &mut Vm, id: RoutineId, caller: FrameId) -> anyhow::Result<()> {
        match self.start(vm, id, caller) {
            Ok(true) => {
                debug!(routine = id, caller = %caller, "routine suspended");
                vm.block(caller)?;
            }
            Ok(false) => {}
            Err(err) => {
                let routine = self
                    .shared
                    .registry
                    .get(id)
                    .map_or_else(|| format!("#{id}"), |r| r.descriptor.name.clone());
                self.shared
                    .finish(caller, &routine, DispatchResult::Fault(err.into_fault()));
            }
        }

        self.shared.flush(vm)
    }
}

/// Pop `arity` arguments off the calling frame, first argument first
fn pop_args(vm: &mut Vm, routine: &str, arity: usize) -> Result<Vec<Value>, DispatchError> {
    let mut args = Vec::with_capacity(arity);
    for _ in 0..arity {
        match vm.pop_value() {
            Some(value) => args.push(value),
            None => {
                return Err(DispatchError::Arity {
                    routine: routine.to_string(),
                    expected: arity,
                    found: args.len(),
                });
            }
        }
    }
    args.reverse();
    Ok(args)
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routines", &self.shared.registry.len())
            .finish()
    }
}

