//! Continuation driver
//!
//! A suspending routine is an `async` block owned by a [`Task`]. The driver
//! polls it with a no-op waker: nothing ever wakes a task. Instead, after a
//! pending poll, every invocation the routine issued during that poll gets a
//! continuation that re-polls the task when the invoked frame is torn down.
//! Resolution runs continuations synchronously, so the routine advances to
//! its next suspension point inside the teardown hook.

use super::convert::FromValue;
use super::dispatch::DispatchResult;
use super::error::{BridgeError, RoutineError};
use super::journal::JournalEvent;
use super::table::InvocationFuture;
use super::Shared;
use crate::interpreter::faults::{ROUTINE_FAILURE, ROUTINE_STALLED, UNKNOWN_PROCEDURE};
use crate::interpreter::{Fault, FrameId, Program};
use futures::future::LocalBoxFuture;
use futures::task::noop_waker_ref;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use tracing::debug;

/* ===================== Tasks ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TaskId(pub u64);

/// A suspended (or about to be started) routine
pub(crate) struct Task {
    pub id: TaskId,
    /// Frame that executed the `native` instruction
    pub caller: FrameId,
    pub routine: String,
    /// `None` once the routine finished or was dropped
    pub future: RefCell<Option<LocalBoxFuture<'static, DispatchResult>>>,
    /// Invocations issued during the current poll
    issued: RefCell<Vec<InvocationFuture>>,
    /// Issued invocations whose continuation has not run yet
    outstanding: Cell<usize>,
}

impl Task {
    pub fn new(id: TaskId, caller: FrameId, routine: &str) -> Self {
        Self {
            id,
            caller,
            routine: routine.to_string(),
            future: RefCell::new(None),
            issued: RefCell::new(Vec::new()),
            outstanding: Cell::new(0),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.future.borrow().is_none()
    }
}

/// An invocation waiting to be loaded as a frame
pub(crate) struct Issued {
    pub program: Rc<Program>,
    pub future: InvocationFuture,
    pub caller: FrameId,
}

/* ===================== Routine Context ===================== */

/// Handle a suspending routine uses to re-enter the interpreter
///
/// Every invocation becomes a new frame, loaded once the routine yields
/// back to the dispatcher. Awaiting the returned future suspends the
/// routine until that frame is torn down.
#[derive(Clone)]
pub struct NativeCtx {
    shared: Weak<Shared>,
    task: Weak<Task>,
}

impl NativeCtx {
    pub(crate) fn new(shared: &Rc<Shared>, task: &Rc<Task>) -> Self {
        Self {
            shared: Rc::downgrade(shared),
            task: Rc::downgrade(task),
        }
    }

    /// Frame that called the routine
    pub fn caller(&self) -> Option<FrameId> {
        self.task.upgrade().map(|task| task.caller)
    }

    /// Run `program` in a new frame
    pub fn invoke(&self, program: Rc<Program>) -> InvocationFuture {
        let future = InvocationFuture::new();
        let (Some(shared), Some(task)) = (self.shared.upgrade(), self.task.upgrade()) else {
            // Bridge dropped under a live routine: fail the await instead of hanging
            let _ = future.resolve_error(Fault::new(ROUTINE_FAILURE, "bridge is no longer installed"));
            return future;
        };

        debug!(caller = %task.caller, routine = %task.routine, program = %program.name, "invocation issued");
        shared.outbox.borrow_mut().push(Issued {
            program,
            future: future.clone(),
            caller: task.caller,
        });
        task.issued.borrow_mut().push(future.clone());
        future
    }

    /// Run the library procedure `name` in a new frame
    pub fn invoke_named(&self, name: &str) -> Result<InvocationFuture, RoutineError> {
        let program = match self.shared.upgrade() {
            Some(shared) => {
                let found = shared.library.borrow().get(name);
                found
            }
            None => None,
        };
        match program {
            Some(program) => Ok(self.invoke(program)),
            None => Err(Fault::new(UNKNOWN_PROCEDURE, format!("no procedure named `{name}`")).into()),
        }
    }

    /// Run `name` and convert its result
    pub async fn call<T: FromValue>(&self, name: &str) -> Result<T, RoutineError> {
        let value = self.invoke_named(name)?.await?;
        Ok(T::from_value(value)?)
    }
}

impl std::fmt::Debug for NativeCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeCtx")
            .field("caller", &self.caller())
            .finish_non_exhaustive()
    }
}

/* ===================== Driving ===================== */

/// Poll `task` once
///
/// On completion the result is queued for delivery to the calling frame. On
/// a pending poll each newly issued invocation gets a continuation that
/// re-polls the task; a pending routine with nothing outstanding can never
/// resume and is failed with `ROUTINE_STALLED`.
pub(crate) fn drive(shared: &Rc<Shared>, task: &Rc<Task>) -> Result<(), BridgeError> {
    let poll = {
        let mut slot = task.future.borrow_mut();
        let Some(future) = slot.as_mut() else {
            return Ok(());
        };
        let mut cx = Context::from_waker(noop_waker_ref());
        let poll = future.as_mut().poll(&mut cx);
        if poll.is_ready() {
            *slot = None;
        }
        poll
    };
    let issued = std::mem::take(&mut *task.issued.borrow_mut());

    match poll {
        Poll::Ready(result) => {
            if !issued.is_empty() {
                debug!(routine = %task.routine, count = issued.len(), "routine finished with invocations still in flight");
            }
            shared.finish(task.caller, &task.routine, result);
            shared.tasks.borrow_mut().remove(&task.id);
        }
        Poll::Pending => {
            for future in issued {
                task.outstanding.set(task.outstanding.get() + 1);
                let weak_shared = Rc::downgrade(shared);
                let weak_task = Rc::downgrade(task);
                future.register_continuation(move || resume(&weak_shared, &weak_task))?;
            }

            if task.outstanding.get() == 0 {
                let stalled = task.future.borrow_mut().take();
                drop(stalled);
                let fault = Fault::new(
                    ROUTINE_STALLED,
                    format!("`{}` suspended without a pending invocation", task.routine),
                );
                shared.finish(task.caller, &task.routine, DispatchResult::Fault(fault));
                shared.tasks.borrow_mut().remove(&task.id);
            }
        }
    }
    Ok(())
}

/// Continuation body: one outstanding invocation finished, re-poll
fn resume(shared: &Weak<Shared>, task: &Weak<Task>) {
    let (Some(shared), Some(task)) = (shared.upgrade(), task.upgrade()) else {
        return;
    };
    task.outstanding.set(task.outstanding.get().saturating_sub(1));
    shared.journal.record(JournalEvent::Resumed {
        caller: task.caller,
        routine: task.routine.clone(),
    });

    if let Err(err) = drive(&shared, &task) {
        shared.fail(err);
    }
}
