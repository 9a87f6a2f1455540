//! Single-assignment completion cell for nested invocations
//!
//! A [`CallFuture`] is shared between the routine that issued an invocation
//! (which awaits it) and the pending-call table (which resolves it when the
//! invoked frame is torn down). Both hold clones of the same cell.

use super::error::FutureError;
use crate::interpreter::Fault;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

type Continuation = Box<dyn FnOnce()>;

/// Observable state of a [`CallFuture`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FutureState<T> {
    Pending,
    Succeeded(T),
    Failed(Fault),
}

impl<T> FutureState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, FutureState::Pending)
    }
}

struct Inner<T> {
    state: FutureState<T>,
    continuation: Option<Continuation>,
    registered: bool,
}

/// Eventual outcome of a nested invocation
pub struct CallFuture<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> CallFuture<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: FutureState::Pending,
                continuation: None,
                registered: false,
            })),
        }
    }

    /// Set the callback run when the future resolves
    ///
    /// At most one continuation per future. If the future is already
    /// resolved the callback runs immediately, before this returns.
    pub fn register_continuation(&self, continuation: impl FnOnce() + 'static) -> Result<(), FutureError> {
        let mut inner = self.inner.borrow_mut();
        if inner.registered {
            return Err(FutureError::AlreadyRegistered);
        }
        inner.registered = true;

        if inner.state.is_pending() {
            inner.continuation = Some(Box::new(continuation));
            return Ok(());
        }

        drop(inner);
        continuation();
        Ok(())
    }

    pub fn resolve_value(&self, value: T) -> Result<(), FutureError> {
        self.resolve(FutureState::Succeeded(value))
    }

    pub fn resolve_error(&self, fault: Fault) -> Result<(), FutureError> {
        self.resolve(FutureState::Failed(fault))
    }

    /// Store the outcome and run the continuation synchronously
    fn resolve(&self, outcome: FutureState<T>) -> Result<(), FutureError> {
        let continuation = {
            let mut inner = self.inner.borrow_mut();
            if !inner.state.is_pending() {
                return Err(FutureError::AlreadyResolved);
            }
            inner.state = outcome;
            inner.continuation.take()
        };

        // The borrow is released: the continuation may poll or register on
        // this same future.
        if let Some(continuation) = continuation {
            continuation();
        }
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        !self.inner.borrow().state.is_pending()
    }

    pub fn has_continuation(&self) -> bool {
        self.inner.borrow().registered
    }

    /// Whether both handles refer to the same cell
    pub fn same_as(&self, other: &CallFuture<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> CallFuture<T> {
    /// Current state, without blocking or side effects
    pub fn poll_state(&self) -> FutureState<T> {
        self.inner.borrow().state.clone()
    }

    /// Outcome of a resolved future
    pub fn get_result(&self) -> Result<Result<T, Fault>, FutureError> {
        match &self.inner.borrow().state {
            FutureState::Pending => Err(FutureError::NotReady),
            FutureState::Succeeded(value) => Ok(Ok(value.clone())),
            FutureState::Failed(fault) => Ok(Err(fault.clone())),
        }
    }
}

impl<T> Default for CallFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for CallFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CallFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("CallFuture")
            .field("state", &inner.state)
            .field("registered", &inner.registered)
            .finish()
    }
}

/// Suspension point for routines
///
/// Ready as soon as the future is resolved. A pending poll registers
/// nothing: the driver owns the continuation that re-polls the routine.
impl<T: Clone> Future for CallFuture<T> {
    type Output = Result<T, Fault>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_result() {
            Ok(outcome) => Poll::Ready(outcome),
            Err(_) => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker_ref;
    use std::cell::Cell;

    #[test]
    fn test_resolves_exactly_once() {
        let future = CallFuture::<i64>::new();
        future.resolve_value(1).unwrap();

        assert_eq!(future.resolve_value(2), Err(FutureError::AlreadyResolved));
        assert_eq!(
            future.resolve_error(Fault::new("X", "late")),
            Err(FutureError::AlreadyResolved)
        );
        assert_eq!(future.poll_state(), FutureState::Succeeded(1));
    }

    #[test]
    fn test_continuation_registered_once() {
        let future = CallFuture::<i64>::new();
        future.register_continuation(|| {}).unwrap();

        assert_eq!(
            future.register_continuation(|| {}),
            Err(FutureError::AlreadyRegistered)
        );
    }

    #[test]
    fn test_continuation_runs_synchronously_and_sees_value() {
        let future = CallFuture::<i64>::new();
        let seen = Rc::new(RefCell::new(None));

        let observer = future.clone();
        let sink = Rc::clone(&seen);
        future
            .register_continuation(move || *sink.borrow_mut() = Some(observer.get_result().unwrap()))
            .unwrap();
        assert_eq!(*seen.borrow(), None);

        future.resolve_value(42).unwrap();
        assert_eq!(*seen.borrow(), Some(Ok(42)));
    }

    #[test]
    fn test_continuation_sees_error() {
        let future = CallFuture::<i64>::new();
        let seen = Rc::new(RefCell::new(None));

        let observer = future.clone();
        let sink = Rc::clone(&seen);
        future
            .register_continuation(move || *sink.borrow_mut() = Some(observer.get_result().unwrap()))
            .unwrap();

        future.resolve_error(Fault::new("THROWN", "nope")).unwrap();
        assert_eq!(
            *seen.borrow(),
            Some(Err(Fault::new("THROWN", "nope")))
        );
    }

    #[test]
    fn test_continuation_runs_once() {
        let future = CallFuture::<i64>::new();
        let runs = Rc::new(Cell::new(0));

        let counter = Rc::clone(&runs);
        future
            .register_continuation(move || counter.set(counter.get() + 1))
            .unwrap();
        future.resolve_value(1).unwrap();
        let _ = future.resolve_value(2);

        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_late_registration_fires_immediately() {
        let future = CallFuture::<i64>::new();
        future.resolve_value(7).unwrap();

        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        future.register_continuation(move || flag.set(true)).unwrap();

        assert!(fired.get());
        assert_eq!(
            future.register_continuation(|| {}),
            Err(FutureError::AlreadyRegistered)
        );
    }

    #[test]
    fn test_resolution_retained_without_continuation() {
        let future = CallFuture::<String>::new();
        assert_eq!(future.get_result(), Err(FutureError::NotReady));

        future.resolve_value("done".to_string()).unwrap();
        assert_eq!(future.get_result(), Ok(Ok("done".to_string())));
    }

    #[test]
    fn test_poll_state_is_idempotent() {
        let future = CallFuture::<i64>::new();
        assert_eq!(future.poll_state(), FutureState::Pending);

        future.resolve_value(5).unwrap();
        for _ in 0..3 {
            assert_eq!(future.poll_state(), FutureState::Succeeded(5));
        }
        assert_eq!(future.get_result(), Ok(Ok(5)));
    }

    #[test]
    fn test_await_fast_path() {
        let future = CallFuture::<i64>::new();
        let mut cx = Context::from_waker(noop_waker_ref());

        let mut pending = future.clone();
        assert!(Pin::new(&mut pending).poll(&mut cx).is_pending());
        assert!(!future.has_continuation());

        future.resolve_value(3).unwrap();
        assert_eq!(Pin::new(&mut pending).poll(&mut cx), Poll::Ready(Ok(3)));
    }
}
