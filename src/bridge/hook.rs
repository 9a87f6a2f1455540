//! Frame-completion hook

use super::journal::JournalEvent;
use super::Shared;
use crate::interpreter::{Teardown, TeardownHook, Vm};
use std::rc::Rc;
use tracing::debug;

/// [`TeardownHook`] installed by the bridge
///
/// Resolves the future of the invocation that loaded the torn-down frame.
/// Resolution re-polls the waiting routine on the spot; whatever it issued
/// or finished is then flushed into the VM before stepping continues.
pub struct CompletionHook {
    shared: Rc<Shared>,
}

impl CompletionHook {
    pub(crate) fn new(shared: Rc<Shared>) -> Self {
        Self { shared }
    }
}

impl TeardownHook for CompletionHook {
    fn on_frame_teardown(&self, vm: &mut Vm, mut teardown: Teardown) -> anyhow::Result<()> {
        let frame = teardown.frame;
        self.shared.journal.record(JournalEvent::FrameTornDown {
            frame,
            faulted: teardown.faulted(),
        });

        // Table borrow must end before resolving: the routine may issue more.
        let pending = self.shared.table.borrow_mut().remove(frame);
        let Some(future) = pending else {
            return self.shared.flush(vm);
        };

        debug!(frame = %frame, faulted = teardown.faulted(), "resolving nested invocation");
        let resolved = match teardown.fault.take() {
            Some(fault) => future.resolve_error(fault),
            None => future.resolve_value(teardown.pop_value()),
        };
        if let Err(err) = resolved {
            self.shared.fail(err.into());
        }

        self.shared.flush(vm)
    }
}

impl std::fmt::Debug for CompletionHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHook")
            .field("pending", &self.shared.table.borrow().len())
            .finish()
    }
}
