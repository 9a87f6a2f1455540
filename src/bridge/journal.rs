//! Ordered record of bridge events
//!
//! Every event is logged at debug level; when enabled the journal also keeps
//! them so tests and the CLI can inspect the exact interleaving of dispatch,
//! frame loads, teardowns and resumptions.

use super::dispatch::DispatchResult;
use crate::interpreter::{FrameId, RoutineId};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEvent {
    /// A `native` instruction reached the dispatcher
    DispatchStarted {
        caller: FrameId,
        routine: String,
        id: RoutineId,
    },
    /// A nested invocation's frame was loaded
    FrameLoaded {
        frame: FrameId,
        program: String,
        caller: FrameId,
    },
    FrameTornDown { frame: FrameId, faulted: bool },
    /// A suspended routine was re-polled after its future resolved
    Resumed { caller: FrameId, routine: String },
    RoutineFinished {
        caller: FrameId,
        routine: String,
        result: DispatchResult,
    },
}

#[derive(Debug, Default)]
pub struct Journal {
    enabled: bool,
    events: RefCell<Vec<JournalEvent>>,
}

impl Journal {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            events: RefCell::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&self, event: JournalEvent) {
        debug!(?event, "bridge");
        if self.enabled {
            self.events.borrow_mut().push(event);
        }
    }

    /// Recorded events, oldest first
    pub fn events(&self) -> Vec<JournalEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_journal_keeps_nothing() {
        let journal = Journal::new(false);
        journal.record(JournalEvent::FrameTornDown {
            frame: FrameId(1),
            faulted: false,
        });
        assert!(!journal.is_enabled());
        assert!(journal.events().is_empty());
    }

    #[test]
    fn test_clear_drops_recorded_events() {
        let journal = Journal::new(true);
        assert!(journal.is_enabled());
        journal.record(JournalEvent::FrameTornDown {
            frame: FrameId(1),
            faulted: true,
        });
        assert_eq!(journal.events().len(), 1);

        journal.clear();
        assert!(journal.events().is_empty());
    }

    #[test]
    fn test_events_serialize_tagged() {
        let event = JournalEvent::Resumed {
            caller: FrameId(3),
            routine: "invoke".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"resumed","caller":3,"routine":"invoke"}"#);
    }
}
