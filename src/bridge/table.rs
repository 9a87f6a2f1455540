//! Pending nested invocations, keyed by the frame they wait on

use super::error::BridgeError;
use super::future::CallFuture;
use crate::interpreter::{FrameId, Value};
use std::collections::HashMap;

/// Result of a nested invocation: the frame's final stack value, if any
pub type InvocationFuture = CallFuture<Option<Value>>;

/// Frame -> future of the invocation that loaded it
///
/// Entries are inserted when the invoked frame is loaded and removed once,
/// when it is torn down.
#[derive(Debug, Default)]
pub struct PendingCallTable {
    entries: HashMap<FrameId, InvocationFuture>,
}

impl PendingCallTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, frame: FrameId, future: InvocationFuture) -> Result<(), BridgeError> {
        if self.entries.contains_key(&frame) {
            return Err(BridgeError::DuplicateFrame(frame));
        }
        if self.entries.values().any(|pending| pending.same_as(&future)) {
            return Err(BridgeError::SharedFuture(frame));
        }
        self.entries.insert(frame, future);
        Ok(())
    }

    pub fn remove(&mut self, frame: FrameId) -> Option<InvocationFuture> {
        self.entries.remove(&frame)
    }

    pub fn contains(&self, frame: FrameId) -> bool {
        self.entries.contains_key(&frame)
    }

    /// Frames with a pending invocation, oldest first
    pub fn frames(&self) -> Vec<FrameId> {
        let mut frames: Vec<_> = self.entries.keys().copied().collect();
        frames.sort();
        frames
    }

    /// Drop every entry without resolving it
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_appears_once() {
        let mut table = PendingCallTable::new();
        table.insert(FrameId(1), CallFuture::new()).unwrap();

        assert_eq!(
            table.insert(FrameId(1), CallFuture::new()),
            Err(BridgeError::DuplicateFrame(FrameId(1)))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_future_under_one_frame_only() {
        let mut table = PendingCallTable::new();
        let future = CallFuture::new();
        table.insert(FrameId(1), future.clone()).unwrap();

        assert_eq!(
            table.insert(FrameId(2), future),
            Err(BridgeError::SharedFuture(FrameId(2)))
        );
    }

    #[test]
    fn test_remove_exactly_once() {
        let mut table = PendingCallTable::new();
        table.insert(FrameId(4), CallFuture::new()).unwrap();
        table.insert(FrameId(2), CallFuture::new()).unwrap();
        assert_eq!(table.frames(), vec![FrameId(2), FrameId(4)]);

        assert!(table.remove(FrameId(4)).is_some());
        assert!(table.remove(FrameId(4)).is_none());
        assert!(!table.contains(FrameId(4)));
        assert_eq!(table.clear(), 1);
        assert!(table.is_empty());
    }
}
