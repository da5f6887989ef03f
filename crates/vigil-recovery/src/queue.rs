//! The bounded queue of operations waiting for connectivity.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use vigil_core::{PendingActionKind, Timestamp};

/// One deferred operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub kind: PendingActionKind,
    /// When the session layer gave up on doing it directly.
    pub recorded_at: Timestamp,
    /// Failed replays so far.
    pub retry_count: u32,
}

impl PendingAction {
    pub fn new(kind: PendingActionKind, recorded_at: Timestamp) -> Self {
        Self {
            kind,
            recorded_at,
            retry_count: 0,
        }
    }
}

/// FIFO of pending actions that sheds its oldest entries in bulk.
///
/// Pushing past `max_len` keeps only the newest `trim_to` entries, so a
/// long outage can't grow the queue without bound and the operations most
/// likely to still matter survive.
#[derive(Debug)]
pub(crate) struct PendingQueue {
    actions: VecDeque<PendingAction>,
    max_len: usize,
    trim_to: usize,
}

impl PendingQueue {
    pub(crate) fn new(max_len: usize, trim_to: usize) -> Self {
        Self {
            actions: VecDeque::with_capacity(max_len + 1),
            max_len,
            trim_to: trim_to.min(max_len),
        }
    }

    /// Appends `action`, returning how many old entries were evicted.
    pub(crate) fn push(&mut self, action: PendingAction) -> usize {
        self.actions.push_back(action);
        if self.actions.len() <= self.max_len {
            return 0;
        }
        let evicted = self.actions.len() - self.trim_to;
        self.actions.drain(..evicted);
        evicted
    }

    /// Empties the queue, handing back everything that was in it.
    pub(crate) fn take_all(&mut self) -> VecDeque<PendingAction> {
        std::mem::take(&mut self.actions)
    }

    pub(crate) fn contains(&self, kind: PendingActionKind) -> bool {
        self.actions.iter().any(|a| a.kind == kind)
    }

    /// Discards everything queued before the newest `kind` entry, returning
    /// how many were dropped.
    pub(crate) fn drop_before_last(&mut self, kind: PendingActionKind) -> usize {
        let Some(last) = self.actions.iter().rposition(|a| a.kind == kind) else {
            return 0;
        };
        self.actions.drain(..last);
        last
    }

    pub(crate) fn to_vec(&self) -> Vec<PendingAction> {
        self.actions.iter().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.actions.len()
    }

    pub(crate) fn clear(&mut self) {
        self.actions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(ms: u64) -> PendingAction {
        PendingAction::new(PendingActionKind::Refresh, Timestamp::from_millis(ms))
    }

    #[test]
    fn test_push_under_limit_keeps_everything_in_order() {
        let mut queue = PendingQueue::new(10, 5);

        for ms in 0..10 {
            assert_eq!(queue.push(action(ms)), 0);
        }

        let stamps: Vec<u64> = queue.to_vec().iter().map(|a| a.recorded_at.0).collect();
        assert_eq!(stamps, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_push_over_limit_trims_to_newest() {
        let mut queue = PendingQueue::new(10, 5);
        for ms in 0..10 {
            queue.push(action(ms));
        }

        let evicted = queue.push(action(10));

        assert_eq!(evicted, 6);
        let stamps: Vec<u64> = queue.to_vec().iter().map(|a| a.recorded_at.0).collect();
        assert_eq!(stamps, vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_drop_before_last_keeps_newest_match_and_later_entries() {
        let mut queue = PendingQueue::new(10, 5);
        for kind in [
            PendingActionKind::Refresh,
            PendingActionKind::Logout,
            PendingActionKind::ExtendSession,
            PendingActionKind::Logout,
            PendingActionKind::Refresh,
        ] {
            queue.push(PendingAction::new(kind, Timestamp::from_millis(0)));
        }

        let dropped = queue.drop_before_last(PendingActionKind::Logout);

        assert_eq!(dropped, 3);
        let kinds: Vec<_> = queue.to_vec().into_iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![PendingActionKind::Logout, PendingActionKind::Refresh]);
    }

    #[test]
    fn test_drop_before_last_without_match_keeps_everything() {
        let mut queue = PendingQueue::new(10, 5);
        queue.push(action(1));

        assert_eq!(queue.drop_before_last(PendingActionKind::Logout), 0);
        assert!(!queue.contains(PendingActionKind::Logout));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_take_all_leaves_queue_empty() {
        let mut queue = PendingQueue::new(10, 5);
        queue.push(action(1));
        queue.push(action(2));

        let taken = queue.take_all();

        assert_eq!(taken.len(), 2);
        assert_eq!(queue.len(), 0);
    }
}
