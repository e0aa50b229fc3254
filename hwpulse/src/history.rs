//! Small utilities to manage the bounded in-memory snapshot window.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::types::Snapshot;

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    if cap == 0 {
        return;
    }
    while dq.len() >= cap {
        dq.pop_front();
    }
    dq.push_back(v);
}

// Keeps the most recent snapshots with a fixed capacity; nothing is persisted
pub struct SnapshotHistory {
    entries: VecDeque<Arc<Snapshot>>,
    cap: usize,
}

impl SnapshotHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, snap: Arc<Snapshot>) {
        push_capped(&mut self.entries, snap, self.cap);
    }

    // Oldest first
    pub fn to_vec(&self) -> Vec<Arc<Snapshot>> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_capped_drops_oldest() {
        let mut dq = VecDeque::new();
        for i in 0..5 {
            push_capped(&mut dq, i, 3);
        }
        assert_eq!(dq, VecDeque::from(vec![2, 3, 4]));
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut dq = VecDeque::new();
        push_capped(&mut dq, 1, 0);
        assert!(dq.is_empty());
    }
}
