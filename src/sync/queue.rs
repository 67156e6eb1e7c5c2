//! FIFO work queue with a bounded per-entry retry count.
//!
//! A failed entry is pushed to the back of the queue rather than retried in
//! place, so other work proceeds while a flaky upload waits its turn.

use std::collections::{HashMap, VecDeque};

use crate::catalog::CatalogEntry;

/// How many times a failed upload goes back on the queue within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 5 }
    }
}

/// What happened to an entry after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Back on the queue; `retry` is 1-based.
    Requeued { retry: u32, max: u32 },
    /// Out of retries for this run. Stays failed in the catalog.
    Exhausted,
}

/// Work list for one sync run.
///
/// Attempt counts are keyed by entry id and live only as long as the queue.
#[derive(Debug)]
pub struct WorkQueue {
    items: VecDeque<CatalogEntry>,
    retries: HashMap<i64, u32>,
    policy: RetryPolicy,
}

impl WorkQueue {
    pub fn new(entries: Vec<CatalogEntry>, policy: RetryPolicy) -> Self {
        Self {
            items: entries.into(),
            retries: HashMap::new(),
            policy,
        }
    }

    pub fn pop(&mut self) -> Option<CatalogEntry> {
        self.items.pop_front()
    }

    /// Remaining items, including re-queued ones.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Record a failure for `entry` and re-queue it if it has retries left.
    pub fn fail(&mut self, entry: CatalogEntry) -> Disposition {
        let used = self.retries.entry(entry.id).or_insert(0);
        if *used >= self.policy.max_retries {
            return Disposition::Exhausted;
        }
        *used += 1;
        let retry = *used;
        self.items.push_back(entry);
        Disposition::Requeued {
            retry,
            max: self.policy.max_retries,
        }
    }

    /// Retries already spent on an entry in this run.
    pub fn retries_used(&self, id: i64) -> u32 {
        self.retries.get(&id).copied().unwrap_or(0)
    }
}
