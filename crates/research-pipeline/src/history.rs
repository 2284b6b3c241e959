//! In-memory history of completed runs
//!
//! Bounded FIFO; the oldest entry is evicted first. The lock is only held to
//! push, trim or copy entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::pipeline::Stage;
use crate::state::ResearchState;

/// Snapshot of one completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub run_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub stages: Vec<Stage>,
    pub result: ResearchState,
}

impl HistoryEntry {
    pub fn new(run_id: Uuid, stages: Vec<Stage>, result: ResearchState) -> Self {
        Self {
            run_id,
            completed_at: Utc::now(),
            stages,
            result,
        }
    }
}

/// Bounded execution history
#[derive(Debug)]
pub struct ExecutionHistory {
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HistoryEntry>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an entry, evicting from the front past capacity
    pub fn record(&self, entry: HistoryEntry) {
        let mut entries = self.lock();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Oldest-first copy of the retained entries
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<HistoryEntry> {
        self.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new(20)
    }
}
