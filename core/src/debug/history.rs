use super::diff::StateChange;
use crate::state::StateAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugHistoryEntry {
    /// All-time action number, starting at 1.
    pub index: u64,
    pub action: StateAction,
    pub prev_state: Value,
    pub next_state: Value,
    pub diff: Vec<StateChange>,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Bounded FIFO of history entries with a running duration sum.
#[derive(Debug)]
pub(crate) struct HistoryRing {
    entries: VecDeque<DebugHistoryEntry>,
    cap: usize,
    total_ms: f64,
}

impl HistoryRing {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(1024)),
            cap,
            total_ms: 0.0,
        }
    }

    /// Append, evicting from the front once the bound is reached.
    pub(crate) fn push(&mut self, entry: DebugHistoryEntry) -> usize {
        if self.cap == 0 {
            return 0;
        }
        let mut evicted = 0;
        while self.entries.len() >= self.cap {
            if let Some(old) = self.entries.pop_front() {
                self.total_ms -= old.duration_ms;
                evicted += 1;
            }
        }
        self.total_ms += entry.duration_ms;
        self.entries.push_back(entry);
        evicted
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&DebugHistoryEntry> {
        self.entries.get(index)
    }

    pub(crate) fn to_vec(&self) -> Vec<DebugHistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.total_ms = 0.0;
    }

    pub(crate) fn average_ms(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            (self.total_ms / self.entries.len() as f64).max(0.0)
        }
    }

    pub(crate) fn max_ms(&self) -> f64 {
        self.entries
            .iter()
            .map(|e| e.duration_ms)
            .fold(0.0, f64::max)
    }
}
