use super::diff::{diff_states, StateChange};
use super::history::{DebugHistoryEntry, HistoryRing};
use crate::config::DebugConfig;
use crate::error::StateError;
use crate::state::{DispatchObserver, DispatchRecord, StateStore, StoreState, WeakStore};
use crate::util::lock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugMetrics {
    /// Every action seen since attach, evicted or not.
    pub total_actions: u64,
    pub history_size: usize,
    pub average_action_time_ms: f64,
    pub max_action_time_ms: f64,
    pub total_subscribers: usize,
    pub actions_by_type: BTreeMap<String, u64>,
}

/// What `export_state` writes and `import_state` reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugExport {
    pub store: String,
    pub exported_at: DateTime<Utc>,
    pub state: Value,
    #[serde(default)]
    pub history: Vec<DebugHistoryEntry>,
    #[serde(default)]
    pub metrics: Option<DebugMetrics>,
}

/// Action timeline and timing for one store. Observes dispatches without
/// influencing them.
pub struct StateDebugManager<S: StoreState> {
    config: DebugConfig,
    store: Mutex<Option<WeakStore<S>>>,
    history: Mutex<HistoryRing>,
    total_actions: AtomicU64,
    actions_by_type: Mutex<BTreeMap<String, u64>>,
}

impl<S: StoreState> StateDebugManager<S> {
    pub fn new(config: DebugConfig) -> Self {
        Self {
            history: Mutex::new(HistoryRing::new(config.max_history_size)),
            config,
            store: Mutex::new(None),
            total_actions: AtomicU64::new(0),
            actions_by_type: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &DebugConfig {
        &self.config
    }

    pub fn attach(self: &Arc<Self>, store: &StateStore<S>) -> Result<(), StateError> {
        *lock(&self.store) = Some(store.downgrade());
        store.add_observer(Arc::new(DebugObserver {
            manager: Arc::clone(self),
        }))?;
        debug!(
            store = store.name(),
            max_history_size = self.config.max_history_size,
            "debug recorder attached"
        );
        Ok(())
    }

    fn record(&self, record: &DispatchRecord<S>) {
        let index = self.total_actions.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.actions_by_type)
            .entry(record.action.action_type.clone())
            .or_insert(0) += 1;

        let (prev_state, next_state) =
            match (serde_json::to_value(&*record.prev), serde_json::to_value(&*record.next)) {
                (Ok(prev), Ok(next)) => (prev, next),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(action = %record.action.action_type, error = %e, "state not recordable");
                    return;
                }
            };
        let diff = if record.changed() {
            diff_states(&prev_state, &next_state, self.config.deep_diff)
        } else {
            Vec::new()
        };
        let duration_ms = record.duration.as_secs_f64() * 1000.0;

        if self.config.log_actions {
            debug!(
                action = %record.action.action_type,
                index,
                duration_ms,
                changes = diff.len(),
                "action dispatched"
            );
        }

        let evicted = lock(&self.history).push(DebugHistoryEntry {
            index,
            action: record.action.clone(),
            prev_state,
            next_state,
            diff,
            duration_ms,
            timestamp: Utc::now(),
        });
        if evicted > 0 {
            debug!(evicted, "debug history trimmed");
        }
    }

    pub fn history(&self) -> Vec<DebugHistoryEntry> {
        lock(&self.history).to_vec()
    }

    /// Changes recorded for the most recent action.
    pub fn last_diff(&self) -> Vec<StateChange> {
        let history = lock(&self.history);
        history
            .len()
            .checked_sub(1)
            .and_then(|last| history.get(last))
            .map(|e| e.diff.clone())
            .unwrap_or_default()
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
        debug!("debug history cleared");
    }

    fn live_store(&self) -> Option<StateStore<S>> {
        lock(&self.store).as_ref().and_then(WeakStore::upgrade)
    }

    pub fn get_metrics(&self) -> DebugMetrics {
        let (history_size, average, max) = {
            let history = lock(&self.history);
            (history.len(), history.average_ms(), history.max_ms())
        };
        DebugMetrics {
            total_actions: self.total_actions.load(Ordering::SeqCst),
            history_size,
            average_action_time_ms: average,
            max_action_time_ms: max,
            total_subscribers: self
                .live_store()
                .filter(|s| !s.is_destroyed())
                .map_or(0, |s| s.subscriber_count()),
            actions_by_type: lock(&self.actions_by_type).clone(),
        }
    }

    fn bound_store(&self) -> Result<StateStore<S>, StateError> {
        self.live_store()
            .ok_or_else(|| StateError::Persistence("debug recorder is not attached to a live store".into()))
    }

    /// Current state, history and metrics as pretty JSON.
    pub fn export_state(&self) -> Result<String, StateError> {
        let store = self.bound_store()?;
        let export = DebugExport {
            store: store.name().to_string(),
            exported_at: Utc::now(),
            state: serde_json::to_value(&*store.get_state()?)?,
            history: self.history(),
            metrics: Some(self.get_metrics()),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Apply the state from a debug export. History is not replayed.
    pub fn import_state(&self, serialized: &str) -> Result<(), StateError> {
        let import_err = |e: StateError| StateError::Import(e.to_string());
        let store = self.bound_store().map_err(import_err)?;
        let export: DebugExport = serde_json::from_str(serialized)
            .map_err(StateError::from)
            .map_err(import_err)?;
        let state: S = serde_json::from_value(export.state)
            .map_err(StateError::from)
            .map_err(import_err)?;
        store.replace_state(state).map_err(import_err)?;
        info!(store = store.name(), from = %export.store, "debug export imported");
        Ok(())
    }

    /// Time travel: restore the state recorded after history entry `index`
    /// (position in the retained history, oldest first).
    pub fn jump_to(&self, index: usize) -> Result<(), StateError> {
        let target = {
            let history = lock(&self.history);
            history
                .get(index)
                .map(|e| e.next_state.clone())
                .ok_or(StateError::HistoryOutOfRange {
                    index,
                    len: history.len(),
                })?
        };
        let state: S = serde_json::from_value(target)?;
        self.bound_store()?.replace_state(state)?;
        debug!(index, "jumped to history entry");
        Ok(())
    }
}

struct DebugObserver<S: StoreState> {
    manager: Arc<StateDebugManager<S>>,
}

impl<S: StoreState> DispatchObserver<S> for DebugObserver<S> {
    fn on_dispatch(&self, record: &DispatchRecord<S>) {
        self.manager.record(record);
    }
}
