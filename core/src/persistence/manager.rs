use super::backend::StorageBackend;
use super::envelope::{self, PersistenceEnvelope};
use super::migration::Migrations;
use crate::config::PersistenceConfig;
use crate::error::StateError;
use crate::state::{DispatchObserver, DispatchRecord, StateStore, StoreState, WeakStore};
use crate::util::lock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceStats {
    pub backend: String,
    pub key: String,
    pub enabled: bool,
    pub compression: bool,
    /// Dispatches handed to the writer.
    pub staged: u64,
    pub writes: u64,
    pub failed_writes: u64,
    pub last_written_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// A refused envelope is in storage and will not be overwritten.
    pub writes_suspended: bool,
}

/// Mirrors one store into a storage backend.
///
/// Writes are debounced: a burst of dispatches settles into a single write of
/// the latest state. Each staged state carries a sequence number and the
/// writer never stores a sequence older than one already written. Failed
/// writes are logged and counted, never retried, and never touch the
/// in-memory state.
///
/// A stored envelope that cannot be migrated (for example one written by a
/// newer schema) is left in place: writes stay suspended until `clear`.
pub struct StatePersistenceManager<S: StoreState> {
    config: PersistenceConfig,
    backend: Arc<dyn StorageBackend>,
    migrations: Migrations,
    store: Mutex<Option<WeakStore<S>>>,
    pending: Mutex<Option<(u64, Arc<S>)>>,
    staged: AtomicU64,
    written: tokio::sync::Mutex<u64>,
    writes: AtomicU64,
    failed_writes: AtomicU64,
    last_written_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
    suspended: AtomicBool,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl<S: StoreState> StatePersistenceManager<S> {
    pub fn new(config: PersistenceConfig, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            config,
            backend,
            migrations: Migrations::new(),
            store: Mutex::new(None),
            pending: Mutex::new(None),
            staged: AtomicU64::new(0),
            written: tokio::sync::Mutex::new(0),
            writes: AtomicU64::new(0),
            failed_writes: AtomicU64::new(0),
            last_written_at: Mutex::new(None),
            last_error: Mutex::new(None),
            suspended: AtomicBool::new(false),
            writer: Mutex::new(None),
        }
    }

    pub fn with_migrations(mut self, migrations: Migrations) -> Self {
        self.migrations = migrations;
        self
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.store).is_some()
    }

    /// Read the stored state. Anything unusable yields `None`: a backend
    /// failure or a refused envelope is logged, a malformed payload is also
    /// removed from storage.
    pub async fn load(&self) -> Option<S> {
        if !self.config.enabled {
            return None;
        }

        let key = &self.config.key;
        let raw = match self.backend.get_item(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %key, backend = self.backend.name(), "no persisted state");
                return None;
            }
            Err(e) => {
                warn!(key = %key, backend = self.backend.name(), error = %e, "persisted state unreadable");
                return None;
            }
        };

        match self.restore(&raw) {
            Ok(state) => {
                info!(key = %key, backend = self.backend.name(), "persisted state restored");
                Some(state)
            }
            Err(StateError::Migration(reason)) => {
                self.suspended.store(true, Ordering::SeqCst);
                warn!(key = %key, reason = %reason, "persisted state refused; writes suspended");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "discarding malformed persisted state");
                if let Err(e) = self.backend.remove_item(key).await {
                    warn!(key = %key, error = %e, "failed to remove malformed state");
                }
                None
            }
        }
    }

    fn restore(&self, raw: &str) -> Result<S, StateError> {
        let stored = envelope::decode(raw)?;
        let current = self.migrations.migrate(stored, self.config.schema_version)?;
        Ok(serde_json::from_value(current.state)?)
    }

    /// Bind to `store`. With persistence enabled this also starts the
    /// debounced writer, which needs a tokio runtime.
    pub fn attach(self: &Arc<Self>, store: &StateStore<S>) -> Result<(), StateError> {
        {
            let mut bound = lock(&self.store);
            if bound.is_some() {
                return Err(StateError::Persistence("already attached to a store".into()));
            }
            *bound = Some(store.downgrade());
        }
        if !self.config.enabled {
            debug!(store = store.name(), "persistence disabled; writer not started");
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StateError::Persistence(format!("writer needs a tokio runtime: {e}")))?;
        let (wake, rx) = watch::channel(0u64);
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let handle = runtime.spawn(Arc::clone(self).run_writer(rx, debounce));
        *lock(&self.writer) = Some(handle);

        store.add_observer(Arc::new(PersistenceObserver {
            manager: Arc::clone(self),
            wake: Mutex::new(Some(wake)),
        }))?;
        debug!(
            store = store.name(),
            backend = self.backend.name(),
            key = %self.config.key,
            debounce_ms = self.config.debounce_ms,
            "persistence attached"
        );
        Ok(())
    }

    async fn run_writer(self: Arc<Self>, mut rx: watch::Receiver<u64>, debounce: Duration) {
        while rx.changed().await.is_ok() {
            // each new dispatch restarts the quiet period; a closed channel ends it
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(debounce) => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            if let Err(e) = self.write_pending().await {
                warn!(key = %self.config.key, error = %e, "state write failed");
            }
        }

        // store destroyed: one last write of whatever is still staged
        if let Err(e) = self.write_pending().await {
            warn!(key = %self.config.key, error = %e, "final state write failed");
        }
        debug!(key = %self.config.key, "persistence writer stopped");
    }

    fn stage(&self, state: Arc<S>) -> u64 {
        let seq = self.staged.fetch_add(1, Ordering::SeqCst) + 1;
        let mut pending = lock(&self.pending);
        if !matches!(pending.as_ref(), Some((held, _)) if *held >= seq) {
            *pending = Some((seq, state));
        }
        seq
    }

    fn take_pending(&self) -> Option<(u64, Arc<S>)> {
        lock(&self.pending).take()
    }

    /// Write the latest staged state, if it is newer than what is stored.
    async fn write_pending(&self) -> Result<bool, StateError> {
        let mut written = self.written.lock().await;
        let Some((seq, state)) = self.take_pending() else {
            return Ok(false);
        };
        if seq <= *written {
            return Ok(false);
        }
        if self.suspended.load(Ordering::SeqCst) {
            debug!(key = %self.config.key, seq, "write skipped; stored state was refused");
            return Ok(false);
        }

        match self.write_state(&state).await {
            Ok(()) => {
                *written = seq;
                self.writes.fetch_add(1, Ordering::Relaxed);
                *lock(&self.last_written_at) = Some(Utc::now());
                debug!(key = %self.config.key, seq, "state written");
                Ok(true)
            }
            Err(e) => {
                self.failed_writes.fetch_add(1, Ordering::Relaxed);
                *lock(&self.last_error) = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn write_state(&self, state: &S) -> Result<(), StateError> {
        let envelope = PersistenceEnvelope::new(self.config.schema_version, serde_json::to_value(state)?);
        let raw = envelope::encode(&envelope, self.config.compression)?;
        self.backend
            .set_item(&self.config.key, &raw)
            .await
            .map_err(|e| StateError::Persistence(format!("{}: {e:#}", self.backend.name())))
    }

    /// Write any staged state now instead of waiting out the debounce.
    pub async fn flush(&self) -> Result<bool, StateError> {
        self.write_pending().await
    }

    /// Drop the staged state and remove the stored one.
    pub async fn clear(&self) -> Result<(), StateError> {
        let _written = self.written.lock().await;
        self.take_pending();
        self.backend
            .remove_item(&self.config.key)
            .await
            .map_err(|e| StateError::Persistence(format!("{}: {e:#}", self.backend.name())))?;
        self.suspended.store(false, Ordering::SeqCst);
        info!(key = %self.config.key, "persisted state cleared");
        Ok(())
    }

    /// Wait for the writer to exit. It exits once the store is destroyed.
    pub async fn join_writer(&self) {
        let handle = lock(&self.writer).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "persistence writer ended abnormally");
            }
        }
    }

    pub fn stats(&self) -> PersistenceStats {
        PersistenceStats {
            backend: self.backend.name().to_string(),
            key: self.config.key.clone(),
            enabled: self.config.enabled,
            compression: self.config.compression,
            staged: self.staged.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
            last_written_at: *lock(&self.last_written_at),
            last_error: lock(&self.last_error).clone(),
            writes_suspended: self.suspended.load(Ordering::SeqCst),
        }
    }

    fn bound_store(&self) -> Result<StateStore<S>, StateError> {
        lock(&self.store)
            .as_ref()
            .and_then(WeakStore::upgrade)
            .ok_or_else(|| StateError::Persistence("not attached to a live store".into()))
    }

    /// Current state as a pretty-printed envelope, whatever the backend.
    pub fn export_state(&self) -> Result<String, StateError> {
        let state = self.bound_store()?.get_state()?;
        let envelope = PersistenceEnvelope::new(self.config.schema_version, serde_json::to_value(&*state)?);
        Ok(serde_json::to_string_pretty(&envelope)?)
    }

    /// Apply an exported envelope (or a bare state). On any failure the
    /// store is left as it was.
    pub fn import_state(&self, serialized: &str) -> Result<(), StateError> {
        let store = self.bound_store().map_err(|e| StateError::Import(e.to_string()))?;
        let state = self
            .parse_import(serialized)
            .map_err(|e| StateError::Import(e.to_string()))?;
        store
            .replace_state(state)
            .map_err(|e| StateError::Import(e.to_string()))?;
        info!(store = store.name(), "state imported");
        Ok(())
    }

    fn parse_import(&self, serialized: &str) -> Result<S, StateError> {
        let value = envelope::decode_value(serialized.trim())?;
        let state = if PersistenceEnvelope::looks_like(&value) {
            let stored: PersistenceEnvelope = serde_json::from_value(value)?;
            self.migrations.migrate(stored, self.config.schema_version)?.state
        } else {
            value
        };
        Ok(serde_json::from_value(state)?)
    }
}

struct PersistenceObserver<S: StoreState> {
    manager: Arc<StatePersistenceManager<S>>,
    wake: Mutex<Option<watch::Sender<u64>>>,
}

impl<S: StoreState> DispatchObserver<S> for PersistenceObserver<S> {
    fn on_dispatch(&self, record: &DispatchRecord<S>) {
        if !record.changed() {
            return;
        }
        let wake = lock(&self.wake);
        if let Some(tx) = wake.as_ref() {
            let seq = self.manager.stage(Arc::clone(&record.next));
            tx.send_replace(seq);
        }
    }

    fn on_destroy(&self) {
        lock(&self.wake).take();
    }
}
