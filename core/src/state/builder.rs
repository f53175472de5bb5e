use super::reducer::{NoopReducer, Reducer};
use super::store::StateStore;
use super::types::StoreState;
use crate::config::DebugConfig;
use crate::context::StateContext;
use crate::debug::StateDebugManager;
use crate::error::StateError;
use crate::persistence::StatePersistenceManager;
use std::sync::Arc;
use tracing::debug;

type RestoreHook<S> = Box<dyn FnOnce(S) -> S + Send>;

/// Teardown priority for stores: after facade timers, before anything
/// registered at the default priority.
pub const STORE_CLEANUP_PRIORITY: i32 = 10;

/// A store wired to its optional persistence and debug managers.
pub struct BuiltStore<S: StoreState> {
    pub store: StateStore<S>,
    pub persistence: Option<Arc<StatePersistenceManager<S>>>,
    pub debug: Option<Arc<StateDebugManager<S>>>,
}

pub struct StoreBuilder<S: StoreState> {
    name: String,
    initial: S,
    reducer: Box<dyn Reducer<S>>,
    persistence: Option<Arc<StatePersistenceManager<S>>>,
    debug: Option<DebugConfig>,
    on_restore: Option<RestoreHook<S>>,
    cleanup_priority: i32,
}

impl<S: StoreState> StoreBuilder<S> {
    pub fn new(name: impl Into<String>, initial: S) -> Self {
        Self {
            name: name.into(),
            initial,
            reducer: Box::new(NoopReducer),
            persistence: None,
            debug: None,
            on_restore: None,
            cleanup_priority: STORE_CLEANUP_PRIORITY,
        }
    }

    pub fn reducer<R: Reducer<S> + 'static>(mut self, reducer: R) -> Self {
        self.reducer = Box::new(reducer);
        self
    }

    pub fn persistence(mut self, manager: Arc<StatePersistenceManager<S>>) -> Self {
        self.persistence = Some(manager);
        self
    }

    /// Records a timeline when `config.enabled`.
    pub fn debug(mut self, config: DebugConfig) -> Self {
        self.debug = Some(config);
        self
    }

    /// Adjust a restored state before the store starts with it.
    pub fn on_restore<F>(mut self, f: F) -> Self
    where
        F: FnOnce(S) -> S + Send + 'static,
    {
        self.on_restore = Some(Box::new(f));
        self
    }

    pub fn cleanup_priority(mut self, priority: i32) -> Self {
        self.cleanup_priority = priority;
        self
    }

    /// Reserve the name, restore persisted state, create the store and wire
    /// teardown, persistence and debugging.
    pub async fn build(self, ctx: &StateContext) -> Result<BuiltStore<S>, StateError> {
        let reservation = ctx.registry().reserve(&self.name)?;

        let mut current = None;
        if let Some(persistence) = &self.persistence {
            if let Some(restored) = persistence.load().await {
                current = Some(match self.on_restore {
                    Some(hook) => hook(restored),
                    None => restored,
                });
            }
        }

        let store = StateStore::from_parts(
            self.name.clone(),
            self.initial,
            current,
            self.reducer,
            Some(reservation),
        );

        ctx.wire_teardown(&store, self.cleanup_priority)?;

        if let Some(persistence) = &self.persistence {
            persistence.attach(&store)?;
        }

        let debug = match self.debug {
            Some(config) if config.enabled => {
                let manager = Arc::new(StateDebugManager::new(config));
                manager.attach(&store)?;
                Some(manager)
            }
            _ => None,
        };

        let debug_enabled = debug.is_some();
        debug!(
            store = %self.name,
            persistence = self.persistence.is_some(),
            debug = debug_enabled,
            "store built"
        );
        Ok(BuiltStore {
            store,
            persistence: self.persistence,
            debug,
        })
    }
}
