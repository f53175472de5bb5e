use crate::cleanup::{CleanupManager, CleanupReport, CleanupTask, RegisterOptions};
use crate::config::CleanupConfig;
use crate::error::StateError;
use crate::state::{
    NoopReducer, Reducer, StateStore, StoreBuilder, StoreRegistry, StoreState,
    STORE_CLEANUP_PRIORITY,
};

/// Process-wide coordinators, created once at startup and passed explicitly
/// to whatever creates stores.
#[derive(Clone)]
pub struct StateContext {
    cleanup: CleanupManager,
    registry: StoreRegistry,
}

impl StateContext {
    pub fn new(cleanup: CleanupConfig) -> Self {
        Self::with_cleanup(CleanupManager::new(cleanup))
    }

    pub fn with_cleanup(cleanup: CleanupManager) -> Self {
        Self {
            cleanup,
            registry: StoreRegistry::new(),
        }
    }

    pub fn cleanup(&self) -> &CleanupManager {
        &self.cleanup
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    /// A named store with only the built-in actions. Fails with
    /// `already exists` while another live store holds `name`.
    pub fn create_store<S: StoreState>(
        &self,
        name: &str,
        initial: S,
    ) -> Result<StateStore<S>, StateError> {
        self.create_store_with(name, initial, NoopReducer)
    }

    pub fn create_store_with<S, R>(
        &self,
        name: &str,
        initial: S,
        reducer: R,
    ) -> Result<StateStore<S>, StateError>
    where
        S: StoreState,
        R: Reducer<S> + 'static,
    {
        let reservation = self.registry.reserve(name)?;
        let store = StateStore::from_parts(name.to_string(), initial, None, Box::new(reducer), Some(reservation));
        self.wire_teardown(&store, STORE_CLEANUP_PRIORITY)?;
        Ok(store)
    }

    /// Start a store with persistence or debugging attached.
    pub fn store_builder<S: StoreState>(&self, name: impl Into<String>, initial: S) -> StoreBuilder<S> {
        StoreBuilder::new(name, initial)
    }

    /// Register `store.destroy()` with the cleanup manager.
    pub(crate) fn wire_teardown<S: StoreState>(
        &self,
        store: &StateStore<S>,
        priority: i32,
    ) -> Result<(), StateError> {
        let weak = store.downgrade();
        let registration = self.cleanup.register(
            CleanupTask::sync(move || {
                if let Some(store) = weak.upgrade() {
                    store.destroy();
                }
                Ok(())
            }),
            RegisterOptions::default()
                .id(format!("store:{}", store.name()))
                .description(format!("destroy store '{}'", store.name()))
                .priority(priority),
        )?;
        store.set_cleanup_registration(registration);
        Ok(())
    }

    /// Run every registered teardown task and retire the cleanup manager.
    pub async fn shutdown(&self) -> Result<CleanupReport, StateError> {
        self.cleanup.destroy().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StateContext {
        StateContext::new(CleanupConfig {
            auto_cleanup_on_exit: false,
            ..CleanupConfig::default()
        })
    }

    #[test]
    fn test_name_collision_until_destroyed() {
        let ctx = ctx();
        let first = ctx.create_store("x", 1u8).unwrap();

        let err = ctx.create_store("x", 2u8).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        first.destroy();
        let second = ctx.create_store("x", 3u8).unwrap();
        assert_eq!(*second.get_state().unwrap(), 3);
    }

    #[test]
    fn test_stores_are_isolated() {
        let ctx = ctx();
        let a = ctx.create_store("a", serde_json::json!({"v": 1})).unwrap();
        let b = ctx.create_store("b", serde_json::json!({"v": 1})).unwrap();
        a.replace_state(serde_json::json!({"v": 2})).unwrap();
        assert_eq!(b.get_state().unwrap()["v"], 1);
    }

    #[tokio::test]
    async fn test_shutdown_destroys_stores() {
        let ctx = ctx();
        let store = ctx.create_store("s", 0u8).unwrap();
        let report = ctx.shutdown().await.unwrap();
        assert_eq!(report.executed.len(), 1);
        assert!(store.is_destroyed());
        assert!(ctx.create_store("late", 0u8).is_err());
    }
}
