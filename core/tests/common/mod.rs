#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use pagestate_core::api::{AppConfig, CleanupConfig, StateContext, StorageBackend};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A context that leaves process signals alone.
pub fn test_context() -> StateContext {
    StateContext::new(CleanupConfig {
        auto_cleanup_on_exit: false,
        ..CleanupConfig::default()
    })
}

pub fn debug_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.debug.enabled = true;
    config.persistence.debounce_ms = 10;
    config
}

/// Every write fails; reads find nothing.
#[derive(Default)]
pub struct FailingStorage {
    pub attempts: AtomicUsize,
}

impl FailingStorage {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for FailingStorage {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get_item(&self, _key: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    async fn set_item(&self, key: &str, _value: &str) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("quota exceeded writing {key}"))
    }

    async fn remove_item(&self, _key: &str) -> anyhow::Result<()> {
        Err(anyhow!("storage unavailable"))
    }
}
