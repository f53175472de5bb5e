use crate::util::lock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Key-value storage contract shared by every persistence target.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn get_item(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn remove_item(&self, key: &str) -> anyhow::Result<()>;
}

/// Process-lifetime storage. Backs `sessionStorage` and tests.
#[derive(Debug)]
pub struct MemoryStorage {
    name: String,
    items: Mutex<HashMap<String, String>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::named("memory")
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    /// Synchronous read for assertions.
    pub fn peek(&self, key: &str) -> Option<String> {
        lock(&self.items).get(key).cloned()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(lock(&self.items).get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        lock(&self.items).insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        lock(&self.items).remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_contract() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_item("k").await.unwrap(), None);

        storage.set_item("k", "v1").await.unwrap();
        storage.set_item("k", "v2").await.unwrap();
        assert_eq!(storage.get_item("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(storage.len(), 1);

        storage.remove_item("k").await.unwrap();
        storage.remove_item("k").await.unwrap();
        assert!(storage.is_empty());
    }
}
