use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagestate_core::persistence::StorageBackend;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    value: String,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Database {
    #[serde(default)]
    records: BTreeMap<String, Record>,
}

/// `indexedDB` stand-in: every key lives as a record in one JSON database
/// file, loaded on first use and rewritten on each change.
pub struct RecordDatabaseStorage {
    path: PathBuf,
    db: Mutex<Option<Database>>,
}

impl RecordDatabaseStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_db(path: &Path) -> Result<Database> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Database::default()),
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("parse record database {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Database::default()),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    async fn write_db(&self, db: &Database) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(db)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename {} -> {}", tmp.display(), self.path.display()))?;
        Ok(())
    }

    /// Record count, loading the database if needed.
    pub async fn record_count(&self) -> Result<usize> {
        let mut guard = self.db.lock().await;
        if guard.is_none() {
            *guard = Some(Self::read_db(&self.path).await?);
        }
        Ok(guard.as_ref().map_or(0, |db| db.records.len()))
    }
}

#[async_trait]
impl StorageBackend for RecordDatabaseStorage {
    fn name(&self) -> &str {
        "indexedDB"
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let mut guard = self.db.lock().await;
        if guard.is_none() {
            *guard = Some(Self::read_db(&self.path).await?);
        }
        Ok(guard
            .as_ref()
            .and_then(|db| db.records.get(key))
            .map(|r| r.value.clone()))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self.db.lock().await;
        let mut db = match guard.take() {
            Some(db) => db,
            None => Self::read_db(&self.path).await?,
        };
        db.records.insert(
            key.to_string(),
            Record {
                value: value.to_string(),
                updated_at: Utc::now(),
            },
        );
        let written = self.write_db(&db).await;
        *guard = Some(db);
        written?;

        tracing::debug!(
            target: "pagestate.storage",
            backend = "indexedDB",
            key = %key,
            bytes = value.len(),
            "record written"
        );
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let mut guard = self.db.lock().await;
        let mut db = match guard.take() {
            Some(db) => db,
            None => Self::read_db(&self.path).await?,
        };
        let removed = db.records.remove(key).is_some();
        let written = if removed { self.write_db(&db).await } else { Ok(()) };
        *guard = Some(db);
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_persist_across_instances() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("pagestate.db.json");

        let db = RecordDatabaseStorage::new(&path);
        db.set_item("a", "1").await.unwrap();
        db.set_item("b", "2").await.unwrap();
        db.set_item("a", "3").await.unwrap();

        let reopened = RecordDatabaseStorage::new(&path);
        assert_eq!(reopened.get_item("a").await.unwrap().as_deref(), Some("3"));
        assert_eq!(reopened.record_count().await.unwrap(), 2);

        reopened.remove_item("a").await.unwrap();
        reopened.remove_item("missing").await.unwrap();
        assert_eq!(RecordDatabaseStorage::new(&path).get_item("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_database_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("db.json");
        tokio::fs::write(&path, "{broken").await.unwrap();

        let db = RecordDatabaseStorage::new(&path);
        assert!(db.get_item("a").await.is_err());
    }
}
