use anyhow::{Context, Result};
use async_trait::async_trait;
use pagestate_core::persistence::StorageBackend;
use pagestate_core::util::storage_file_stem;
use std::path::{Path, PathBuf};

/// `localStorage` on disk: one file per key under a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never sees a half-written value.
pub struct LocalFileStorage {
    dir: PathBuf,
}

impl LocalFileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", storage_file_stem(key)))
    }
}

#[async_trait]
impl StorageBackend for LocalFileStorage {
    fn name(&self) -> &str {
        "localStorage"
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                tracing::debug!(
                    target: "pagestate.storage",
                    backend = "localStorage",
                    path = %path.display(),
                    bytes = raw.len(),
                    "item read"
                );
                Ok(Some(raw))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create {}", self.dir.display()))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;

        tracing::debug!(
            target: "pagestate.storage",
            backend = "localStorage",
            path = %path.display(),
            bytes = value.len(),
            "item written"
        );
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_survive_a_new_instance() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("storage");

        let first = LocalFileStorage::new(&dir);
        assert_eq!(first.get_item("pagestate:app").await.unwrap(), None);
        first.set_item("pagestate:app", r#"{"a":1}"#).await.unwrap();

        let second = LocalFileStorage::new(&dir);
        assert_eq!(
            second.get_item("pagestate:app").await.unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );

        second.remove_item("pagestate:app").await.unwrap();
        second.remove_item("pagestate:app").await.unwrap();
        assert_eq!(first.get_item("pagestate:app").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_map_to_safe_file_names() {
        let storage = LocalFileStorage::new("/tmp/unused");
        let path = storage.path_for("../../etc/passwd");
        assert_eq!(path.parent(), Some(Path::new("/tmp/unused")));
    }

    #[tokio::test]
    async fn test_similar_keys_do_not_share_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(tmp.path());

        storage.set_item("blog:theme", "A").await.unwrap();
        storage.set_item("blog/theme", "B").await.unwrap();
        storage.set_item("Blog-Theme", "C").await.unwrap();

        assert_eq!(storage.get_item("blog:theme").await.unwrap().as_deref(), Some("A"));
        assert_eq!(storage.get_item("blog/theme").await.unwrap().as_deref(), Some("B"));
        assert_eq!(storage.get_item("Blog-Theme").await.unwrap().as_deref(), Some("C"));

        storage.remove_item("blog/theme").await.unwrap();
        assert_eq!(storage.get_item("blog/theme").await.unwrap(), None);
        assert_eq!(storage.get_item("blog:theme").await.unwrap().as_deref(), Some("A"));
    }
}
