use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use pagestate_core::config::{BackendKind, PersistenceConfig};
use pagestate_core::persistence::{MemoryStorage, StorageBackend};

use crate::storage::{LocalFileStorage, RecordDatabaseStorage};

/// File name of the record database inside the storage directory.
pub const RECORD_DATABASE_FILE: &str = "pagestate.db.json";

fn storage_dir(cfg: &PersistenceConfig) -> Result<PathBuf> {
    let Some(dir) = cfg.directory.as_deref().filter(|d| !d.trim().is_empty()) else {
        anyhow::bail!(
            "persistence.directory is not set (required by the {} backend)",
            cfg.backend.as_str()
        );
    };
    Ok(PathBuf::from(shellexpand::tilde(dir).to_string()))
}

pub fn build_storage(cfg: &PersistenceConfig) -> Result<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match cfg.backend {
        BackendKind::LocalStorage => Arc::new(LocalFileStorage::new(storage_dir(cfg)?)),
        // session storage ends with the process
        BackendKind::SessionStorage => Arc::new(MemoryStorage::named("sessionStorage")),
        BackendKind::IndexedDb => Arc::new(RecordDatabaseStorage::new(
            storage_dir(cfg)?.join(RECORD_DATABASE_FILE),
        )),
    };
    tracing::debug!(
        target: "pagestate.storage",
        backend = backend.name(),
        key = %cfg.key,
        "storage backend built"
    );
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(backend: BackendKind, directory: Option<&str>) -> PersistenceConfig {
        PersistenceConfig {
            backend,
            directory: directory.map(str::to_string),
            ..PersistenceConfig::default()
        }
    }

    #[test]
    fn test_backend_names_follow_kind() {
        let local = build_storage(&cfg(BackendKind::LocalStorage, Some("/tmp/ps"))).unwrap();
        assert_eq!(local.name(), "localStorage");
        let session = build_storage(&cfg(BackendKind::SessionStorage, None)).unwrap();
        assert_eq!(session.name(), "sessionStorage");
        let indexed = build_storage(&cfg(BackendKind::IndexedDb, Some("/tmp/ps"))).unwrap();
        assert_eq!(indexed.name(), "indexedDB");
    }

    #[test]
    fn test_durable_backends_need_a_directory() {
        let err = build_storage(&cfg(BackendKind::LocalStorage, None))
            .err()
            .unwrap();
        assert!(err.to_string().contains("persistence.directory"));
        assert!(build_storage(&cfg(BackendKind::IndexedDb, Some("  "))).is_err());
    }
}
