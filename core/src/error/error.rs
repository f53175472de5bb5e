use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("store '{name}' already exists")]
    StoreExists { name: String },
    #[error("store '{name}' has been destroyed")]
    StoreDestroyed { name: String },
    #[error("cleanup manager has been destroyed")]
    CleanupDestroyed,
    #[error("{count} cleanup task(s) failed: {}", failures.join("; "))]
    CleanupFailed { count: usize, failures: Vec<String> },
    #[error("Failed to import state: {0}")]
    Import(String),
    #[error("migration error: {0}")]
    Migration(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("no history entry at {index} (history holds {len})")]
    HistoryOutOfRange { index: usize, len: usize },
}

impl StateError {
    pub(crate) fn destroyed(name: &str) -> Self {
        Self::StoreDestroyed {
            name: name.to_string(),
        }
    }
}
