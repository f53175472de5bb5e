use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub cleanup: CleanupConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub debug: DebugConfig,

    #[serde(default)]
    pub app: AppInfoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "pagestate_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// How `cleanup()` reports task failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Surface an aggregate error after every selected task has run.
    Throw,
    /// Log each failure and return normally.
    #[default]
    Log,
    /// Say nothing.
    Ignore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Registry ceiling; the oldest task is evicted to admit a new one.
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,

    /// Install a Ctrl-C / SIGTERM hook that runs the synchronous tasks.
    #[serde(default = "default_auto_cleanup_on_exit")]
    pub auto_cleanup_on_exit: bool,

    #[serde(default)]
    pub default_priority: i32,

    #[serde(default)]
    pub errors: ErrorPolicy,
}

fn default_max_tasks() -> usize {
    1000
}

fn default_auto_cleanup_on_exit() -> bool {
    true
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_tasks: default_max_tasks(),
            auto_cleanup_on_exit: default_auto_cleanup_on_exit(),
            default_priority: 0,
            errors: ErrorPolicy::default(),
        }
    }
}

/// Which storage contract the persisted envelope lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    #[default]
    #[serde(rename = "localStorage")]
    LocalStorage,
    #[serde(rename = "sessionStorage")]
    SessionStorage,
    #[serde(rename = "indexedDB")]
    IndexedDb,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalStorage => "localStorage",
            Self::SessionStorage => "sessionStorage",
            Self::IndexedDb => "indexedDB",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "localstorage" | "local" => Ok(Self::LocalStorage),
            "sessionstorage" | "session" => Ok(Self::SessionStorage),
            "indexeddb" | "indexed" => Ok(Self::IndexedDb),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_persistence_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub backend: BackendKind,

    /// Storage key the envelope is written under.
    #[serde(default = "default_persistence_key")]
    pub key: String,

    /// Gzip + base64 the envelope before writing.
    #[serde(default)]
    pub compression: bool,

    /// Quiet period before a burst of dispatches is written.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Directory for durable backends. Defaults to `~/.pagestate/storage`.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_persistence_enabled() -> bool {
    true
}

fn default_persistence_key() -> String {
    "pagestate:app".to_string()
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_schema_version() -> u32 {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_persistence_enabled(),
            backend: BackendKind::default(),
            key: default_persistence_key(),
            compression: false,
            debounce_ms: default_debounce_ms(),
            schema_version: default_schema_version(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,

    /// Emit a debug event per recorded action.
    #[serde(default = "default_log_actions")]
    pub log_actions: bool,

    /// Recurse into nested objects when diffing; otherwise top-level keys only.
    #[serde(default = "default_deep_diff")]
    pub deep_diff: bool,
}

fn default_max_history_size() -> usize {
    50
}

fn default_log_actions() -> bool {
    true
}

fn default_deep_diff() -> bool {
    true
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_history_size: default_max_history_size(),
            log_actions: default_log_actions(),
            deep_diff: default_deep_diff(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfoConfig {
    #[serde(default = "default_store_name")]
    pub store_name: String,

    #[serde(default = "default_app_version")]
    pub version: String,

    #[serde(default)]
    pub build_number: u64,

    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_store_name() -> String {
    "app".to_string()
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

impl Default for AppInfoConfig {
    fn default() -> Self {
        Self {
            store_name: default_store_name(),
            version: default_app_version(),
            build_number: 0,
            environment: default_environment(),
        }
    }
}
