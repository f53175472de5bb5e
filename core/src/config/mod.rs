mod load;
mod types;

pub use load::{finalize, get_data_dir, load_default, load_from_path};
pub use types::{
    AppConfig, AppInfoConfig, BackendKind, CleanupConfig, DebugConfig, ErrorPolicy,
    LoggingConfig, PersistenceConfig,
};
