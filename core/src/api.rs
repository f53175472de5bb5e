//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `pagestate_core::api` instead of reaching into internal modules.

pub use crate::app::{
    AppState, AppStateManager, ColorScheme, Notification, NotificationKind, PreferencesPatch,
    ThemeMode,
};
pub use crate::cleanup::{
    CleanupManager, CleanupOptions, CleanupRegistration, CleanupReport, CleanupTask, Disposable,
    RegisterOptions, EXIT_ON_SIGNAL,
};
pub use crate::config::{
    finalize, get_data_dir, load_default, load_from_path, AppConfig, BackendKind, CleanupConfig,
    DebugConfig, ErrorPolicy, LoggingConfig, PersistenceConfig,
};
pub use crate::context::StateContext;
pub use crate::debug::{DebugMetrics, StateDebugManager};
pub use crate::error::{CliError, StateError};
pub use crate::persistence::{
    MemoryStorage, Migrations, PersistenceStats, StatePersistenceManager, StorageBackend,
};
pub use crate::state::{
    JsonReducer, Reducer, Selector, StateAction, StateStore, StoreBuilder, StoreState,
    Subscription,
};
