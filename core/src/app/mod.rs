//! The application store: theme, navigation, ui, user and app slices behind
//! [`AppStateManager`].

pub mod actions;
mod manager;
mod types;

pub use actions::AppReducer;
pub use manager::AppStateManager;
pub use types::{
    AppInfo, AppState, ColorScheme, NavigationState, Notification, NotificationKind,
    PreferencesPatch, SessionInfo, SidebarState, ThemeMode, ThemeState, UiState, UserPreferences,
    UserState,
};
