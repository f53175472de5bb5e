//! Application state slices

use crate::config::AppInfoConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    /// Follow the system preference.
    #[default]
    Auto,
}

impl ThemeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Auto => "auto",
        }
    }
}

impl FromStr for ThemeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "auto" | "system" => Ok(Self::Auto),
            other => Err(format!("unknown theme mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThemeState {
    pub mode: ThemeMode,
    pub system_preference: ColorScheme,
    pub is_transitioning: bool,
}

impl ThemeState {
    /// The scheme actually shown, resolving `auto`.
    pub fn effective(&self) -> ColorScheme {
        match self.mode {
            ThemeMode::Light => ColorScheme::Light,
            ThemeMode::Dark => ColorScheme::Dark,
            ThemeMode::Auto => self.system_preference,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NavigationState {
    pub is_mobile_menu_open: bool,
    pub is_mobile: bool,
    pub active_section: Option<String>,
    pub scroll_position: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "success" => Ok(Self::Success),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown notification kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SidebarState {
    pub is_open: bool,
    pub is_collapsed: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UiState {
    pub is_loading: bool,
    pub notifications: Vec<Notification>,
    pub modals: Vec<String>,
    pub sidebar: SidebarState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserPreferences {
    pub reduced_motion: bool,
    pub font_size: String,
    pub language: String,
    pub code_theme: String,
    pub show_line_numbers: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            reduced_motion: false,
            font_size: "medium".to_string(),
            language: "en".to_string(),
            code_theme: "github".to_string(),
            show_line_numbers: true,
        }
    }
}

/// Partial update for [`UserPreferences`]; absent fields stay as they are.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduced_motion: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_line_numbers: Option<bool>,
}

impl PreferencesPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(self, prefs: &mut UserPreferences) {
        if let Some(v) = self.reduced_motion {
            prefs.reduced_motion = v;
        }
        if let Some(v) = self.font_size {
            prefs.font_size = v;
        }
        if let Some(v) = self.language {
            prefs.language = v;
        }
        if let Some(v) = self.code_theme {
            prefs.code_theme = v;
        }
        if let Some(v) = self.show_line_numbers {
            prefs.show_line_numbers = v;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionInfo {
    pub started_at: DateTime<Utc>,
    pub page_views: u64,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            page_views: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserState {
    pub preferences: UserPreferences,
    pub session: SessionInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppInfo {
    pub version: String,
    pub build_number: u64,
    pub environment: String,
    pub is_first_visit: bool,
    pub has_seen_onboarding: bool,
    pub last_visit: Option<DateTime<Utc>>,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self::from_config(&AppInfoConfig::default())
    }
}

impl AppInfo {
    pub fn from_config(cfg: &AppInfoConfig) -> Self {
        Self {
            version: cfg.version.clone(),
            build_number: cfg.build_number,
            environment: cfg.environment.clone(),
            is_first_visit: true,
            has_seen_onboarding: false,
            last_visit: None,
        }
    }
}

/// The composite state behind the application store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    pub theme: ThemeState,
    pub navigation: NavigationState,
    pub ui: UiState,
    pub user: UserState,
    pub app: AppInfo,
}

impl AppState {
    pub fn new(info: &AppInfoConfig) -> Self {
        Self {
            app: AppInfo::from_config(info),
            ..Self::default()
        }
    }

    /// A persisted state brought back for a new visit: durable preferences
    /// stay, per-visit UI state and the session start over, build info is
    /// refreshed.
    pub fn restored(mut self, info: &AppInfoConfig, now: DateTime<Utc>) -> Self {
        self.theme.is_transitioning = false;
        self.navigation = NavigationState {
            is_mobile: self.navigation.is_mobile,
            ..NavigationState::default()
        };
        self.ui = UiState {
            sidebar: self.ui.sidebar,
            ..UiState::default()
        };
        self.user.session = SessionInfo {
            started_at: now,
            page_views: 0,
        };
        self.app.version = info.version.clone();
        self.app.build_number = info.build_number;
        self.app.environment = info.environment.clone();
        self.app.is_first_visit = false;
        self.app.last_visit = Some(now);
        self
    }

    pub fn notification(&self, id: &str) -> Option<&Notification> {
        self.ui.notifications.iter().find(|n| n.id == id)
    }
}
