//! Application action types, creators and the reducer that applies them.

use super::types::{
    AppState, ColorScheme, Notification, PreferencesPatch, ThemeMode,
};
use crate::state::{Reducer, StateAction};
use serde::Serialize;
use serde_json::Value;

pub const THEME_SET_MODE: &str = "theme/setMode";
pub const THEME_TOGGLE: &str = "theme/toggle";
pub const THEME_SET_SYSTEM_PREFERENCE: &str = "theme/setSystemPreference";
pub const THEME_SET_TRANSITIONING: &str = "theme/setTransitioning";

pub const NAV_TOGGLE_MOBILE_MENU: &str = "navigation/toggleMobileMenu";
pub const NAV_SET_MOBILE_MENU_OPEN: &str = "navigation/setMobileMenuOpen";
pub const NAV_SET_IS_MOBILE: &str = "navigation/setIsMobile";
pub const NAV_SET_ACTIVE_SECTION: &str = "navigation/setActiveSection";
pub const NAV_SET_SCROLL_POSITION: &str = "navigation/setScrollPosition";

pub const UI_SET_LOADING: &str = "ui/setLoading";
pub const UI_ADD_NOTIFICATION: &str = "ui/addNotification";
pub const UI_REMOVE_NOTIFICATION: &str = "ui/removeNotification";
pub const UI_CLEAR_NOTIFICATIONS: &str = "ui/clearNotifications";
pub const UI_OPEN_MODAL: &str = "ui/openModal";
pub const UI_CLOSE_MODAL: &str = "ui/closeModal";
pub const UI_TOGGLE_SIDEBAR: &str = "ui/toggleSidebar";

pub const USER_UPDATE_PREFERENCES: &str = "user/updatePreferences";
pub const USER_RECORD_PAGE_VIEW: &str = "user/recordPageView";

pub const APP_COMPLETE_ONBOARDING: &str = "app/completeOnboarding";

fn with<T: Serialize>(action_type: &str, payload: T) -> StateAction {
    // plain data; serializing cannot fail
    StateAction::new(action_type, serde_json::to_value(payload).ok())
}

pub fn set_theme(mode: ThemeMode) -> StateAction {
    with(THEME_SET_MODE, mode)
}

pub fn toggle_theme() -> StateAction {
    StateAction::new(THEME_TOGGLE, None)
}

pub fn set_system_preference(scheme: ColorScheme) -> StateAction {
    with(THEME_SET_SYSTEM_PREFERENCE, scheme)
}

pub fn set_theme_transitioning(value: bool) -> StateAction {
    with(THEME_SET_TRANSITIONING, value)
}

pub fn toggle_mobile_menu() -> StateAction {
    StateAction::new(NAV_TOGGLE_MOBILE_MENU, None)
}

pub fn set_mobile_menu_open(open: bool) -> StateAction {
    with(NAV_SET_MOBILE_MENU_OPEN, open)
}

pub fn set_is_mobile(value: bool) -> StateAction {
    with(NAV_SET_IS_MOBILE, value)
}

pub fn set_active_section(section: Option<&str>) -> StateAction {
    with(NAV_SET_ACTIVE_SECTION, section)
}

pub fn set_scroll_position(position: f64) -> StateAction {
    with(NAV_SET_SCROLL_POSITION, position)
}

pub fn set_loading(value: bool) -> StateAction {
    with(UI_SET_LOADING, value)
}

pub fn add_notification(notification: &Notification) -> StateAction {
    with(UI_ADD_NOTIFICATION, notification)
}

pub fn remove_notification(id: &str) -> StateAction {
    with(UI_REMOVE_NOTIFICATION, id)
}

pub fn clear_notifications() -> StateAction {
    StateAction::new(UI_CLEAR_NOTIFICATIONS, None)
}

pub fn open_modal(id: &str) -> StateAction {
    with(UI_OPEN_MODAL, id)
}

pub fn close_modal(id: &str) -> StateAction {
    with(UI_CLOSE_MODAL, id)
}

pub fn toggle_sidebar() -> StateAction {
    StateAction::new(UI_TOGGLE_SIDEBAR, None)
}

pub fn update_user_preferences(patch: &PreferencesPatch) -> StateAction {
    with(USER_UPDATE_PREFERENCES, patch)
}

pub fn record_page_view() -> StateAction {
    StateAction::new(USER_RECORD_PAGE_VIEW, None)
}

pub fn complete_onboarding() -> StateAction {
    StateAction::new(APP_COMPLETE_ONBOARDING, None)
}

/// Applies the action types above. Unknown types, mis-shaped payloads and
/// actions that would change nothing are unhandled.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppReducer;

impl Reducer<AppState> for AppReducer {
    fn reduce(&self, state: &AppState, action: &StateAction) -> Option<AppState> {
        let mut next = state.clone();
        match action.action_type.as_str() {
            THEME_SET_MODE => next.theme.mode = action.payload_as()?,
            THEME_TOGGLE => {
                next.theme.mode = match next.theme.effective() {
                    ColorScheme::Light => ThemeMode::Dark,
                    ColorScheme::Dark => ThemeMode::Light,
                }
            }
            THEME_SET_SYSTEM_PREFERENCE => next.theme.system_preference = action.payload_as()?,
            THEME_SET_TRANSITIONING => next.theme.is_transitioning = action.payload_as()?,

            NAV_TOGGLE_MOBILE_MENU => {
                next.navigation.is_mobile_menu_open = !next.navigation.is_mobile_menu_open
            }
            NAV_SET_MOBILE_MENU_OPEN => next.navigation.is_mobile_menu_open = action.payload_as()?,
            NAV_SET_IS_MOBILE => {
                next.navigation.is_mobile = action.payload_as()?;
                if !next.navigation.is_mobile {
                    next.navigation.is_mobile_menu_open = false;
                }
            }
            NAV_SET_ACTIVE_SECTION => {
                next.navigation.active_section = match action.payload.as_ref()? {
                    Value::Null => None,
                    other => Some(other.as_str()?.to_string()),
                }
            }
            NAV_SET_SCROLL_POSITION => next.navigation.scroll_position = action.payload_as()?,

            UI_SET_LOADING => next.ui.is_loading = action.payload_as()?,
            UI_ADD_NOTIFICATION => {
                let notification: Notification = action.payload_as()?;
                if next.notification(&notification.id).is_some() {
                    return None;
                }
                next.ui.notifications.push(notification);
            }
            UI_REMOVE_NOTIFICATION => {
                let id: String = action.payload_as()?;
                next.ui.notifications.retain(|n| n.id != id);
            }
            UI_CLEAR_NOTIFICATIONS => next.ui.notifications.clear(),
            UI_OPEN_MODAL => {
                let id: String = action.payload_as()?;
                if !next.ui.modals.contains(&id) {
                    next.ui.modals.push(id);
                }
            }
            UI_CLOSE_MODAL => {
                let id: String = action.payload_as()?;
                next.ui.modals.retain(|m| *m != id);
            }
            UI_TOGGLE_SIDEBAR => next.ui.sidebar.is_open = !next.ui.sidebar.is_open,

            USER_UPDATE_PREFERENCES => {
                let patch: PreferencesPatch = action.payload_as()?;
                patch.apply(&mut next.user.preferences);
            }
            USER_RECORD_PAGE_VIEW => next.user.session.page_views += 1,

            APP_COMPLETE_ONBOARDING => next.app.has_seen_onboarding = true,

            _ => return None,
        }
        (next != *state).then_some(next)
    }
}
