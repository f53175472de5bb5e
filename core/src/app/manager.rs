use super::actions::{self, AppReducer};
use super::types::{AppState, ColorScheme, Notification, NotificationKind, PreferencesPatch, ThemeMode};
use crate::cleanup::{CleanupRegistration, CleanupTask, RegisterOptions};
use crate::config::AppConfig;
use crate::context::StateContext;
use crate::debug::StateDebugManager;
use crate::error::StateError;
use crate::persistence::{MemoryStorage, Migrations, StatePersistenceManager, StorageBackend};
use crate::state::{Selector, StateAction, StateStore, StoreBuilder, Subscription, STORE_CLEANUP_PRIORITY};
use crate::util::{lock, SequentialIds};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Facade timers go first, then the store.
const FACADE_CLEANUP_PRIORITY: i32 = STORE_CLEANUP_PRIORITY + 10;

/// The application store with typed write methods.
///
/// Every write is one dispatch; the facade keeps no state of its own beyond
/// notification timers.
#[derive(Clone)]
pub struct AppStateManager {
    inner: Arc<AppInner>,
}

struct AppInner {
    store: StateStore<AppState>,
    persistence: Option<Arc<StatePersistenceManager<AppState>>>,
    debug: Option<Arc<StateDebugManager<AppState>>>,
    ids: SequentialIds,
    timers: Mutex<HashMap<String, AbortHandle>>,
    runtime: Option<Handle>,
    registration: Mutex<Option<CleanupRegistration>>,
    destroyed: AtomicBool,
}

impl AppStateManager {
    /// Build the application store, restoring persisted state from `backend`
    /// when persistence is enabled.
    pub async fn new(
        ctx: &StateContext,
        config: &AppConfig,
        backend: Arc<dyn StorageBackend>,
    ) -> Result<Self, StateError> {
        Self::with_migrations(ctx, config, backend, Migrations::new()).await
    }

    /// Process-lifetime storage only.
    pub async fn in_memory(ctx: &StateContext, config: &AppConfig) -> Result<Self, StateError> {
        Self::new(ctx, config, Arc::new(MemoryStorage::named("sessionStorage"))).await
    }

    pub async fn with_migrations(
        ctx: &StateContext,
        config: &AppConfig,
        backend: Arc<dyn StorageBackend>,
        migrations: Migrations,
    ) -> Result<Self, StateError> {
        let info = config.app.clone();
        let mut builder = StoreBuilder::new(config.app.store_name.clone(), AppState::new(&config.app))
            .reducer(AppReducer)
            .debug(config.debug.clone())
            .on_restore(move |state: AppState| state.restored(&info, Utc::now()));
        if config.persistence.enabled {
            builder = builder.persistence(Arc::new(
                StatePersistenceManager::new(config.persistence.clone(), backend).with_migrations(migrations),
            ));
        }
        let built = builder.build(ctx).await?;

        let manager = Self {
            inner: Arc::new(AppInner {
                store: built.store,
                persistence: built.persistence,
                debug: built.debug,
                ids: SequentialIds::new("notification"),
                timers: Mutex::new(HashMap::new()),
                runtime: Handle::try_current().ok(),
                registration: Mutex::new(None),
                destroyed: AtomicBool::new(false),
            }),
        };

        let weak = Arc::downgrade(&manager.inner);
        let registration = ctx.cleanup().register(
            CleanupTask::sync(move || {
                if let Some(inner) = weak.upgrade() {
                    AppStateManager { inner }.destroy();
                }
                Ok(())
            }),
            RegisterOptions::default()
                .id(format!("app-state:{}", config.app.store_name))
                .description("cancel notification timers and destroy the app store")
                .priority(FACADE_CLEANUP_PRIORITY),
        )?;
        *lock(&manager.inner.registration) = Some(registration);

        info!(
            store = %config.app.store_name,
            persistence = manager.inner.persistence.is_some(),
            debug = manager.inner.debug.is_some(),
            "app state ready"
        );
        Ok(manager)
    }

    pub fn store(&self) -> &StateStore<AppState> {
        &self.inner.store
    }

    pub fn persistence(&self) -> Option<&Arc<StatePersistenceManager<AppState>>> {
        self.inner.persistence.as_ref()
    }

    pub fn debug(&self) -> Option<&Arc<StateDebugManager<AppState>>> {
        self.inner.debug.as_ref()
    }

    pub fn get_state(&self) -> Result<Arc<AppState>, StateError> {
        self.inner.store.get_state()
    }

    pub fn subscribe<F>(&self, listener: F) -> Result<Subscription, StateError>
    where
        F: Fn(&Arc<AppState>, &StateAction) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(listener)
    }

    pub fn select<T, F>(&self, select: F) -> Selector<AppState, T>
    where
        T: Clone,
        F: Fn(&AppState) -> T + Send + Sync + 'static,
    {
        self.inner.store.select(select)
    }

    fn dispatch(&self, action: StateAction) -> Result<(), StateError> {
        self.inner.store.dispatch_action(action)
    }

    pub fn set_theme(&self, mode: ThemeMode) -> Result<(), StateError> {
        self.dispatch(actions::set_theme(mode))
    }

    pub fn toggle_theme(&self) -> Result<(), StateError> {
        self.dispatch(actions::toggle_theme())
    }

    pub fn set_system_preference(&self, scheme: ColorScheme) -> Result<(), StateError> {
        self.dispatch(actions::set_system_preference(scheme))
    }

    pub fn set_theme_transitioning(&self, value: bool) -> Result<(), StateError> {
        self.dispatch(actions::set_theme_transitioning(value))
    }

    pub fn toggle_mobile_menu(&self) -> Result<(), StateError> {
        self.dispatch(actions::toggle_mobile_menu())
    }

    pub fn set_mobile_menu_open(&self, open: bool) -> Result<(), StateError> {
        self.dispatch(actions::set_mobile_menu_open(open))
    }

    pub fn set_is_mobile(&self, value: bool) -> Result<(), StateError> {
        self.dispatch(actions::set_is_mobile(value))
    }

    pub fn set_active_section(&self, section: Option<&str>) -> Result<(), StateError> {
        self.dispatch(actions::set_active_section(section))
    }

    pub fn set_scroll_position(&self, position: f64) -> Result<(), StateError> {
        self.dispatch(actions::set_scroll_position(position))
    }

    pub fn set_loading(&self, value: bool) -> Result<(), StateError> {
        self.dispatch(actions::set_loading(value))
    }

    /// Show a notification and return its id. With a `ttl` it is removed
    /// automatically unless removed earlier.
    pub fn add_notification(
        &self,
        kind: NotificationKind,
        message: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Result<String, StateError> {
        let id = self.inner.ids.next_id();
        let notification = Notification {
            id: id.clone(),
            kind,
            message: message.into(),
            created_at: Utc::now(),
            ttl_ms: ttl.map(|t| t.as_millis() as u64),
        };
        self.dispatch(actions::add_notification(&notification))?;

        if let Some(ttl) = ttl {
            self.schedule_removal(&id, ttl);
        }
        Ok(id)
    }

    fn schedule_removal(&self, id: &str, ttl: Duration) {
        let Some(runtime) = self.inner.runtime.as_ref() else {
            warn!(notification = %id, "no tokio runtime; notification will not expire");
            return;
        };

        // held across spawn so the timer cannot fire before its handle is stored
        let mut timers = lock(&self.inner.timers);
        let weak = Arc::downgrade(&self.inner);
        let expiring = id.to_string();
        let deadline = tokio::time::Instant::now() + ttl;
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            lock(&inner.timers).remove(&expiring);
            if let Err(e) = inner.store.dispatch_action(actions::remove_notification(&expiring)) {
                debug!(notification = %expiring, error = %e, "expiry after teardown ignored");
            }
        });
        if let Some(previous) = timers.insert(id.to_string(), task.abort_handle()) {
            previous.abort();
        }
    }

    /// Remove a notification now. Returns whether it was showing; removing
    /// twice is harmless.
    pub fn remove_notification(&self, id: &str) -> Result<bool, StateError> {
        if let Some(timer) = lock(&self.inner.timers).remove(id) {
            timer.abort();
        }
        let present = self.get_state()?.notification(id).is_some();
        self.dispatch(actions::remove_notification(id))?;
        Ok(present)
    }

    pub fn clear_notifications(&self) -> Result<(), StateError> {
        self.abort_timers();
        self.dispatch(actions::clear_notifications())
    }

    pub fn open_modal(&self, id: &str) -> Result<(), StateError> {
        self.dispatch(actions::open_modal(id))
    }

    pub fn close_modal(&self, id: &str) -> Result<(), StateError> {
        self.dispatch(actions::close_modal(id))
    }

    pub fn toggle_sidebar(&self) -> Result<(), StateError> {
        self.dispatch(actions::toggle_sidebar())
    }

    pub fn update_user_preferences(&self, patch: PreferencesPatch) -> Result<(), StateError> {
        self.dispatch(actions::update_user_preferences(&patch))
    }

    pub fn record_page_view(&self) -> Result<(), StateError> {
        self.dispatch(actions::record_page_view())
    }

    pub fn complete_onboarding(&self) -> Result<(), StateError> {
        self.dispatch(actions::complete_onboarding())
    }

    /// Back to the state the store started with.
    pub fn reset(&self) -> Result<(), StateError> {
        self.abort_timers();
        self.inner.store.reset()
    }

    pub fn pending_timers(&self) -> usize {
        lock(&self.inner.timers).len()
    }

    fn abort_timers(&self) -> usize {
        let timers = std::mem::take(&mut *lock(&self.inner.timers));
        let count = timers.len();
        for (_, timer) in timers {
            timer.abort();
        }
        count
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Cancel timers, destroy the store and drop the cleanup registration.
    /// Idempotent.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let aborted = self.abort_timers();
        if let Some(registration) = lock(&self.inner.registration).take() {
            registration.unregister();
        }
        self.inner.store.destroy();
        info!(store = self.inner.store.name(), timers = aborted, "app state destroyed");
    }
}
