//! Application store walkthrough: dispatch, selectors, debug timeline and teardown.
//!
//! Run with `RUST_LOG=debug` to see the store and persistence events.

use anyhow::Result;
use pagestate_core::api::{AppConfig, AppStateManager, CleanupConfig, NotificationKind, StateContext, ThemeMode};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let ctx = StateContext::new(CleanupConfig::default());
    let mut config = AppConfig::default();
    config.debug.enabled = true;
    let app = AppStateManager::in_memory(&ctx, &config).await?;

    let subscription = app.subscribe(|state, action| {
        println!("{:<32} theme={}", action.action_type, state.theme.mode.as_str());
    })?;
    let menu_open = app.select(|s| s.navigation.is_mobile_menu_open);

    app.set_theme(ThemeMode::Light)?;
    app.toggle_mobile_menu()?;
    app.toggle_theme()?;
    println!("menu open: {}", menu_open.get()?);

    let id = app.add_notification(NotificationKind::Success, "saved", Some(Duration::from_millis(200)))?;
    println!("showing {id}");
    tokio::time::sleep(Duration::from_millis(250)).await;
    println!("notifications left: {}", app.get_state()?.ui.notifications.len());

    if let Some(debug) = app.debug() {
        let metrics = debug.get_metrics();
        println!("actions: {} {:?}", metrics.total_actions, metrics.actions_by_type);
        for change in debug.last_diff() {
            println!("  {} {:?}", change.path, change.kind);
        }
    }

    subscription.unsubscribe();
    let report = ctx.shutdown().await?;
    println!("cleanup ran {} task(s)", report.executed.len());
    Ok(())
}
