//! Command handlers. Each returns the text to print on stdout.

use crate::commands::cli::{Commands, ExportArgs, MenuArg, NotifyArgs, PrefsArgs, ShowArgs, ThemeArg};
use pagestate_core::api::{
    AppState, AppStateManager, CliError, ColorScheme, PreferencesPatch, StateError, ThemeMode,
};
use serde_json::{json, Value};
use std::time::Duration;

pub async fn run(command: Commands, app: &AppStateManager) -> Result<String, CliError> {
    match command {
        Commands::Show(args) => show(app, &args),
        Commands::Theme { mode } => theme(app, mode),
        Commands::Menu { action } => menu(app, action),
        Commands::Notify(args) => notify(app, args).await,
        Commands::Dismiss { id } => {
            let removed = app.remove_notification(&id)?;
            Ok(if removed {
                format!("dismissed {id}")
            } else {
                format!("no notification {id}")
            })
        }
        Commands::Prefs(args) => prefs(app, args),
        Commands::Export(args) => export(app, &args).await,
        Commands::Import { file } => import(app, &file).await,
        Commands::Reset => {
            app.reset()?;
            Ok("state reset".to_string())
        }
        Commands::Metrics => metrics(app),
    }
}

fn pretty(value: &impl serde::Serialize) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::Command(e.to_string()))
}

fn show(app: &AppStateManager, args: &ShowArgs) -> Result<String, CliError> {
    let state = app.get_state()?;
    match args.slice {
        None => pretty(&*state),
        Some(slice) => {
            let value = serde_json::to_value(&*state).map_err(|e| CliError::Command(e.to_string()))?;
            pretty(value.get(slice.key()).unwrap_or(&Value::Null))
        }
    }
}

fn theme(app: &AppStateManager, mode: ThemeArg) -> Result<String, CliError> {
    match mode {
        ThemeArg::Light => app.set_theme(ThemeMode::Light)?,
        ThemeArg::Dark => app.set_theme(ThemeMode::Dark)?,
        ThemeArg::Auto => app.set_theme(ThemeMode::Auto)?,
        ThemeArg::Toggle => app.toggle_theme()?,
    }
    let state = app.get_state()?;
    Ok(format!(
        "theme: {} (showing {})",
        state.theme.mode.as_str(),
        match state.theme.effective() {
            ColorScheme::Light => "light",
            ColorScheme::Dark => "dark",
        }
    ))
}

fn menu(app: &AppStateManager, action: MenuArg) -> Result<String, CliError> {
    match action {
        MenuArg::Open => app.set_mobile_menu_open(true)?,
        MenuArg::Close => app.set_mobile_menu_open(false)?,
        MenuArg::Toggle => app.toggle_mobile_menu()?,
    }
    let open = app.get_state()?.navigation.is_mobile_menu_open;
    Ok(format!("mobile menu: {}", if open { "open" } else { "closed" }))
}

async fn notify(app: &AppStateManager, args: NotifyArgs) -> Result<String, CliError> {
    let ttl = args.ttl_ms.map(Duration::from_millis);
    let id = app.add_notification(args.kind, args.message, ttl)?;
    let Some(ttl) = ttl else {
        return Ok(id);
    };

    // the expiry timer was armed first; outlast it
    tokio::time::sleep(ttl + Duration::from_millis(10)).await;
    let still_showing = app.get_state()?.notification(&id).is_some();
    Ok(if still_showing {
        format!("{id} (still showing)")
    } else {
        format!("{id} (expired)")
    })
}

fn prefs_patch(args: PrefsArgs) -> PreferencesPatch {
    PreferencesPatch {
        reduced_motion: args.reduced_motion,
        font_size: args.font_size,
        language: args.language,
        code_theme: args.code_theme,
        show_line_numbers: args.line_numbers,
    }
}

fn prefs(app: &AppStateManager, args: PrefsArgs) -> Result<String, CliError> {
    let patch = prefs_patch(args);
    if !patch.is_empty() {
        app.update_user_preferences(patch)?;
    }
    pretty(&app.get_state()?.user.preferences)
}

async fn export(app: &AppStateManager, args: &ExportArgs) -> Result<String, CliError> {
    let exported = match app.persistence() {
        Some(persistence) => persistence.export_state()?,
        None => pretty(&*app.get_state()?)?,
    };
    match args.out.as_deref() {
        Some(path) => {
            tokio::fs::write(path, &exported).await?;
            Ok(format!("exported to {path}"))
        }
        None => Ok(exported),
    }
}

async fn import(app: &AppStateManager, file: &str) -> Result<String, CliError> {
    let raw = tokio::fs::read_to_string(file).await?;
    match app.persistence() {
        Some(persistence) => persistence.import_state(&raw)?,
        None => {
            let state: AppState = serde_json::from_str(&raw)
                .map_err(|e| StateError::Import(e.to_string()))?;
            app.store().replace_state(state)?;
        }
    }
    Ok(format!("imported {file}"))
}

fn metrics(app: &AppStateManager) -> Result<String, CliError> {
    let report = json!({
        "persistence": app.persistence().map(|p| p.stats()),
        "debug": app.debug().map(|d| d.get_metrics()),
    });
    pretty(&report)
}
