use clap::Parser;
use pagestate_cli::commands::{cli, state};
use pagestate_core::api::{
    AppConfig, AppStateManager, LoggingConfig, StateContext, EXIT_ON_SIGNAL,
};
use pagestate_core::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, error::CliError> {
    let args = cli::Args::parse();
    let mut cfg =
        pagestate_core::config::load_default().map_err(|e| error::CliError::Config(e.to_string()))?;
    apply_overrides(&mut cfg, &args);
    init_tracing(&cfg.logging).map_err(error::CliError::Command)?;

    let ctx = StateContext::new(cfg.cleanup.clone());
    let backend = pagestate_plugins::factory::build_storage(&cfg.persistence)
        .map_err(|e| error::CliError::Config(format!("{e:#}")))?;
    let app = AppStateManager::new(&ctx, &cfg, backend).await?;

    let outcome = tokio::select! {
        outcome = state::run(args.command, &app) => Some(outcome),
        _ = ctx.cleanup().exit_requested() => None,
    };

    if let Some(persistence) = app.persistence() {
        if let Err(e) = persistence.flush().await {
            tracing::warn!(error = %e, "final flush failed");
        }
    }
    ctx.shutdown().await?;
    if let Some(persistence) = app.persistence() {
        persistence.join_writer().await;
    }

    match outcome {
        Some(outcome) => {
            println!("{}", outcome?);
            Ok(0)
        }
        None => {
            tracing::warn!("interrupted");
            Ok(EXIT_ON_SIGNAL)
        }
    }
}

/// Command-line flags win over config files and environment.
fn apply_overrides(cfg: &mut AppConfig, args: &cli::Args) {
    if let Some(backend) = args.backend {
        cfg.persistence.backend = backend;
    }
    if let Some(key) = args.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        cfg.persistence.key = key.to_string();
    }
    if args.debug {
        cfg.debug.enabled = true;
    }
}

fn exit_code_for_error(e: &error::CliError) -> i32 {
    // 0: success
    // 130: interrupted by Ctrl-C / SIGTERM
    // 11: config error
    // 20: IO / command error
    // 30: rejected import
    // 50: internal/uncategorized
    match e {
        error::CliError::Config(_) => 11,
        error::CliError::State(se) => match se {
            error::StateError::Import(_) => 30,
            error::StateError::Migration(_) => 30,
            _ => 50,
        },
        error::CliError::Io(_) => 20,
        error::CliError::Command(_) => 20,
        error::CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("pagestate"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("pagestate.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
