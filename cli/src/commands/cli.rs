use clap::{Args as ClapArgs, Parser, Subcommand};
use pagestate_core::app::NotificationKind;
use pagestate_core::config::BackendKind;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeArg {
    Light,
    Dark,
    Auto,
    Toggle,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuArg {
    Open,
    Close,
    Toggle,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slice {
    Theme,
    Navigation,
    Ui,
    User,
    App,
}

impl Slice {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Theme => "theme",
            Self::Navigation => "navigation",
            Self::Ui => "ui",
            Self::User => "user",
            Self::App => "app",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pagestate", version, about = "Inspect and edit persisted blog front-end state")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Storage backend: localStorage, sessionStorage or indexedDB.
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    /// Storage key the state is persisted under.
    #[arg(long, global = true)]
    pub key: Option<String>,

    /// Record action history and metrics for this run.
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ShowArgs {
    #[arg(long, value_enum)]
    pub slice: Option<Slice>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct NotifyArgs {
    #[arg(long, default_value = "info")]
    pub kind: NotificationKind,

    #[arg(long)]
    pub message: String,

    /// Remove the notification after this many milliseconds; the command
    /// waits for the expiry before exiting.
    #[arg(long)]
    pub ttl_ms: Option<u64>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct PrefsArgs {
    #[arg(long)]
    pub font_size: Option<String>,

    #[arg(long)]
    pub language: Option<String>,

    #[arg(long)]
    pub code_theme: Option<String>,

    #[arg(long)]
    pub reduced_motion: Option<bool>,

    #[arg(long)]
    pub line_numbers: Option<bool>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ExportArgs {
    /// Write to this file instead of stdout.
    #[arg(long)]
    pub out: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the current state, or one slice of it.
    Show(ShowArgs),
    /// Set or toggle the theme mode.
    Theme {
        #[arg(value_enum)]
        mode: ThemeArg,
    },
    /// Open, close or toggle the mobile menu.
    Menu {
        #[arg(value_enum)]
        action: MenuArg,
    },
    /// Show a notification.
    Notify(NotifyArgs),
    /// Remove a notification by id.
    Dismiss { id: String },
    /// Update user preferences; unset flags are left alone.
    Prefs(PrefsArgs),
    /// Print the persisted envelope for the current state.
    Export(ExportArgs),
    /// Replace the state from an exported envelope or a bare state file.
    Import { file: String },
    /// Restore the initial state.
    Reset,
    /// Print persistence statistics and, with --debug, action metrics.
    Metrics,
}
