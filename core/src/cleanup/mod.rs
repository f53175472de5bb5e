//! # Cleanup coordination
//!
//! A registry of teardown tasks (plain functions, futures, or disposable
//! resources) that runs each task at most once, highest priority first, and
//! keeps going when individual tasks fail.

mod exit_hook;
pub mod manager;
pub mod task;

pub use manager::{CleanupManager, CleanupOptions, CleanupRegistration, EXIT_ON_SIGNAL};
pub use task::{CleanupReport, CleanupTask, CleanupTaskInfo, Disposable, RegisterOptions};
