//! Cleanup task types

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// A resource with an explicit release operation.
pub trait Disposable: Send {
    fn dispose(self: Box<Self>) -> anyhow::Result<()>;
}

type SyncFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;
type AsyncFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// A teardown task. `Err` or a panic marks the task as failed.
pub enum CleanupTask {
    Sync(SyncFn),
    Async(AsyncFn),
    Disposable(Box<dyn Disposable>),
}

impl CleanupTask {
    pub fn sync<F>(f: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self::Sync(Box::new(f))
    }

    pub fn future<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::Async(Box::new(move || f().boxed()))
    }

    pub fn disposable<D: Disposable + 'static>(d: D) -> Self {
        Self::Disposable(Box::new(d))
    }

    /// Whether the task can run without awaiting.
    pub fn is_sync_compatible(&self) -> bool {
        !matches!(self, Self::Async(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sync(_) => "sync",
            Self::Async(_) => "async",
            Self::Disposable(_) => "disposable",
        }
    }

    /// Run a sync or disposable task inline. Async tasks are handed back untouched.
    pub(crate) fn run_inline(self) -> Result<anyhow::Result<()>, Self> {
        match self {
            Self::Sync(f) => Ok(guard_panic(f)),
            Self::Disposable(d) => Ok(guard_panic(move || d.dispose())),
            other @ Self::Async(_) => Err(other),
        }
    }

    /// Turn any task into a future. Sync bodies run on first poll.
    pub(crate) fn into_future(self) -> BoxFuture<'static, anyhow::Result<()>> {
        match self {
            Self::Async(f) => async move {
                let fut = guard_panic(move || Ok(f()))?;
                match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(res) => res,
                    Err(panic) => Err(panic_error(panic)),
                }
            }
            .boxed(),
            inline => async move {
                match inline.run_inline() {
                    Ok(res) => res,
                    Err(_) => Ok(()),
                }
            }
            .boxed(),
        }
    }
}

impl std::fmt::Debug for CleanupTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CleanupTask").field(&self.kind()).finish()
    }
}

fn guard_panic<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(res) => res,
        Err(panic) => Err(panic_error(panic)),
    }
}

fn panic_error(panic: Box<dyn std::any::Any + Send>) -> anyhow::Error {
    let msg = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    anyhow::anyhow!("task panicked: {}", msg)
}

/// Registration options
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    pub id: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i32>,
}

impl RegisterOptions {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Bookkeeping for one registered task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupTaskInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: i32,
    pub kind: &'static str,
    pub created_at: DateTime<Utc>,
    /// Registration order; tie-break for equal priorities.
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Tasks that ran, in execution order.
    pub executed: Vec<CleanupTaskInfo>,
    /// Tasks left registered because they cannot run synchronously.
    pub skipped: Vec<CleanupTaskInfo>,
}

impl CleanupReport {
    pub fn failed(&self) -> impl Iterator<Item = &CleanupTaskInfo> {
        self.executed.iter().filter(|t| t.error.is_some())
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Handle(std::sync::Arc<std::sync::atomic::AtomicBool>);

    impl Disposable for Handle {
        fn dispose(self: Box<Self>) -> anyhow::Result<()> {
            self.0.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn disposable_runs_inline() {
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let task = CleanupTask::disposable(Handle(flag.clone()));
        assert!(task.is_sync_compatible());
        assert!(task.run_inline().unwrap().is_ok());
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn panics_become_errors() {
        let task = CleanupTask::sync(|| -> anyhow::Result<()> { panic!("boom") });
        let err = task.run_inline().unwrap().unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn async_tasks_do_not_run_inline() {
        let task = CleanupTask::future(|| async { anyhow::Ok(()) });
        assert!(!task.is_sync_compatible());
        assert!(task.run_inline().is_err());
    }

    #[tokio::test]
    async fn async_panic_is_caught() {
        let explode = true;
        let task = CleanupTask::future(move || async move {
            if explode {
                panic!("late boom");
            }
            Ok(())
        });
        let err = task.into_future().await.unwrap_err();
        assert!(err.to_string().contains("late boom"));
    }
}
