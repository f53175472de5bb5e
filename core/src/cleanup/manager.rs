//! Cleanup coordinator

use super::exit_hook::wait_for_exit_signal;
use super::task::{CleanupReport, CleanupTask, CleanupTaskInfo, RegisterOptions};
use crate::config::{CleanupConfig, ErrorPolicy};
use crate::error::StateError;
use crate::util::{lock, random_suffixed_id};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Process exit status after a Ctrl-C / SIGTERM exit pass (128 + SIGINT).
pub const EXIT_ON_SIGNAL: i32 = 130;

/// Selection and reporting knobs for one `cleanup()` pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupOptions {
    /// Only run tasks with `priority >= min_priority`.
    pub min_priority: Option<i32>,
    /// Run lowest priority first.
    pub reverse: bool,
    /// Overrides the manager's configured policy.
    pub errors: Option<ErrorPolicy>,
}

impl CleanupOptions {
    pub fn min_priority(mut self, priority: i32) -> Self {
        self.min_priority = Some(priority);
        self
    }

    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn errors(mut self, policy: ErrorPolicy) -> Self {
        self.errors = Some(policy);
        self
    }
}

struct Entry {
    info: CleanupTaskInfo,
    task: CleanupTask,
}

/// Registry of teardown tasks, executed at most once each in priority order.
#[derive(Clone)]
pub struct CleanupManager {
    inner: Arc<CleanupInner>,
}

struct CleanupInner {
    config: CleanupConfig,
    tasks: Mutex<HashMap<String, Entry>>,
    destroyed: AtomicBool,
    sequence: AtomicU64,
    exit_hook_installed: AtomicBool,
    exit_requested: watch::Sender<bool>,
}

impl CleanupManager {
    /// Create a manager. Installs the exit hook when configured and a tokio
    /// runtime is available.
    pub fn new(config: CleanupConfig) -> Self {
        let auto = config.auto_cleanup_on_exit;
        let manager = Self {
            inner: Arc::new(CleanupInner {
                config,
                tasks: Mutex::new(HashMap::new()),
                destroyed: AtomicBool::new(false),
                sequence: AtomicU64::new(0),
                exit_hook_installed: AtomicBool::new(false),
                exit_requested: watch::Sender::new(false),
            }),
        };
        if auto {
            manager.install_exit_hook();
        }
        manager
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.inner.config
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.tasks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered tasks in execution order.
    pub fn tasks(&self) -> Vec<CleanupTaskInfo> {
        let tasks = lock(&self.inner.tasks);
        let mut infos: Vec<_> = tasks.values().map(|e| e.info.clone()).collect();
        infos.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.sequence.cmp(&b.sequence))
        });
        infos
    }

    /// Register a teardown task.
    pub fn register(
        &self,
        task: CleanupTask,
        options: RegisterOptions,
    ) -> Result<CleanupRegistration, StateError> {
        if self.is_destroyed() {
            return Err(StateError::CleanupDestroyed);
        }

        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let id = options
            .id
            .unwrap_or_else(|| random_suffixed_id("cleanup", sequence));

        let mut tasks = lock(&self.inner.tasks);
        if tasks.contains_key(&id) {
            warn!(task_id = %id, "cleanup task already registered; keeping the existing one");
            return Ok(CleanupRegistration::detached(id));
        }

        let max_tasks = self.inner.config.max_tasks;
        if max_tasks > 0 && tasks.len() >= max_tasks {
            let oldest = tasks
                .values()
                .min_by_key(|e| e.info.sequence)
                .map(|e| e.info.id.clone());
            if let Some(oldest) = oldest {
                tasks.remove(&oldest);
                warn!(
                    evicted = %oldest,
                    max_tasks,
                    "cleanup task limit reached; evicted oldest task"
                );
            }
        }

        let info = CleanupTaskInfo {
            id: id.clone(),
            description: options.description,
            priority: options
                .priority
                .unwrap_or(self.inner.config.default_priority),
            kind: task.kind(),
            created_at: Utc::now(),
            sequence,
            executed_at: None,
            error: None,
        };
        debug!(task_id = %id, priority = info.priority, kind = info.kind, "cleanup task registered");
        tasks.insert(id.clone(), Entry { info, task });

        Ok(CleanupRegistration {
            id,
            manager: Some(Arc::downgrade(&self.inner)),
        })
    }

    /// Remove a task without running it.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = lock(&self.inner.tasks).remove(id).is_some();
        if removed {
            debug!(task_id = %id, "cleanup task unregistered");
        }
        removed
    }

    /// Run the selected tasks concurrently and settle every one of them.
    pub async fn cleanup(&self, options: CleanupOptions) -> Result<CleanupReport, StateError> {
        let policy = options.errors.unwrap_or(self.inner.config.errors);
        let entries = self.take_ordered(options.min_priority, options.reverse, |_| true);
        if entries.is_empty() {
            return Ok(CleanupReport::default());
        }

        info!(count = entries.len(), "running cleanup tasks");

        let (infos, futures): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .map(|e| {
                let fut = e.task.into_future();
                let stamped = async move {
                    let res = fut.await;
                    (Utc::now(), res)
                };
                (e.info, stamped)
            })
            .unzip();

        let results = join_all(futures).await;

        let mut report = CleanupReport::default();
        for (mut info, (executed_at, res)) in infos.into_iter().zip(results) {
            info.executed_at = Some(executed_at);
            if let Err(e) = res {
                info.error = Some(format!("{e:#}"));
            }
            report.executed.push(info);
        }

        settle(report, policy)
    }

    /// Run everything, then refuse further registrations.
    pub async fn destroy(&self) -> Result<CleanupReport, StateError> {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        self.cleanup(CleanupOptions::default()).await
    }

    /// Synchronous emergency teardown. Never awaits and never fails; async
    /// tasks are started detached on the current runtime if there is one.
    pub fn force_cleanup(&self) -> CleanupReport {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        let entries = self.take_ordered(None, false, |_| true);

        let mut report = CleanupReport::default();
        for Entry { mut info, task } in entries {
            match task.run_inline() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(task_id = %info.id, error = %e, "cleanup task failed during forced cleanup");
                    info.error = Some(format!("{e:#}"));
                }
                Err(async_task) => spawn_detached(&info.id, async_task),
            }
            info.executed_at = Some(Utc::now());
            report.executed.push(info);
        }

        lock(&self.inner.tasks).clear();
        report
    }

    /// Best-effort pass for process exit: runs only tasks with a synchronous
    /// path. Async tasks stay registered and are reported as skipped.
    pub fn run_exit_pass(&self) -> CleanupReport {
        let entries = self.take_ordered(None, false, |e| e.task.is_sync_compatible());

        let mut report = CleanupReport::default();
        for Entry { mut info, task } in entries {
            if let Ok(Err(e)) = task.run_inline() {
                warn!(task_id = %info.id, error = %e, "cleanup task failed during exit pass");
                info.error = Some(format!("{e:#}"));
            }
            info.executed_at = Some(Utc::now());
            report.executed.push(info);
        }

        let tasks = lock(&self.inner.tasks);
        for entry in tasks.values() {
            let mut info = entry.info.clone();
            info.error = Some("skipped: asynchronous task has no synchronous path".to_string());
            report.skipped.push(info);
        }
        if !report.skipped.is_empty() {
            warn!(
                skipped = report.skipped.len(),
                "exit pass left asynchronous cleanup tasks registered"
            );
        }
        report
    }

    /// Resolves once the exit hook has run its pass. A caller awaiting this
    /// owns shutdown; with nobody awaiting, the hook ends the process with
    /// [`EXIT_ON_SIGNAL`].
    pub async fn exit_requested(&self) {
        let mut rx = self.inner.exit_requested.subscribe();
        let _ = rx.wait_for(|requested| *requested).await;
    }

    /// Run the exit pass and announce it. Returns whether the process should
    /// terminate itself because no caller is waiting in `exit_requested`.
    fn finish_exit(&self) -> bool {
        let report = self.run_exit_pass();
        info!(
            executed = report.executed.len(),
            failed = report.failed_count(),
            skipped = report.skipped.len(),
            "exit cleanup pass finished"
        );
        let handled = self.inner.exit_requested.receiver_count() > 0;
        self.inner.exit_requested.send_replace(true);
        !handled
    }

    /// Subscribe to Ctrl-C / SIGTERM once per manager. Returns whether the
    /// hook was installed by this call.
    ///
    /// The hook replaces the default signal behaviour: after the exit pass it
    /// either wakes `exit_requested` waiters or exits the process.
    pub fn install_exit_hook(&self) -> bool {
        if self.inner.exit_hook_installed.swap(true, Ordering::SeqCst) {
            return false;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime; exit hook not installed");
            self.inner.exit_hook_installed.store(false, Ordering::SeqCst);
            return false;
        };

        let weak = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            wait_for_exit_signal().await;
            let terminate = match weak.upgrade() {
                Some(inner) => CleanupManager { inner }.finish_exit(),
                None => true,
            };
            if terminate {
                std::process::exit(EXIT_ON_SIGNAL);
            }
        });
        true
    }

    fn take_ordered<F>(&self, min_priority: Option<i32>, reverse: bool, filter: F) -> Vec<Entry>
    where
        F: Fn(&Entry) -> bool,
    {
        let mut tasks = lock(&self.inner.tasks);
        let ids: Vec<String> = tasks
            .values()
            .filter(|e| min_priority.is_none_or(|p| e.info.priority >= p))
            .filter(|e| filter(e))
            .map(|e| e.info.id.clone())
            .collect();
        let mut entries: Vec<Entry> = ids.iter().filter_map(|id| tasks.remove(id)).collect();
        drop(tasks);

        entries.sort_by(|a, b| {
            b.info
                .priority
                .cmp(&a.info.priority)
                .then(a.info.sequence.cmp(&b.info.sequence))
        });
        if reverse {
            entries.reverse();
        }
        entries
    }
}

impl Default for CleanupManager {
    fn default() -> Self {
        Self::new(CleanupConfig::default())
    }
}

fn settle(report: CleanupReport, policy: ErrorPolicy) -> Result<CleanupReport, StateError> {
    let failures: Vec<String> = report
        .failed()
        .map(|t| format!("{}: {}", t.id, t.error.as_deref().unwrap_or_default()))
        .collect();

    match policy {
        ErrorPolicy::Throw if !failures.is_empty() => {
            return Err(StateError::CleanupFailed {
                count: failures.len(),
                failures,
            });
        }
        ErrorPolicy::Log => {
            for failure in &failures {
                warn!("cleanup task failed: {}", failure);
            }
        }
        // failures stay in the report
        ErrorPolicy::Throw | ErrorPolicy::Ignore => {}
    }
    Ok(report)
}

fn spawn_detached(id: &str, task: CleanupTask) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let id = id.to_string();
            let fut = task.into_future();
            handle.spawn(async move {
                if let Err(e) = fut.await {
                    warn!(task_id = %id, error = %e, "detached cleanup task failed");
                }
            });
        }
        Err(_) => {
            warn!(task_id = %id, "no tokio runtime; dropping asynchronous cleanup task");
        }
    }
}

/// Handle returned by `register`. `unregister` is always safe to call, even
/// after the manager has been destroyed or dropped.
pub struct CleanupRegistration {
    id: String,
    manager: Option<Weak<CleanupInner>>,
}

impl CleanupRegistration {
    fn detached(id: String) -> Self {
        Self { id, manager: None }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this handle owns a live registration (false for duplicates).
    pub fn is_attached(&self) -> bool {
        self.manager.is_some()
    }

    pub fn unregister(&self) -> bool {
        match self.manager.as_ref().and_then(Weak::upgrade) {
            Some(inner) => CleanupManager { inner }.unregister(&self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for CleanupRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistration")
            .field("id", &self.id)
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn manager() -> CleanupManager {
        CleanupManager::new(CleanupConfig {
            auto_cleanup_on_exit: false,
            ..Default::default()
        })
    }

    fn recording(log: &Arc<Mutex<Vec<i32>>>, tag: i32) -> CleanupTask {
        let log = Arc::clone(log);
        CleanupTask::sync(move || {
            log.lock().unwrap().push(tag);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_priority_order() {
        let m = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        for p in [1, 5, 3] {
            m.register(recording(&log, p), RegisterOptions::default().priority(p))
                .unwrap();
        }

        m.cleanup(CleanupOptions::default()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![5, 3, 1]);
    }

    #[tokio::test]
    async fn test_reverse_order() {
        let m = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        for p in [1, 5, 3] {
            m.register(recording(&log, p), RegisterOptions::default().priority(p))
                .unwrap();
        }

        m.cleanup(CleanupOptions::default().reverse()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_min_priority_leaves_the_rest() {
        let m = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        for p in [1, 5, 3] {
            m.register(recording(&log, p), RegisterOptions::default().priority(p))
                .unwrap();
        }

        m.cleanup(CleanupOptions::default().min_priority(3))
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec![5, 3]);
        assert_eq!(m.len(), 1);
    }

    #[tokio::test]
    async fn test_tasks_run_at_most_once() {
        let m = manager();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        m.register(
            CleanupTask::sync(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            RegisterOptions::default(),
        )
        .unwrap();

        m.cleanup(CleanupOptions::default()).await.unwrap();
        let second = m.cleanup(CleanupOptions::default()).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(second.executed.is_empty());
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_siblings() {
        let m = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        m.register(recording(&log, 1), RegisterOptions::default().priority(1))
            .unwrap();
        m.register(
            CleanupTask::sync(|| anyhow::bail!("disk gone")),
            RegisterOptions::default().id("bad").priority(2),
        )
        .unwrap();
        m.register(
            CleanupTask::future(|| async { Err::<(), _>(anyhow::anyhow!("socket gone")) }),
            RegisterOptions::default().id("bad-async").priority(3),
        )
        .unwrap();

        let report = m
            .cleanup(CleanupOptions::default().errors(ErrorPolicy::Log))
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec![1]);
        assert_eq!(report.failed_count(), 2);
        assert!(report.executed.iter().all(|t| t.executed_at.is_some()));
    }

    #[tokio::test]
    async fn test_throw_policy_aggregates() {
        let m = manager();
        m.register(
            CleanupTask::sync(|| anyhow::bail!("one")),
            RegisterOptions::default().id("a"),
        )
        .unwrap();
        m.register(
            CleanupTask::sync(|| anyhow::bail!("two")),
            RegisterOptions::default().id("b"),
        )
        .unwrap();

        let err = m
            .cleanup(CleanupOptions::default().errors(ErrorPolicy::Throw))
            .await
            .unwrap_err();
        match err {
            StateError::CleanupFailed { count, .. } => assert_eq!(count, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn test_ignore_policy_keeps_failures_in_report() {
        let m = CleanupManager::new(CleanupConfig {
            auto_cleanup_on_exit: false,
            errors: ErrorPolicy::Ignore,
            ..Default::default()
        });
        let log = Arc::new(Mutex::new(Vec::new()));
        m.register(recording(&log, 1), RegisterOptions::default().priority(1))
            .unwrap();
        m.register(
            CleanupTask::sync(|| anyhow::bail!("disk gone")),
            RegisterOptions::default().id("bad").priority(2),
        )
        .unwrap();

        let report = m.cleanup(CleanupOptions::default()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![1]);
        assert_eq!(report.executed.len(), 2);
        assert_eq!(report.failed_count(), 1);
        let failed: Vec<_> = report.failed().collect();
        assert_eq!(failed[0].id, "bad");
        assert!(failed[0].error.as_deref().unwrap().contains("disk gone"));
        assert!(m.is_empty());
    }

    #[test]
    fn test_duplicate_id_keeps_original() {
        let m = manager();
        let first = m
            .register(CleanupTask::sync(|| Ok(())), RegisterOptions::default().id("x"))
            .unwrap();
        let second = m
            .register(
                CleanupTask::sync(|| anyhow::bail!("should not replace")),
                RegisterOptions::default().id("x"),
            )
            .unwrap();

        assert!(first.is_attached());
        assert!(!second.is_attached());
        assert!(!second.unregister());
        assert_eq!(m.tasks()[0].kind, "sync");
        assert_eq!(m.len(), 1);
        assert!(first.unregister());
        assert!(!first.unregister());
    }

    #[test]
    fn test_max_tasks_evicts_oldest() {
        let m = CleanupManager::new(CleanupConfig {
            max_tasks: 2,
            auto_cleanup_on_exit: false,
            ..Default::default()
        });
        for id in ["a", "b", "c"] {
            m.register(CleanupTask::sync(|| Ok(())), RegisterOptions::default().id(id))
                .unwrap();
        }
        let ids: Vec<_> = m.tasks().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_register_after_destroy() {
        let m = manager();
        let reg = m
            .register(CleanupTask::sync(|| Ok(())), RegisterOptions::default())
            .unwrap();
        m.destroy().await.unwrap();

        assert!(m.is_destroyed());
        assert!(matches!(
            m.register(CleanupTask::sync(|| Ok(())), RegisterOptions::default()),
            Err(StateError::CleanupDestroyed)
        ));
        assert!(!reg.unregister());
    }

    #[test]
    fn test_force_cleanup_survives_panics() {
        let m = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        m.register(recording(&log, 1), RegisterOptions::default().priority(1))
            .unwrap();
        m.register(
            CleanupTask::sync(|| -> anyhow::Result<()> { panic!("mid-teardown") }),
            RegisterOptions::default().priority(2),
        )
        .unwrap();
        m.register(
            CleanupTask::future(|| async { anyhow::Ok(()) }),
            RegisterOptions::default().priority(3),
        )
        .unwrap();

        let report = m.force_cleanup();
        assert_eq!(*log.lock().unwrap(), vec![1]);
        assert_eq!(report.executed.len(), 3);
        assert_eq!(report.failed_count(), 1);
        assert!(m.is_destroyed());
        assert!(m.is_empty());
    }

    #[test]
    fn test_exit_pass_skips_async() {
        let m = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        m.register(recording(&log, 7), RegisterOptions::default())
            .unwrap();
        m.register(
            CleanupTask::future(|| async { anyhow::Ok(()) }),
            RegisterOptions::default().id("flush-remote"),
        )
        .unwrap();

        let report = m.run_exit_pass();
        assert_eq!(*log.lock().unwrap(), vec![7]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].id, "flush-remote");
        assert_eq!(m.len(), 1);
        assert!(!m.is_destroyed());
    }

    #[test]
    fn test_exit_hook_needs_runtime() {
        let m = manager();
        assert!(!m.install_exit_hook());
    }

    #[tokio::test]
    async fn test_exit_hook_installs_once() {
        let m = manager();
        assert!(m.install_exit_hook());
        assert!(!m.install_exit_hook());
    }

    #[tokio::test]
    async fn test_finish_exit_wakes_waiters() {
        let m = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        m.register(recording(&log, 4), RegisterOptions::default())
            .unwrap();

        let waiter = tokio::spawn({
            let m = m.clone();
            async move { m.exit_requested().await }
        });
        while m.inner.exit_requested.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(!m.finish_exit());
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec![4]);

        // Late callers see the request immediately.
        m.exit_requested().await;
    }

    #[test]
    fn test_finish_exit_without_waiters_terminates() {
        let m = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        m.register(recording(&log, 2), RegisterOptions::default())
            .unwrap();

        assert!(m.finish_exit());
        assert_eq!(*log.lock().unwrap(), vec![2]);
        assert!(m.is_empty());
    }
}
