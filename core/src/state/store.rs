//! Observable state store

use super::reducer::{NoopReducer, Reducer};
use super::registry::NameReservation;
use super::selector::Selector;
use super::types::{DispatchRecord, StateAction, StoreState, REPLACE_ACTION, RESET_ACTION};
use crate::cleanup::CleanupRegistration;
use crate::error::StateError;
use crate::util::lock;
use serde_json::Value;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::ThreadId;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

type Listener<S> = dyn Fn(&Arc<S>, &StateAction) + Send + Sync;
type Teardown = Box<dyn FnOnce() + Send>;

/// Sees every settled dispatch after subscribers have been notified.
pub trait DispatchObserver<S>: Send + Sync {
    fn on_dispatch(&self, record: &DispatchRecord<S>);

    /// Called once when the store is destroyed.
    fn on_destroy(&self) {}
}

struct SubscriberEntry<S> {
    id: u64,
    active: Arc<AtomicBool>,
    listener: Box<Listener<S>>,
}

/// Single source of truth for one named state tree.
#[derive(Clone)]
pub struct StateStore<S: StoreState> {
    inner: Arc<StoreInner<S>>,
}

struct StoreInner<S> {
    name: String,
    initial: Arc<S>,
    state: Mutex<Arc<S>>,
    destroyed: AtomicBool,
    reducer: Box<dyn Reducer<S>>,
    subscribers: Mutex<Vec<Arc<SubscriberEntry<S>>>>,
    next_subscriber_id: AtomicU64,
    observers: Mutex<Vec<Arc<dyn DispatchObserver<S>>>>,
    /// Actions dispatched from inside a notification round.
    queue: Mutex<VecDeque<StateAction>>,
    drain_owner: Mutex<Option<ThreadId>>,
    drain_gate: Mutex<()>,
    dispatch_count: AtomicU64,
    reservation: Mutex<Option<NameReservation>>,
    cleanup: Mutex<Option<CleanupRegistration>>,
    teardown: Mutex<Vec<Teardown>>,
}

impl<S> Drop for StoreInner<S> {
    fn drop(&mut self) {
        let registration = self
            .cleanup
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(registration) = registration {
            registration.unregister();
        }
    }
}

impl<S: StoreState> StateStore<S> {
    /// A store outside any registry, handling only the built-in actions.
    pub fn new(name: impl Into<String>, initial: S) -> Self {
        Self::from_parts(name.into(), initial, None, Box::new(NoopReducer), None)
    }

    /// A store outside any registry with its own reducer.
    pub fn with_reducer<R>(name: impl Into<String>, initial: S, reducer: R) -> Self
    where
        R: Reducer<S> + 'static,
    {
        Self::from_parts(name.into(), initial, None, Box::new(reducer), None)
    }

    /// `initial` is what `reset` returns to; the store starts at `current`
    /// when one is given (a restored state) and at `initial` otherwise.
    pub(crate) fn from_parts(
        name: String,
        initial: S,
        current: Option<S>,
        reducer: Box<dyn Reducer<S>>,
        reservation: Option<NameReservation>,
    ) -> Self {
        let initial = Arc::new(initial);
        let current = current.map_or_else(|| Arc::clone(&initial), Arc::new);
        debug!(store = %name, "store created");
        Self {
            inner: Arc::new(StoreInner {
                name,
                state: Mutex::new(current),
                initial,
                destroyed: AtomicBool::new(false),
                reducer,
                subscribers: Mutex::new(Vec::new()),
                next_subscriber_id: AtomicU64::new(0),
                observers: Mutex::new(Vec::new()),
                queue: Mutex::new(VecDeque::new()),
                drain_owner: Mutex::new(None),
                drain_gate: Mutex::new(()),
                dispatch_count: AtomicU64::new(0),
                reservation: Mutex::new(reservation),
                cleanup: Mutex::new(None),
                teardown: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    fn ensure_alive(&self) -> Result<(), StateError> {
        if self.is_destroyed() {
            return Err(StateError::destroyed(&self.inner.name));
        }
        Ok(())
    }

    /// Current state. Fails once the store has been destroyed.
    pub fn get_state(&self) -> Result<Arc<S>, StateError> {
        self.ensure_alive()?;
        Ok(Arc::clone(&lock(&self.inner.state)))
    }

    pub fn dispatch(
        &self,
        action_type: impl Into<String>,
        payload: Option<Value>,
    ) -> Result<(), StateError> {
        self.dispatch_action(StateAction::new(action_type, payload))
    }

    /// Reduce and notify synchronously. A dispatch issued by a subscriber
    /// during notification is queued and runs after the current round.
    pub fn dispatch_action(&self, action: StateAction) -> Result<(), StateError> {
        self.ensure_alive()?;

        let me = std::thread::current().id();
        if *lock(&self.inner.drain_owner) == Some(me) {
            trace!(store = %self.inner.name, action = %action.action_type, "nested dispatch queued");
            lock(&self.inner.queue).push_back(action);
            return Ok(());
        }

        let _gate = lock(&self.inner.drain_gate);
        let _owner = DrainOwner::claim(&self.inner.drain_owner, me);
        self.ensure_alive()?;

        self.process(action);
        while let Some(next) = self.next_queued() {
            if self.is_destroyed() {
                lock(&self.inner.queue).clear();
                break;
            }
            self.process(next);
        }
        Ok(())
    }

    fn next_queued(&self) -> Option<StateAction> {
        lock(&self.inner.queue).pop_front()
    }

    fn process(&self, action: StateAction) {
        let started = Instant::now();
        let prev = Arc::clone(&lock(&self.inner.state));
        let next = match self.reduce(&prev, &action) {
            Some(state) => Arc::new(state),
            None => Arc::clone(&prev),
        };
        *lock(&self.inner.state) = Arc::clone(&next);
        self.inner.dispatch_count.fetch_add(1, Ordering::Relaxed);

        trace!(
            store = %self.inner.name,
            action = %action.action_type,
            changed = !Arc::ptr_eq(&prev, &next),
            "action reduced"
        );

        let subscribers: Vec<_> = lock(&self.inner.subscribers).clone();
        for entry in subscribers {
            if !entry.active.load(Ordering::SeqCst) {
                continue;
            }
            let notified = catch_unwind(AssertUnwindSafe(|| (entry.listener)(&next, &action)));
            if notified.is_err() {
                error!(
                    store = %self.inner.name,
                    subscriber = entry.id,
                    action = %action.action_type,
                    "subscriber panicked"
                );
            }
        }

        let record = DispatchRecord {
            action,
            prev,
            next,
            duration: started.elapsed(),
        };
        let observers: Vec<_> = lock(&self.inner.observers).clone();
        for observer in observers {
            observer.on_dispatch(&record);
        }
    }

    fn reduce(&self, state: &S, action: &StateAction) -> Option<S> {
        match action.action_type.as_str() {
            REPLACE_ACTION => match action.payload.clone().map(serde_json::from_value::<S>) {
                Some(Ok(replacement)) => Some(replacement),
                Some(Err(e)) => {
                    warn!(store = %self.inner.name, error = %e, "replacement does not fit the state shape");
                    None
                }
                None => None,
            },
            RESET_ACTION => Some(S::clone(&self.inner.initial)),
            _ => self.inner.reducer.reduce(state, action),
        }
    }

    /// Replace the whole state through a dispatch, so subscribers, history
    /// and persistence all see it.
    pub fn replace_state(&self, state: S) -> Result<(), StateError> {
        let payload = serde_json::to_value(state)?;
        self.dispatch(REPLACE_ACTION, Some(payload))
    }

    /// Back to the construction-time state.
    pub fn reset(&self) -> Result<(), StateError> {
        self.dispatch(RESET_ACTION, None)
    }

    /// Register a listener. Subscribing to a destroyed store is an error.
    pub fn subscribe<F>(&self, listener: F) -> Result<Subscription, StateError>
    where
        F: Fn(&Arc<S>, &StateAction) + Send + Sync + 'static,
    {
        self.ensure_alive()?;

        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::SeqCst) + 1;
        let active = Arc::new(AtomicBool::new(true));
        lock(&self.inner.subscribers).push(Arc::new(SubscriberEntry {
            id,
            active: Arc::clone(&active),
            listener: Box::new(listener),
        }));

        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(id, active, move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner.subscribers).retain(|e| e.id != id);
            }
        }))
    }

    /// A memoized derived read over this store.
    pub fn select<T, F>(&self, select: F) -> Selector<S, T>
    where
        T: Clone,
        F: Fn(&S) -> T + Send + Sync + 'static,
    {
        Selector::new(self.clone(), select)
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }

    /// All-time number of processed actions.
    pub fn dispatch_count(&self) -> u64 {
        self.inner.dispatch_count.load(Ordering::Relaxed)
    }

    pub fn add_observer(&self, observer: Arc<dyn DispatchObserver<S>>) -> Result<(), StateError> {
        self.ensure_alive()?;
        lock(&self.inner.observers).push(observer);
        Ok(())
    }

    /// Run `f` when the store is destroyed.
    pub fn on_destroy<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        lock(&self.inner.teardown).push(Box::new(f));
    }

    pub(crate) fn set_cleanup_registration(&self, registration: CleanupRegistration) {
        *lock(&self.inner.cleanup) = Some(registration);
    }

    pub fn downgrade(&self) -> WeakStore<S> {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Tear the store down. Idempotent.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let subscribers = std::mem::take(&mut *lock(&self.inner.subscribers));
        for entry in &subscribers {
            entry.active.store(false, Ordering::SeqCst);
        }

        let observers = std::mem::take(&mut *lock(&self.inner.observers));
        for observer in &observers {
            observer.on_destroy();
        }

        lock(&self.inner.queue).clear();

        if let Some(registration) = lock(&self.inner.cleanup).take() {
            registration.unregister();
        }

        let teardown = std::mem::take(&mut *lock(&self.inner.teardown));
        for f in teardown {
            f();
        }

        drop(lock(&self.inner.reservation).take());

        info!(
            store = %self.inner.name,
            subscribers = subscribers.len(),
            "store destroyed"
        );
    }
}

/// Non-owning store reference for timers and cleanup tasks.
pub struct WeakStore<S: StoreState> {
    inner: Weak<StoreInner<S>>,
}

impl<S: StoreState> Clone for WeakStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S: StoreState> WeakStore<S> {
    pub fn upgrade(&self) -> Option<StateStore<S>> {
        self.inner.upgrade().map(|inner| StateStore { inner })
    }
}

struct DrainOwner<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> DrainOwner<'a> {
    fn claim(slot: &'a Mutex<Option<ThreadId>>, id: ThreadId) -> Self {
        *lock(slot) = Some(id);
        Self(slot)
    }
}

impl Drop for DrainOwner<'_> {
    fn drop(&mut self) {
        *lock(self.0) = None;
    }
}

/// Handle for one listener. `unsubscribe` is idempotent and safe after the
/// store is gone; dropping the handle keeps the listener registered.
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    detach: Mutex<Option<Teardown>>,
}

impl Subscription {
    fn new<F>(id: u64, active: Arc<AtomicBool>, detach: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id,
            active,
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::SeqCst);
        let detach = lock(&self.detach).take();
        if let Some(detach) = detach {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl<S: StoreState> std::fmt::Debug for StateStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counter(name: &str) -> StateStore<i64> {
        StateStore::with_reducer(name, 0i64, |s: &i64, a: &StateAction| {
            match a.action_type.as_str() {
                "inc" => Some(s + 1),
                "add" => a.payload_as::<i64>().map(|n| s + n),
                _ => None,
            }
        })
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_dispatch_updates_state() {
        let store = counter("c");
        store.dispatch("inc", None).unwrap();
        store.dispatch("add", Some(json!(5))).unwrap();
        assert_eq!(*store.get_state().unwrap(), 6);
        assert_eq!(store.dispatch_count(), 2);
    }

    #[test]
    fn test_subscribers_notified_in_registration_order() {
        let store = counter("c");
        let seen = log();
        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            store
                .subscribe(move |s, _| seen.lock().unwrap().push(format!("{tag}{s}")))
                .unwrap();
        }
        store.dispatch("inc", None).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let store = counter("c");
        let seen = log();
        let s1 = {
            let seen = Arc::clone(&seen);
            store
                .subscribe(move |_, _| seen.lock().unwrap().push("one".into()))
                .unwrap()
        };
        let _s2 = {
            let seen = Arc::clone(&seen);
            store
                .subscribe(move |_, _| seen.lock().unwrap().push("two".into()))
                .unwrap()
        };

        s1.unsubscribe();
        s1.unsubscribe();
        assert_eq!(store.subscriber_count(), 1);

        store.dispatch("inc", None).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["two"]);
    }

    #[test]
    fn test_no_late_notification_any_order() {
        for order in [[0usize, 1, 2], [2, 1, 0], [1, 0, 2]] {
            let store = counter("c");
            let hits: Vec<Arc<AtomicU64>> = (0..3).map(|_| Arc::new(AtomicU64::new(0))).collect();
            let subs: Vec<Subscription> = hits
                .iter()
                .map(|h| {
                    let h = Arc::clone(h);
                    store
                        .subscribe(move |_, _| {
                            h.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap()
                })
                .collect();

            store.dispatch("inc", None).unwrap();
            for (round, &idx) in order.iter().enumerate() {
                subs[idx].unsubscribe();
                store.dispatch("inc", None).unwrap();
                // the unsubscribed listener saw exactly the dispatches before it left
                assert_eq!(hits[idx].load(Ordering::SeqCst), 1 + round as u64);
            }
            assert_eq!(store.subscriber_count(), 0);
        }
    }

    #[test]
    fn test_unsubscribe_during_notification() {
        let store = counter("c");
        let seen = log();
        let late: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        {
            let late = Arc::clone(&late);
            store
                .subscribe(move |_, _| {
                    if let Some(sub) = late.lock().unwrap().as_ref() {
                        sub.unsubscribe();
                    }
                })
                .unwrap();
        }
        let sub = {
            let seen = Arc::clone(&seen);
            store
                .subscribe(move |_, _| seen.lock().unwrap().push("late".into()))
                .unwrap()
        };
        *late.lock().unwrap() = Some(sub);

        store.dispatch("inc", None).unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_nested_dispatch_is_queued() {
        let store = counter("c");
        let seen = log();
        {
            let seen = Arc::clone(&seen);
            let weak = store.downgrade();
            store
                .subscribe(move |s, _| {
                    seen.lock().unwrap().push(format!("a{s}"));
                    if **s == 1 {
                        if let Some(store) = weak.upgrade() {
                            store.dispatch("inc", None).unwrap();
                        }
                    }
                })
                .unwrap();
        }
        {
            let seen = Arc::clone(&seen);
            store
                .subscribe(move |s, _| seen.lock().unwrap().push(format!("b{s}")))
                .unwrap();
        }

        store.dispatch("inc", None).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1", "a2", "b2"]);
        assert_eq!(*store.get_state().unwrap(), 2);
    }

    #[test]
    fn test_unknown_action_keeps_reference() {
        let store = counter("c");
        let before = store.get_state().unwrap();
        let notified = Arc::new(AtomicU64::new(0));
        {
            let notified = Arc::clone(&notified);
            store
                .subscribe(move |_, _| {
                    notified.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        store.dispatch("nope", None).unwrap();
        assert!(Arc::ptr_eq(&before, &store.get_state().unwrap()));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroyed_store_guards() {
        let store = counter("c");
        let sub = store.subscribe(|_, _| {}).unwrap();
        store.destroy();
        store.destroy();

        assert!(matches!(
            store.get_state(),
            Err(StateError::StoreDestroyed { .. })
        ));
        assert!(store.dispatch("inc", None).is_err());
        assert!(store.subscribe(|_, _| {}).is_err());
        assert!(!sub.is_active());
        sub.unsubscribe();
    }

    #[test]
    fn test_replace_and_reset() {
        let store = counter("c");
        store.replace_state(41).unwrap();
        store.dispatch("inc", None).unwrap();
        assert_eq!(*store.get_state().unwrap(), 42);

        // mis-shaped replacement is ignored
        store.dispatch(REPLACE_ACTION, Some(json!("forty"))).unwrap();
        assert_eq!(*store.get_state().unwrap(), 42);

        store.reset().unwrap();
        assert_eq!(*store.get_state().unwrap(), 0);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let store = counter("c");
        let seen = log();
        store.subscribe(|_, _| panic!("listener bug")).unwrap();
        {
            let seen = Arc::clone(&seen);
            store
                .subscribe(move |_, _| seen.lock().unwrap().push("ok".into()))
                .unwrap();
        }
        store.dispatch("inc", None).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["ok"]);
    }

    struct Recorder(Mutex<Vec<(String, bool)>>, AtomicBool);

    impl DispatchObserver<i64> for Recorder {
        fn on_dispatch(&self, record: &DispatchRecord<i64>) {
            self.0
                .lock()
                .unwrap()
                .push((record.action.action_type.clone(), record.changed()));
        }

        fn on_destroy(&self) {
            self.1.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_observers_see_records() {
        let store = counter("c");
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new()), AtomicBool::new(false)));
        store.add_observer(recorder.clone()).unwrap();

        store.dispatch("inc", None).unwrap();
        store.dispatch("noop", None).unwrap();
        store.destroy();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![("inc".to_string(), true), ("noop".to_string(), false)]
        );
        assert!(recorder.1.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dispatch_from_many_threads() {
        let store = counter("c");
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.dispatch("inc", None).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*store.get_state().unwrap(), 200);
    }

    #[test]
    fn test_on_destroy_runs_once() {
        let store = counter("c");
        let runs = Arc::new(AtomicU64::new(0));
        {
            let runs = Arc::clone(&runs);
            store.on_destroy(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        store.destroy();
        store.destroy();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
