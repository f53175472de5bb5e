use super::store::StateStore;
use super::types::StoreState;
use crate::error::StateError;
use crate::util::lock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type SelectFn<S, T> = dyn Fn(&S) -> T + Send + Sync;

/// Derived read over a store, recomputed only when the state reference
/// changes. A structurally equal state under a new reference recomputes.
pub struct Selector<S: StoreState, T> {
    store: StateStore<S>,
    select: Box<SelectFn<S, T>>,
    cache: Mutex<Option<(Arc<S>, T)>>,
    computations: AtomicU64,
}

impl<S: StoreState, T: Clone> Selector<S, T> {
    pub(crate) fn new<F>(store: StateStore<S>, select: F) -> Self
    where
        F: Fn(&S) -> T + Send + Sync + 'static,
    {
        Self {
            store,
            select: Box::new(select),
            cache: Mutex::new(None),
            computations: AtomicU64::new(0),
        }
    }

    pub fn get(&self) -> Result<T, StateError> {
        let state = self.store.get_state()?;
        let mut cache = lock(&self.cache);
        if let Some((seen, value)) = cache.as_ref() {
            if Arc::ptr_eq(seen, &state) {
                return Ok(value.clone());
            }
        }

        let value = (self.select)(&state);
        self.computations.fetch_add(1, Ordering::Relaxed);
        *cache = Some((state, value.clone()));
        Ok(value)
    }

    /// How many times the projection actually ran.
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::StateAction;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Page {
        title: String,
        views: u32,
    }

    fn store() -> StateStore<Page> {
        StateStore::with_reducer(
            "page",
            Page {
                title: "home".into(),
                views: 0,
            },
            |s: &Page, a: &StateAction| match a.action_type.as_str() {
                "view" => Some(Page {
                    views: s.views + 1,
                    ..s.clone()
                }),
                "same" => Some(s.clone()),
                _ => None,
            },
        )
    }

    #[test]
    fn test_memoized_until_reference_changes() {
        let store = store();
        let title = store.select(|p: &Page| p.title.to_uppercase());

        assert_eq!(title.get().unwrap(), "HOME");
        assert_eq!(title.get().unwrap(), "HOME");
        assert_eq!(title.computations(), 1);

        store.dispatch("ignored", None).unwrap();
        title.get().unwrap();
        assert_eq!(title.computations(), 1);

        store.dispatch("view", None).unwrap();
        title.get().unwrap();
        assert_eq!(title.computations(), 2);
    }

    #[test]
    fn test_equal_state_new_reference_recomputes() {
        let store = store();
        let views = store.select(|p: &Page| p.views);
        views.get().unwrap();
        store.dispatch("same", None).unwrap();
        assert_eq!(views.get().unwrap(), 0);
        assert_eq!(views.computations(), 2);
    }

    #[test]
    fn test_selector_on_destroyed_store() {
        let store = store();
        let views = store.select(|p: &Page| p.views);
        store.destroy();
        assert!(views.get().is_err());
    }
}
