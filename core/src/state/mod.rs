//! # Observable state store
//!
//! A [`StateStore`] owns one state tree behind an `Arc`, changes it only
//! through dispatched [`StateAction`]s, and notifies subscribers in
//! registration order. Dispatch is synchronous: when `dispatch` returns, the
//! action has been reduced and every live subscriber has seen the result.
//!
//! Stores are named. A [`StoreRegistry`] (held by the
//! [`StateContext`](crate::context::StateContext)) refuses a second live
//! store under the same name.
//!
//! ```no_run
//! use pagestate_core::state::{StateAction, StateStore};
//!
//! let store = StateStore::with_reducer("counter", 0i64, |n: &i64, a: &StateAction| {
//!     (a.action_type == "inc").then(|| n + 1)
//! });
//! let sub = store.subscribe(|n, _| println!("now {n}")).unwrap();
//! store.dispatch("inc", None).unwrap();
//! sub.unsubscribe();
//! ```

pub mod builder;
pub mod reducer;
pub mod registry;
pub mod selector;
pub mod store;
pub mod types;

pub use builder::{BuiltStore, StoreBuilder, STORE_CLEANUP_PRIORITY};
pub use reducer::{
    deep_merge, remove_path, set_path, JsonReducer, NoopReducer, Reducer, JSON_MERGE_ACTION,
    JSON_REMOVE_ACTION, JSON_SET_ACTION,
};
pub use registry::{NameReservation, StoreRegistry};
pub use selector::Selector;
pub use store::{DispatchObserver, StateStore, Subscription, WeakStore};
pub use types::{DispatchRecord, StateAction, StoreState, REPLACE_ACTION, RESET_ACTION};
