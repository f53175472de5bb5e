mod ids;
mod key_name;

pub use ids::{random_suffixed_id, SequentialIds};
pub use key_name::storage_file_stem;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the guard if a panicking listener poisoned it.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
