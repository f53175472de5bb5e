//! Store name registry

use crate::error::StateError;
use crate::util::lock;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// Tracks live store names so two stores never share one.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    names: Arc<Mutex<HashSet<String>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`. Fails with `already exists` while another store holds it.
    pub fn reserve(&self, name: &str) -> Result<NameReservation, StateError> {
        let mut names = lock(&self.names);
        if !names.insert(name.to_string()) {
            return Err(StateError::StoreExists {
                name: name.to_string(),
            });
        }
        debug!(store = %name, "store name reserved");
        Ok(NameReservation {
            name: name.to_string(),
            names: Arc::downgrade(&self.names),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.names).contains(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = lock(&self.names).iter().cloned().collect();
        names.sort();
        names
    }
}

/// Holds a registry name until dropped.
#[derive(Debug)]
pub struct NameReservation {
    name: String,
    names: Weak<Mutex<HashSet<String>>>,
}

impl NameReservation {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NameReservation {
    fn drop(&mut self) {
        if let Some(names) = self.names.upgrade() {
            lock(&names).remove(&self.name);
            debug!(store = %self.name, "store name released");
        }
    }
}
