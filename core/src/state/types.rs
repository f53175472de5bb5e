//! Store value and action types

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Bound for anything a store can hold: a cloneable, serializable tree.
pub trait StoreState: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StoreState for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Replace the whole state with the payload (deserialized into the store's type).
pub const REPLACE_ACTION: &str = "@@store/REPLACE";
/// Return to the state the store was constructed with.
pub const RESET_ACTION: &str = "@@store/RESET";

/// A typed description of an intended state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl StateAction {
    pub fn new(action_type: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            action_type: action_type.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Deserialize the payload, `None` when absent or mis-shaped.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.payload
            .clone()
            .and_then(|p| serde_json::from_value(p).ok())
    }

    pub fn is_builtin(&self) -> bool {
        self.action_type.starts_with("@@store/")
    }
}

/// What dispatch observers see after subscribers have been notified.
#[derive(Debug, Clone)]
pub struct DispatchRecord<S> {
    pub action: StateAction,
    pub prev: Arc<S>,
    pub next: Arc<S>,
    /// Reducer plus subscriber notification.
    pub duration: Duration,
}

impl<S> DispatchRecord<S> {
    /// Whether the dispatch installed a new state reference.
    pub fn changed(&self) -> bool {
        !Arc::ptr_eq(&self.prev, &self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_wire_shape() {
        let action = StateAction::new("theme/setMode", Some(json!({"mode": "dark"})));
        let v = serde_json::to_value(&action).unwrap();
        assert_eq!(v["type"], "theme/setMode");
        assert_eq!(v["payload"]["mode"], "dark");
        assert!(v.get("timestamp").is_some());

        let bare = serde_json::to_value(StateAction::new("ping", None)).unwrap();
        assert!(bare.get("payload").is_none());
    }

    #[test]
    fn payload_as_tolerates_mismatch() {
        let action = StateAction::new("x", Some(json!("not a number")));
        assert_eq!(action.payload_as::<u32>(), None);
        assert_eq!(action.payload_as::<String>().as_deref(), Some("not a number"));
    }
}
