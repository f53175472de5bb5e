//! Reducers: pure next-state functions

use super::types::StateAction;
use serde_json::{Map, Value};

/// Computes the next state for an action. `None` means the action is not
/// handled; the store keeps the current state reference.
pub trait Reducer<S>: Send + Sync {
    fn reduce(&self, state: &S, action: &StateAction) -> Option<S>;
}

impl<S, F> Reducer<S> for F
where
    F: Fn(&S, &StateAction) -> Option<S> + Send + Sync,
{
    fn reduce(&self, state: &S, action: &StateAction) -> Option<S> {
        self(state, action)
    }
}

/// Handles nothing; only the built-in store actions apply.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReducer;

impl<S> Reducer<S> for NoopReducer {
    fn reduce(&self, _state: &S, _action: &StateAction) -> Option<S> {
        None
    }
}

pub const JSON_SET_ACTION: &str = "@@json/SET";
pub const JSON_MERGE_ACTION: &str = "@@json/MERGE";
pub const JSON_REMOVE_ACTION: &str = "@@json/REMOVE";

/// Path-addressed edits for untyped `serde_json::Value` stores.
///
/// - `@@json/SET {"path": "a.b", "value": ...}` creates intermediate objects
/// - `@@json/MERGE {...}` deep-merges an object into the root
/// - `@@json/REMOVE {"path": "a.b"}`
///
/// An empty path addresses the root.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReducer;

impl Reducer<Value> for JsonReducer {
    fn reduce(&self, state: &Value, action: &StateAction) -> Option<Value> {
        let payload = action.payload.as_ref()?;
        match action.action_type.as_str() {
            JSON_SET_ACTION => {
                let path = payload.get("path")?.as_str()?;
                let value = payload.get("value")?.clone();
                let mut next = state.clone();
                set_path(&mut next, path, value);
                Some(next)
            }
            JSON_MERGE_ACTION => {
                if !payload.is_object() {
                    return None;
                }
                let mut next = state.clone();
                deep_merge(&mut next, payload);
                Some(next)
            }
            JSON_REMOVE_ACTION => {
                let path = payload.get("path")?.as_str()?;
                let mut next = state.clone();
                remove_path(&mut next, path).then_some(next)
            }
            _ => None,
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

pub fn set_path(target: &mut Value, path: &str, value: Value) {
    let parts = segments(path);
    let Some((last, parents)) = parts.split_last() else {
        *target = value;
        return;
    };

    let mut cursor = target;
    for part in parents {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        let Value::Object(map) = cursor else {
            return;
        };
        cursor = map.entry(part.to_string()).or_insert(Value::Null);
    }
    if !cursor.is_object() {
        *cursor = Value::Object(Map::new());
    }
    if let Value::Object(map) = cursor {
        map.insert(last.to_string(), value);
    }
}

pub fn remove_path(target: &mut Value, path: &str) -> bool {
    let parts = segments(path);
    let Some((last, parents)) = parts.split_last() else {
        return false;
    };

    let mut cursor = target;
    for part in parents {
        cursor = match cursor.get_mut(*part) {
            Some(next) => next,
            None => return false,
        };
    }
    cursor
        .as_object_mut()
        .map(|m| m.remove(*last).is_some())
        .unwrap_or(false)
}

pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(t), Value::Object(p)) => {
            for (k, v) in p {
                let nested = v.is_object() && t.get(k).is_some_and(Value::is_object);
                if nested {
                    if let Some(existing) = t.get_mut(k) {
                        deep_merge(existing, v);
                    }
                } else {
                    t.insert(k.clone(), v.clone());
                }
            }
        }
        (t, p) => *t = p.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(state: Value, ty: &str, payload: Value) -> Option<Value> {
        JsonReducer.reduce(&state, &StateAction::new(ty, Some(payload)))
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let next = run(json!({}), JSON_SET_ACTION, json!({"path": "a.b.c", "value": 1})).unwrap();
        assert_eq!(next, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn set_with_empty_path_replaces_root() {
        let next = run(json!({"x": 1}), JSON_SET_ACTION, json!({"path": "", "value": [1, 2]})).unwrap();
        assert_eq!(next, json!([1, 2]));
    }

    #[test]
    fn merge_is_deep() {
        let state = json!({"theme": {"mode": "light", "auto": true}, "n": 1});
        let next = run(state, JSON_MERGE_ACTION, json!({"theme": {"mode": "dark"}})).unwrap();
        assert_eq!(next, json!({"theme": {"mode": "dark", "auto": true}, "n": 1}));
    }

    #[test]
    fn remove_missing_path_is_unhandled() {
        assert!(run(json!({"a": 1}), JSON_REMOVE_ACTION, json!({"path": "b"})).is_none());
        let next = run(json!({"a": {"b": 1, "c": 2}}), JSON_REMOVE_ACTION, json!({"path": "a.b"}));
        assert_eq!(next, Some(json!({"a": {"c": 2}})));
    }

    #[test]
    fn unknown_action_is_unhandled() {
        assert!(run(json!({}), "whatever", json!({})).is_none());
    }

    #[test]
    fn closures_are_reducers() {
        let counter = |s: &i64, a: &StateAction| (a.action_type == "inc").then_some(s + 1);
        assert_eq!(counter.reduce(&1, &StateAction::new("inc", None)), Some(2));
        assert_eq!(counter.reduce(&1, &StateAction::new("dec", None)), None);
    }
}
