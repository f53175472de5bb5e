use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// One leaf-level difference between two state trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// Dotted object path; empty for the root.
    pub path: String,
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

/// Differences from `prev` to `next`.
///
/// Deep mode descends into nested objects; shallow mode compares top-level
/// keys only. Arrays and scalars are compared as whole values.
pub fn diff_states(prev: &Value, next: &Value, deep: bool) -> Vec<StateChange> {
    let mut changes = Vec::new();
    diff_into(&mut changes, String::new(), prev, next, deep);
    changes
}

fn diff_into(out: &mut Vec<StateChange>, path: String, prev: &Value, next: &Value, descend: bool) {
    match (prev, next) {
        (Value::Object(a), Value::Object(b)) => diff_objects(out, &path, a, b, descend),
        _ if prev != next => out.push(StateChange {
            path,
            kind: ChangeKind::Modified,
            before: Some(prev.clone()),
            after: Some(next.clone()),
        }),
        _ => {}
    }
}

fn diff_objects(
    out: &mut Vec<StateChange>,
    path: &str,
    prev: &Map<String, Value>,
    next: &Map<String, Value>,
    deep: bool,
) {
    for (key, before) in prev {
        let child = join(path, key);
        match next.get(key) {
            None => out.push(StateChange {
                path: child,
                kind: ChangeKind::Removed,
                before: Some(before.clone()),
                after: None,
            }),
            Some(after) if deep => diff_into(out, child, before, after, true),
            Some(after) if before != after => out.push(StateChange {
                path: child,
                kind: ChangeKind::Modified,
                before: Some(before.clone()),
                after: Some(after.clone()),
            }),
            Some(_) => {}
        }
    }
    for (key, after) in next {
        if !prev.contains_key(key) {
            out.push(StateChange {
                path: join(path, key),
                kind: ChangeKind::Added,
                before: None,
                after: Some(after.clone()),
            });
        }
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(changes: &[StateChange]) -> Vec<(&str, ChangeKind)> {
        changes.iter().map(|c| (c.path.as_str(), c.kind)).collect()
    }

    #[test]
    fn deep_diff_reports_leaves() {
        let prev = json!({"theme": {"mode": "light", "auto": true}, "old": 1});
        let next = json!({"theme": {"mode": "dark", "auto": true}, "new": [1]});
        let mut changes = diff_states(&prev, &next, true);
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(
            paths(&changes),
            vec![
                ("new", ChangeKind::Added),
                ("old", ChangeKind::Removed),
                ("theme.mode", ChangeKind::Modified),
            ]
        );
        assert_eq!(changes[2].before, Some(json!("light")));
        assert_eq!(changes[2].after, Some(json!("dark")));
    }

    #[test]
    fn shallow_diff_stops_at_top_level() {
        let prev = json!({"theme": {"mode": "light"}, "n": 1});
        let next = json!({"theme": {"mode": "dark"}, "n": 1});
        let changes = diff_states(&prev, &next, false);
        assert_eq!(paths(&changes), vec![("theme", ChangeKind::Modified)]);
    }

    #[test]
    fn scalar_roots_and_identical_trees() {
        assert_eq!(paths(&diff_states(&json!(1), &json!(2), true)), vec![("", ChangeKind::Modified)]);
        assert!(diff_states(&json!({"a": [1, 2]}), &json!({"a": [1, 2]}), true).is_empty());
    }

    #[test]
    fn change_wire_shape() {
        let change = &diff_states(&json!({}), &json!({"a": 1}), true)[0];
        let v = serde_json::to_value(change).unwrap();
        assert_eq!(v, json!({"path": "a", "kind": "added", "after": 1}));
    }
}
