use serde::{Deserialize, Serialize};
use serde_json::Value;

use schemat_catalog::{decode_node, Catalog};

use crate::error::DbResult;

/// A serializable change to a stored record.
///
/// Edits are pure: [`Edit::apply`] maps an old encoded record to a new one
/// and never touches storage, so the same edit list can be shipped to a
/// remote ring and replayed there.
///
/// Serialized as `{"type": "...", "payload": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Edit {
    /// Replace the whole record.
    Total(Value),
    /// Set the value at a catalog path. `value` is an encoded node.
    Set { path: String, value: Value },
    /// Remove every entry matched by a catalog path.
    Delete { path: String },
}

impl Edit {
    /// Replace the whole record with `data`.
    pub fn total(data: Value) -> Self {
        Edit::Total(data)
    }

    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Edit::Set {
            path: path.into(),
            value,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Edit::Delete { path: path.into() }
    }

    /// Apply this edit to an encoded record and return the new encoding.
    pub fn apply(&self, old: &Value) -> DbResult<Value> {
        match self {
            Edit::Total(data) => Ok(data.clone()),
            Edit::Set { path, value } => {
                let mut catalog = Catalog::decode(old)?;
                catalog.set(path.as_str(), decode_node(value)?)?;
                Ok(catalog.encode()?)
            }
            Edit::Delete { path } => {
                let mut catalog = Catalog::decode(old)?;
                catalog.delete(path.as_str());
                Ok(catalog.encode()?)
            }
        }
    }
}

/// Apply `edits` in order.
pub fn apply_all(old: &Value, edits: &[Edit]) -> DbResult<Value> {
    let mut data = old.clone();
    for edit in edits {
        data = edit.apply(&data)?;
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn total_replaces_record() {
        let edit = Edit::total(json!({"name": "new"}));
        assert_eq!(edit.apply(&json!({"name": "old", "x": 1})).unwrap(), json!({"name": "new"}));
    }

    #[test]
    fn set_writes_path() {
        let edit = Edit::set("meta/title", json!("T"));
        let out = edit.apply(&json!({"name": "a", "meta": {"@": "Catalog", "=": {}}})).unwrap();
        assert_eq!(
            out,
            json!({"name": "a", "meta": {"@": "Catalog", "=": {"title": "T"}}})
        );
    }

    #[test]
    fn set_on_empty_record_appends() {
        let out = Edit::set("x", json!(5)).apply(&json!({})).unwrap();
        assert_eq!(out, json!({"x": 5}));
    }

    #[test]
    fn delete_removes_all_occurrences() {
        let old = json!([["tag", "a"], ["name", "n"], ["tag/1", "b"]]);
        let out = Edit::delete("tag").apply(&old).unwrap();
        assert_eq!(out, json!({"name": "n"}));
    }

    #[test]
    fn delete_missing_path_is_noop() {
        let old = json!({"name": "n"});
        assert_eq!(Edit::delete("nope").apply(&old).unwrap(), old);
    }

    #[test]
    fn edits_apply_in_order() {
        let edits = vec![
            Edit::set("a", json!(1)),
            Edit::set("b", json!(2)),
            Edit::delete("a"),
        ];
        assert_eq!(apply_all(&json!({}), &edits).unwrap(), json!({"b": 2}));
    }

    #[test]
    fn set_through_scalar_fails() {
        let err = Edit::set("name/x", json!(1)).apply(&json!({"name": "n"}));
        assert!(err.is_err());
    }

    // ------------------------------------------------------------------
    // Wire form
    // ------------------------------------------------------------------

    #[test]
    fn wire_form_is_tagged() {
        let edit = Edit::set("a/b", json!(3));
        let text = serde_json::to_value(&edit).unwrap();
        assert_eq!(text, json!({"type": "set", "payload": {"path": "a/b", "value": 3}}));

        let back: Edit = serde_json::from_value(json!({"type": "delete", "payload": {"path": "x"}})).unwrap();
        assert_eq!(back, Edit::delete("x"));

        let total: Edit = serde_json::from_value(json!({"type": "total", "payload": {"k": 1}})).unwrap();
        assert_eq!(total, Edit::total(json!({"k": 1})));
    }
}
