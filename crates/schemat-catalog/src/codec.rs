//! JSON encoding of catalogs and nodes.
//!
//! # Catalog state
//!
//! A catalog whose entries all have distinct string keys is written as a
//! plain JSON object. Anything else (repeated or missing keys) is written as
//! an array of `[key, value]` pairs, with `null` for a missing key. Inside
//! the array form, the n-th repeat of a key (n >= 1) is written as `key/n`;
//! a key that already ends in `/<digits>` is always suffixed (`/0` for its
//! first occurrence) so that stripping the last suffix on decode is lossless.
//!
//! # Node values
//!
//! | Node | JSON |
//! |---|---|
//! | scalar | the primitive itself |
//! | list | array |
//! | map | object (wrapped as `{"@": "Map", "=": {...}}` if it has an `@` key) |
//! | catalog | `{"@": "Catalog", "=": <state>}` |
//! | reference | `{"@": <id>}` |
//! | non-primitive scalar | `{"@": "Json", "=": <value>}` |
//!
//! Provisional references cannot be encoded; they must be resolved to
//! persisted ids first.

use indexmap::IndexMap;
use schemat_types::ItemId;
use serde_json::{Map, Value};

use crate::catalog::Catalog;
use crate::error::{CatalogError, CatalogResult};
use crate::node::{Node, Reference};

const CLASS: &str = "@";
const STATE: &str = "=";
const TAG_CATALOG: &str = "Catalog";
const TAG_MAP: &str = "Map";
const TAG_JSON: &str = "Json";

impl Catalog {
    /// Encode to the JSON state form.
    pub fn encode(&self) -> CatalogResult<Value> {
        if self.has_unique_keys() {
            let mut obj = Map::with_capacity(self.len());
            for entry in self.entries() {
                let key = entry.key.clone().unwrap_or_default();
                obj.insert(key, encode_node(&entry.value)?);
            }
            return Ok(Value::Object(obj));
        }

        let mut seen: IndexMap<&str, usize> = IndexMap::new();
        let mut pairs = Vec::with_capacity(self.len());
        for entry in self.entries() {
            let key = match entry.key.as_deref() {
                None => Value::Null,
                Some(k) => {
                    let n = seen.entry(k).or_insert(0);
                    let encoded = encode_key(k, *n);
                    *n += 1;
                    Value::String(encoded)
                }
            };
            pairs.push(Value::Array(vec![key, encode_node(&entry.value)?]));
        }
        Ok(Value::Array(pairs))
    }

    /// Decode from the JSON state form produced by [`Catalog::encode`].
    pub fn decode(state: &Value) -> CatalogResult<Self> {
        let mut catalog = Catalog::new();
        match state {
            Value::Object(obj) => {
                for (k, v) in obj {
                    catalog.push(k.as_str(), decode_node(v)?);
                }
            }
            Value::Array(pairs) => {
                for pair in pairs {
                    let (key, value) = match pair.as_array().map(Vec::as_slice) {
                        Some([key, value]) => (key, value),
                        _ => {
                            return Err(CatalogError::Decode(format!(
                                "catalog entry is not a [key, value] pair: {pair}"
                            )))
                        }
                    };
                    let key = match key {
                        Value::Null => None,
                        Value::String(s) => Some(decode_key(s).to_string()),
                        other => {
                            return Err(CatalogError::Decode(format!(
                                "catalog key must be a string or null, got {other}"
                            )))
                        }
                    };
                    catalog.push(key, decode_node(value)?);
                }
            }
            other => {
                return Err(CatalogError::Decode(format!(
                    "catalog state must be an object or array, got {other}"
                )))
            }
        }
        Ok(catalog)
    }

    /// Encode to compact JSON text.
    pub fn dump(&self) -> CatalogResult<String> {
        serde_json::to_string(&self.encode()?).map_err(|e| CatalogError::Serialization(e.to_string()))
    }

    /// Parse JSON text produced by [`Catalog::dump`].
    pub fn load(text: &str) -> CatalogResult<Self> {
        let state: Value =
            serde_json::from_str(text).map_err(|e| CatalogError::Serialization(e.to_string()))?;
        Self::decode(&state)
    }
}

/// Split a trailing `/<digits>` suffix off a key.
fn split_suffix(key: &str) -> Option<(&str, usize)> {
    let (base, n) = key.rsplit_once('/')?;
    if n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((base, n.parse().ok()?))
}

fn encode_key(key: &str, occurrence: usize) -> String {
    if occurrence > 0 || split_suffix(key).is_some() {
        format!("{key}/{occurrence}")
    } else {
        key.to_string()
    }
}

fn decode_key(key: &str) -> &str {
    split_suffix(key).map_or(key, |(base, _)| base)
}

/// Encode a node to its self-describing JSON form.
pub fn encode_node(node: &Node) -> CatalogResult<Value> {
    Ok(match node {
        Node::Scalar(v) if v.is_array() || v.is_object() => tagged(TAG_JSON, v.clone()),
        Node::Scalar(v) => v.clone(),
        Node::List(items) => Value::Array(items.iter().map(encode_node).collect::<CatalogResult<_>>()?),
        Node::Map(m) => {
            let mut obj = Map::with_capacity(m.len());
            for (k, v) in m {
                obj.insert(k.clone(), encode_node(v)?);
            }
            if m.contains_key(CLASS) {
                tagged(TAG_MAP, Value::Object(obj))
            } else {
                Value::Object(obj)
            }
        }
        Node::Catalog(c) => tagged(TAG_CATALOG, c.encode()?),
        Node::Ref(Reference::Persisted(id)) => {
            let mut obj = Map::with_capacity(1);
            obj.insert(CLASS.to_string(), Value::from(id.get()));
            Value::Object(obj)
        }
        Node::Ref(Reference::Provisional(n)) => return Err(CatalogError::UnresolvedReference(*n)),
    })
}

/// Decode a node from its self-describing JSON form.
pub fn decode_node(value: &Value) -> CatalogResult<Node> {
    match value {
        Value::Array(items) => Ok(Node::List(
            items.iter().map(decode_node).collect::<CatalogResult<_>>()?,
        )),
        Value::Object(obj) => match obj.get(CLASS) {
            None => decode_map(obj),
            Some(Value::Number(n)) if obj.len() == 1 => {
                let id = n
                    .as_u64()
                    .ok_or_else(|| CatalogError::Decode(format!("invalid reference id: {n}")))?;
                Ok(Node::Ref(Reference::Persisted(ItemId::new(id))))
            }
            Some(Value::String(tag)) if obj.len() == 2 => {
                let state = obj
                    .get(STATE)
                    .ok_or_else(|| CatalogError::Decode(format!("missing state for {tag}")))?;
                match tag.as_str() {
                    TAG_CATALOG => Ok(Node::Catalog(Catalog::decode(state)?)),
                    TAG_MAP => match state {
                        Value::Object(inner) => decode_map(inner),
                        other => Err(CatalogError::Decode(format!("map state must be an object, got {other}"))),
                    },
                    TAG_JSON => Ok(Node::Scalar(state.clone())),
                    other => Err(CatalogError::Decode(format!("unknown class tag: {other}"))),
                }
            }
            Some(_) => Err(CatalogError::Decode(format!("malformed tagged value: {value}"))),
        },
        primitive => Ok(Node::Scalar(primitive.clone())),
    }
}

fn decode_map(obj: &Map<String, Value>) -> CatalogResult<Node> {
    let mut m = IndexMap::with_capacity(obj.len());
    for (k, v) in obj {
        m.insert(k.clone(), decode_node(v)?);
    }
    Ok(Node::Map(m))
}

fn tagged(tag: &str, state: Value) -> Value {
    let mut obj = Map::with_capacity(2);
    obj.insert(CLASS.to_string(), Value::from(tag));
    obj.insert(STATE.to_string(), state);
    Value::Object(obj)
}
