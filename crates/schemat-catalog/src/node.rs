//! The [`Node`] sum type: every value that can live inside a catalog.

use std::fmt;

use indexmap::IndexMap;
use schemat_types::ItemId;
use serde_json::Value;

use crate::catalog::Catalog;

/// A reference from one item's data to another item.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reference {
    /// An item that already has a persisted id.
    Persisted(ItemId),
    /// A newborn item known only by its transaction-local provisional id.
    Provisional(u64),
}

impl Reference {
    pub fn id(&self) -> Option<ItemId> {
        match self {
            Reference::Persisted(id) => Some(*id),
            Reference::Provisional(_) => None,
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Persisted(id) => write!(f, "Ref({id})"),
            Reference::Provisional(n) => write!(f, "Ref(~{n})"),
        }
    }
}

/// A node of a document tree.
///
/// Containers are a closed set, so walks dispatch by `match` instead of
/// probing runtime types. References are opaque leaves: walks never descend
/// into the referenced item and cloning a tree copies the reference, not
/// the target.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Primitive JSON value: null, bool, number, or string.
    Scalar(Value),
    /// Ordered repeatable-key multimap.
    Catalog(Catalog),
    /// Ordered single-valued map.
    Map(IndexMap<String, Node>),
    /// Sequence.
    List(Vec<Node>),
    /// Link to another item.
    Ref(Reference),
}

impl Node {
    pub const fn null() -> Self {
        Node::Scalar(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Scalar(Value::Null))
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Node::Catalog(_) | Node::Map(_) | Node::List(_))
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Node::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Value::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(Value::as_i64)
    }

    pub fn as_catalog(&self) -> Option<&Catalog> {
        match self {
            Node::Catalog(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_catalog_mut(&mut self) -> Option<&mut Catalog> {
        match self {
            Node::Catalog(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Node::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<Reference> {
        match self {
            Node::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// Short name of the node kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Scalar(_) => "scalar",
            Node::Catalog(_) => "catalog",
            Node::Map(_) => "map",
            Node::List(_) => "list",
            Node::Ref(_) => "reference",
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Node::null()
    }
}

impl From<&str> for Node {
    fn from(v: &str) -> Self {
        Node::Scalar(Value::from(v))
    }
}

impl From<String> for Node {
    fn from(v: String) -> Self {
        Node::Scalar(Value::from(v))
    }
}

impl From<bool> for Node {
    fn from(v: bool) -> Self {
        Node::Scalar(Value::from(v))
    }
}

impl From<i64> for Node {
    fn from(v: i64) -> Self {
        Node::Scalar(Value::from(v))
    }
}

impl From<i32> for Node {
    fn from(v: i32) -> Self {
        Node::Scalar(Value::from(v))
    }
}

impl From<u64> for Node {
    fn from(v: u64) -> Self {
        Node::Scalar(Value::from(v))
    }
}

impl From<f64> for Node {
    fn from(v: f64) -> Self {
        Node::Scalar(Value::from(v))
    }
}

impl From<Catalog> for Node {
    fn from(c: Catalog) -> Self {
        Node::Catalog(c)
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::List(items)
    }
}

impl From<IndexMap<String, Node>> for Node {
    fn from(m: IndexMap<String, Node>) -> Self {
        Node::Map(m)
    }
}

impl From<Reference> for Node {
    fn from(r: Reference) -> Self {
        Node::Ref(r)
    }
}

impl From<ItemId> for Node {
    fn from(id: ItemId) -> Self {
        Node::Ref(Reference::Persisted(id))
    }
}
