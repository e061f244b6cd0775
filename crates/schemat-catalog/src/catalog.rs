//! The [`Catalog`]: an ordered multimap that tolerates missing and repeated
//! keys.
//!
//! Entries keep their insertion order. A side index maps each key to the
//! ascending list of positions where it occurs; every mutation that shifts
//! positions rebuilds that index, so it always mirrors the entry list.

use std::collections::BTreeMap;

use crate::error::{CatalogError, CatalogResult};
use crate::node::Node;
use crate::path::{display, IntoPath, Step};
use crate::walk;

/// A single catalog entry. The key is optional and may repeat.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub key: Option<String>,
    pub value: Node,
}

impl Entry {
    pub fn new(key: impl IntoKey, value: impl Into<Node>) -> Self {
        Self {
            key: key.into_key(),
            value: value.into(),
        }
    }
}

/// Anything usable as a catalog key: a string, or nothing.
pub trait IntoKey {
    fn into_key(self) -> Option<String>;
}

impl IntoKey for &str {
    fn into_key(self) -> Option<String> {
        Some(self.to_string())
    }
}

impl IntoKey for String {
    fn into_key(self) -> Option<String> {
        Some(self)
    }
}

impl IntoKey for &String {
    fn into_key(self) -> Option<String> {
        Some(self.clone())
    }
}

impl IntoKey for Option<&str> {
    fn into_key(self) -> Option<String> {
        self.map(str::to_string)
    }
}

impl IntoKey for Option<String> {
    fn into_key(self) -> Option<String> {
        self
    }
}

/// Ordered, repeatable-key document container.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: Vec<Entry>,
    /// key -> ascending positions in `entries`. Unkeyed entries are not indexed.
    index: BTreeMap<String, Vec<usize>>,
}

impl PartialEq for Catalog {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from `(key, value)` pairs, keeping their order.
    pub fn from_entries<K, V, I>(entries: I) -> Self
    where
        K: IntoKey,
        V: Into<Node>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| Entry::new(k, v))
            .collect();
        let mut catalog = Self {
            entries,
            index: BTreeMap::new(),
        };
        catalog.reindex();
        catalog
    }

    /// Append an entry at the end.
    pub fn push(&mut self, key: impl IntoKey, value: impl Into<Node>) {
        let entry = Entry::new(key, value);
        if let Some(k) = &entry.key {
            self.index
                .entry(k.clone())
                .or_default()
                .push(self.entries.len());
        }
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entry at a numeric position. O(1).
    pub fn entry(&self, pos: usize) -> Option<&Entry> {
        self.entries.get(pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &Node)> {
        self.entries.iter().map(|e| (e.key.as_deref(), &e.value))
    }

    /// Distinct keys in order of first occurrence.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<(usize, &str)> = self
            .index
            .iter()
            .map(|(k, positions)| (positions[0], k.as_str()))
            .collect();
        keys.sort_unstable();
        keys.into_iter().map(|(_, k)| k).collect()
    }

    /// Ascending positions at which `key` occurs.
    pub fn positions(&self, key: &str) -> &[usize] {
        self.index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// True if every entry has a key and no key repeats, i.e. the content
    /// happens to be a plain mapping.
    pub fn has_unique_keys(&self) -> bool {
        self.entries.iter().all(|e| e.key.is_some()) && self.index.values().all(|p| p.len() == 1)
    }

    // ---------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------

    /// First value matching `path`, or `None` if any step does not resolve.
    pub fn get(&self, path: impl IntoPath) -> Option<&Node> {
        let steps = path.into_steps();
        let (first, rest) = steps.split_first()?;
        walk::get(self.step(first)?, rest)
    }

    pub fn get_mut(&mut self, path: impl IntoPath) -> Option<&mut Node> {
        let steps = path.into_steps();
        let (first, rest) = steps.split_first()?;
        walk::get_mut(self.step_mut(first)?, rest)
    }

    /// Every value matching `path`, fanning out over repeated keys at each
    /// catalog level.
    pub fn get_all(&self, path: impl IntoPath) -> Vec<&Node> {
        let steps = path.into_steps();
        let Some((first, rest)) = steps.split_first() else {
            return Vec::new();
        };
        self.step_all(first)
            .into_iter()
            .flat_map(|node| walk::yield_all(node, rest))
            .collect()
    }

    pub(crate) fn step(&self, step: &Step) -> Option<&Node> {
        let pos = match step {
            Step::Key(k) => *self.positions(k).first()?,
            Step::Index(i) => *i,
        };
        self.entries.get(pos).map(|e| &e.value)
    }

    pub(crate) fn step_mut(&mut self, step: &Step) -> Option<&mut Node> {
        let pos = match step {
            Step::Key(k) => *self.positions(k).first()?,
            Step::Index(i) => *i,
        };
        self.entries.get_mut(pos).map(|e| &mut e.value)
    }

    pub(crate) fn step_all(&self, step: &Step) -> Vec<&Node> {
        match step {
            Step::Key(k) => self
                .positions(k)
                .iter()
                .map(|&p| &self.entries[p].value)
                .collect(),
            Step::Index(i) => self.entries.get(*i).map(|e| &e.value).into_iter().collect(),
        }
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Set a single value at `path`. See [`Catalog::set_all`].
    pub fn set(&mut self, path: impl IntoPath, value: impl Into<Node>) -> CatalogResult<()> {
        self.set_all(path, vec![value.into()])
    }

    /// Set the terminal key of `path` to `values`.
    ///
    /// If the key occurs exactly once and exactly one value is given, the
    /// value is overwritten in place. Otherwise every occurrence is removed
    /// and the values are appended at the end, so single-valued keys keep a
    /// stable position and multi-valued writes have append semantics.
    pub fn set_all(&mut self, path: impl IntoPath, values: Vec<Node>) -> CatalogResult<()> {
        let steps = path.into_steps();
        match steps.split_first() {
            None => Err(CatalogError::InvalidArgument("empty path".into())),
            Some((only, [])) => self.set_step(only, values),
            Some((first, rest)) => {
                let child = self
                    .step_mut(first)
                    .ok_or_else(|| CatalogError::PathNotFound(display(&steps[..1])))?;
                walk::set(child, rest, values)
            }
        }
    }

    pub(crate) fn set_step(&mut self, step: &Step, values: Vec<Node>) -> CatalogResult<()> {
        match step {
            Step::Key(key) => {
                let positions = self.positions(key);
                if positions.len() == 1 && values.len() == 1 {
                    let pos = positions[0];
                    if let Some(value) = values.into_iter().next() {
                        self.entries[pos].value = value;
                    }
                    return Ok(());
                }
                self.entries.retain(|e| e.key.as_deref() != Some(key.as_str()));
                self.entries.extend(values.into_iter().map(|v| Entry {
                    key: Some(key.clone()),
                    value: v,
                }));
                self.reindex();
                Ok(())
            }
            Step::Index(pos) => {
                let len = self.entries.len();
                let value = walk::single(values, "positional set")?;
                let entry = self
                    .entries
                    .get_mut(*pos)
                    .ok_or(CatalogError::OutOfRange { pos: *pos, len })?;
                entry.value = value;
                Ok(())
            }
        }
    }

    /// Insert entries at `pos` of the first collection located by `path`
    /// (the catalog itself when `path` is empty).
    pub fn insert(
        &mut self,
        path: impl IntoPath,
        pos: usize,
        key: impl IntoKey,
        values: Vec<Node>,
    ) -> CatalogResult<()> {
        let steps = path.into_steps();
        if steps.is_empty() {
            return self.insert_at(pos, key.into_key(), values);
        }
        let target = self
            .get_mut(steps.clone())
            .ok_or_else(|| CatalogError::PathNotFound(display(&steps)))?;
        walk::insert(target, pos, key.into_key(), values)
    }

    pub(crate) fn insert_at(
        &mut self,
        pos: usize,
        key: Option<String>,
        values: Vec<Node>,
    ) -> CatalogResult<()> {
        let len = self.entries.len();
        if pos > len {
            return Err(CatalogError::OutOfRange { pos, len });
        }
        let new_entries = values.into_iter().map(|value| Entry {
            key: key.clone(),
            value,
        });
        self.entries.splice(pos..pos, new_entries);
        self.reindex();
        Ok(())
    }

    /// Delete what `path` addresses in the first matching collection and
    /// return how many entries were removed. A key step removes every
    /// occurrence of that key.
    pub fn delete(&mut self, path: impl IntoPath) -> usize {
        let steps = path.into_steps();
        match steps.split_last() {
            None => 0,
            Some((last, [])) => self.delete_step(last),
            Some((last, parent)) => match self.get_mut(parent.to_vec()) {
                Some(target) => walk::delete(target, last),
                None => 0,
            },
        }
    }

    pub(crate) fn delete_step(&mut self, step: &Step) -> usize {
        let removed = match step {
            Step::Key(key) => {
                let before = self.entries.len();
                self.entries.retain(|e| e.key.as_deref() != Some(key.as_str()));
                before - self.entries.len()
            }
            Step::Index(pos) if *pos < self.entries.len() => {
                self.entries.remove(*pos);
                1
            }
            Step::Index(_) => 0,
        };
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    /// Move the entry at `pos1` so that it ends up at `pos2`, inside the
    /// first collection located by `path`.
    pub fn move_entry(&mut self, path: impl IntoPath, pos1: usize, pos2: usize) -> CatalogResult<()> {
        let steps = path.into_steps();
        if steps.is_empty() {
            return self.move_items(pos1, pos2, 1);
        }
        let target = self
            .get_mut(steps.clone())
            .ok_or_else(|| CatalogError::PathNotFound(display(&steps)))?;
        walk::move_items(target, pos1, pos2, 1)
    }

    /// Relocate `count` consecutive entries starting at `pos1` so the first
    /// of them lands at `pos2` (a position in the list after removal).
    pub fn move_items(&mut self, pos1: usize, pos2: usize, count: usize) -> CatalogResult<()> {
        walk::move_in_vec(&mut self.entries, pos1, pos2, count)?;
        self.reindex();
        Ok(())
    }

    // ---------------------------------------------------------------
    // Tree operations over entries
    // ---------------------------------------------------------------

    /// Pre-order map over every entry value (see [`walk::transform`]).
    pub fn transform<F>(&self, f: &mut F) -> Catalog
    where
        F: FnMut(&Node, &[Step]) -> Option<Node>,
    {
        walk::transform_catalog(self, f, &mut Vec::new())
    }

    /// Pre-order visit of every entry value (see [`walk::collect`]).
    pub fn collect<F>(&self, f: &mut F)
    where
        F: FnMut(&Node, &[Step]) -> bool,
    {
        walk::collect_catalog(self, f, &mut Vec::new())
    }

    /// The step that addresses exactly the entry at `pos`: its key when the
    /// key is present and unique, the position otherwise.
    pub(crate) fn entry_step(&self, pos: usize) -> Step {
        match &self.entries[pos].key {
            Some(k) if self.positions(k).len() == 1 => Step::Key(k.clone()),
            _ => Step::Index(pos),
        }
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (pos, entry) in self.entries.iter().enumerate() {
            if let Some(k) = &entry.key {
                self.index.entry(k.clone()).or_default().push(pos);
            }
        }
    }
}

impl<K: IntoKey, V: Into<Node>> FromIterator<(K, V)> for Catalog {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Step;
    use proptest::prelude::*;

    fn sample() -> Catalog {
        Catalog::from_entries([
            (Some("name"), Node::from("widget")),
            (Some("tag"), Node::from("a")),
            (None, Node::from(1i64)),
            (Some("tag"), Node::from("b")),
        ])
    }

    fn assert_index_consistent(c: &Catalog) {
        for key in c.keys() {
            let expected: Vec<usize> = c
                .entries()
                .iter()
                .enumerate()
                .filter(|(_, e)| e.key.as_deref() == Some(key))
                .map(|(i, _)| i)
                .collect();
            assert_eq!(c.positions(key), expected.as_slice(), "key {key}");
        }
        let indexed: usize = c.keys().iter().map(|k| c.positions(k).len()).sum();
        let keyed = c.entries().iter().filter(|e| e.key.is_some()).count();
        assert_eq!(indexed, keyed);
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    #[test]
    fn get_returns_first_occurrence() {
        let c = sample();
        assert_eq!(c.get("tag").and_then(Node::as_str), Some("a"));
        assert_eq!(c.get("missing"), None);
    }

    #[test]
    fn get_all_returns_every_occurrence() {
        let c = sample();
        let tags: Vec<_> = c.get_all("tag").into_iter().filter_map(Node::as_str).collect();
        assert_eq!(tags, vec!["a", "b"]);
    }

    #[test]
    fn positional_lookup() {
        let c = sample();
        assert_eq!(c.get(2usize).and_then(Node::as_i64), Some(1));
        assert_eq!(c.get(10usize), None);
        assert_eq!(c.entry(0).and_then(|e| e.key.as_deref()), Some("name"));
    }

    #[test]
    fn nested_paths_cross_container_kinds() {
        let mut inner = Catalog::new();
        inner.push("list", Node::List(vec![Node::from("x"), Node::from("y")]));
        let mut c = Catalog::new();
        c.push("inner", inner);
        assert_eq!(c.get("inner/list/1").and_then(Node::as_str), Some("y"));
        assert_eq!(c.get("inner/list/5"), None);
        assert_eq!(c.get("inner/list/x"), None);
    }

    #[test]
    fn keys_in_first_occurrence_order() {
        let c = Catalog::from_entries([("z", 1i64), ("a", 2), ("z", 3)]);
        assert_eq!(c.keys(), vec!["z", "a"]);
    }

    // -----------------------------------------------------------------------
    // set
    // -----------------------------------------------------------------------

    #[test]
    fn set_single_key_overwrites_in_place() {
        let mut c = sample();
        c.set("name", "gadget").unwrap();
        assert_eq!(c.entry(0).unwrap().value, Node::from("gadget"));
        assert_eq!(c.len(), 4);
    }

    #[test]
    fn set_repeated_key_replaces_and_appends() {
        let mut c = sample();
        c.set("tag", "only").unwrap();
        assert_eq!(c.len(), 3);
        assert_eq!(c.positions("tag"), &[2]);
        assert_eq!(c.get("tag").and_then(Node::as_str), Some("only"));
        assert_index_consistent(&c);
    }

    #[test]
    fn set_many_values_appends_all() {
        let mut c = sample();
        c.set_all("name", vec![Node::from("p"), Node::from("q")]).unwrap();
        assert_eq!(c.positions("name"), &[3, 4]);
        assert_index_consistent(&c);
    }

    #[test]
    fn set_new_key_appends() {
        let mut c = sample();
        c.set("color", "red").unwrap();
        assert_eq!(c.positions("color"), &[4]);
    }

    #[test]
    fn set_nested_requires_existing_parent() {
        let mut c = sample();
        let err = c.set("nope/child", 1i64).unwrap_err();
        assert!(matches!(err, CatalogError::PathNotFound(_)));
    }

    #[test]
    fn set_nested_into_catalog() {
        let mut c = Catalog::new();
        c.push("inner", Catalog::new());
        c.set("inner/x", 5i64).unwrap();
        assert_eq!(c.get("inner/x").and_then(Node::as_i64), Some(5));
    }

    #[test]
    fn set_by_position() {
        let mut c = sample();
        c.set([Step::Index(2)], 99i64).unwrap();
        assert_eq!(c.get(2usize).and_then(Node::as_i64), Some(99));
        let err = c.set([Step::Index(9)], 1i64).unwrap_err();
        assert_eq!(err, CatalogError::OutOfRange { pos: 9, len: 4 });
    }

    // -----------------------------------------------------------------------
    // insert / delete / move
    // -----------------------------------------------------------------------

    #[test]
    fn insert_shifts_positions() {
        let mut c = sample();
        c.insert("", 0, "first", vec![Node::from(true)]).unwrap();
        assert_eq!(c.positions("first"), &[0]);
        assert_eq!(c.positions("tag"), &[2, 4]);
        assert_index_consistent(&c);
    }

    #[test]
    fn insert_past_end_fails() {
        let mut c = sample();
        let err = c.insert("", 9, "x", vec![Node::null()]).unwrap_err();
        assert_eq!(err, CatalogError::OutOfRange { pos: 9, len: 4 });
    }

    #[test]
    fn delete_counts_removed_entries() {
        let mut c = sample();
        assert_eq!(c.delete("tag"), 2);
        assert_eq!(c.delete("tag"), 0);
        assert_eq!(c.len(), 2);
        assert_index_consistent(&c);
    }

    #[test]
    fn delete_missing_parent_is_zero() {
        let mut c = sample();
        assert_eq!(c.delete("nope/x"), 0);
    }

    #[test]
    fn move_entry_reindexes() {
        let mut c = sample();
        c.move_entry("", 0, 3).unwrap();
        assert_eq!(c.positions("name"), &[3]);
        assert_eq!(c.positions("tag"), &[0, 2]);
        assert_index_consistent(&c);
    }

    #[test]
    fn move_out_of_range_fails() {
        let mut c = sample();
        assert!(c.move_items(3, 0, 2).is_err());
        assert!(c.move_items(0, 4, 1).is_err());
    }

    #[test]
    fn unique_keys_detection() {
        assert!(Catalog::from_entries([("a", 1i64), ("b", 2)]).has_unique_keys());
        assert!(!sample().has_unique_keys());
        assert!(!Catalog::from_entries([(None::<&str>, 1i64)]).has_unique_keys());
        assert!(Catalog::new().has_unique_keys());
    }

    // -----------------------------------------------------------------------
    // Position-index integrity under random edits
    // -----------------------------------------------------------------------

    #[derive(Clone, Debug)]
    enum Op {
        Set(u8, u8),
        Insert(u8, u8),
        Delete(u8),
        Move(u8, u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4, 1u8..3).prop_map(|(k, n)| Op::Set(k, n)),
            (0u8..12, 0u8..4).prop_map(|(p, k)| Op::Insert(p, k)),
            (0u8..4).prop_map(Op::Delete),
            (0u8..12, 0u8..12).prop_map(|(a, b)| Op::Move(a, b)),
        ]
    }

    proptest! {
        #[test]
        fn index_tracks_entries(ops in proptest::collection::vec(op(), 0..40)) {
            let keys = ["a", "b", "c", "d"];
            let mut c = Catalog::new();
            for op in ops {
                match op {
                    Op::Set(k, n) => {
                        let values = (0..n).map(|i| Node::from(i as i64)).collect();
                        c.set_all(keys[k as usize], values).unwrap();
                    }
                    Op::Insert(p, k) => {
                        let pos = (p as usize).min(c.len());
                        c.insert("", pos, keys[k as usize], vec![Node::null()]).unwrap();
                    }
                    Op::Delete(k) => {
                        c.delete(keys[k as usize]);
                    }
                    Op::Move(a, b) => {
                        let _ = c.move_entry("", a as usize, b as usize);
                    }
                }
                assert_index_consistent(&c);
            }
        }
    }
}
