//! Generic tree operations over [`Node`]s.
//!
//! Every function dispatches on the node kind, so callers never need to
//! special-case catalogs, maps, or lists. Only catalogs produce more than
//! one branch per step (a repeated key fans out over all its occurrences);
//! everything else yields at most one.

use crate::catalog::Catalog;
use crate::error::{CatalogError, CatalogResult};
use crate::node::Node;
use crate::path::{display, Step};

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Resolve one step to the first matching child.
pub fn child<'a>(node: &'a Node, step: &Step) -> Option<&'a Node> {
    match node {
        Node::Catalog(c) => c.step(step),
        Node::Map(m) => match step {
            Step::Key(k) => m.get(k.as_str()),
            Step::Index(i) => m.get_index(*i).map(|(_, v)| v),
        },
        Node::List(items) => step.as_position().and_then(|i| items.get(i)),
        Node::Scalar(_) | Node::Ref(_) => None,
    }
}

pub fn child_mut<'a>(node: &'a mut Node, step: &Step) -> Option<&'a mut Node> {
    match node {
        Node::Catalog(c) => c.step_mut(step),
        Node::Map(m) => match step {
            Step::Key(k) => m.get_mut(k.as_str()),
            Step::Index(i) => m.get_index_mut(*i).map(|(_, v)| v),
        },
        Node::List(items) => step.as_position().and_then(move |i| items.get_mut(i)),
        Node::Scalar(_) | Node::Ref(_) => None,
    }
}

fn children_all<'a>(node: &'a Node, step: &Step) -> Vec<&'a Node> {
    match node {
        Node::Catalog(c) => c.step_all(step),
        other => child(other, step).into_iter().collect(),
    }
}

/// First node at `path`. An empty path returns `node` itself.
pub fn get<'a>(node: &'a Node, path: &[Step]) -> Option<&'a Node> {
    let mut current = node;
    for step in path {
        current = child(current, step)?;
    }
    Some(current)
}

pub fn get_mut<'a>(node: &'a mut Node, path: &[Step]) -> Option<&'a mut Node> {
    let mut current = node;
    for step in path {
        current = child_mut(current, step)?;
    }
    Some(current)
}

/// Every node at `path`, fanning out over repeated catalog keys.
pub fn yield_all<'a>(node: &'a Node, path: &[Step]) -> Vec<&'a Node> {
    let mut current = vec![node];
    for step in path {
        current = current
            .into_iter()
            .flat_map(|n| children_all(n, step))
            .collect();
        if current.is_empty() {
            break;
        }
    }
    current
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

/// Set the terminal step of `path` (relative to `node`) to `values`.
///
/// Intermediate steps follow the first match. Catalog targets use the
/// overwrite-or-append rule of [`Catalog::set_all`]; maps and lists take
/// exactly one value (an empty list removes a map key).
pub fn set(node: &mut Node, path: &[Step], values: Vec<Node>) -> CatalogResult<()> {
    let (last, parent) = path
        .split_last()
        .ok_or_else(|| CatalogError::InvalidArgument("empty path".into()))?;
    let target = get_mut(node, parent).ok_or_else(|| CatalogError::PathNotFound(display(parent)))?;
    set_child(target, last, values)
}

fn set_child(target: &mut Node, step: &Step, values: Vec<Node>) -> CatalogResult<()> {
    match target {
        Node::Catalog(c) => c.set_step(step, values),
        Node::Map(m) => {
            let key = match step {
                Step::Key(k) => k.clone(),
                Step::Index(i) => m
                    .get_index(*i)
                    .map(|(k, _)| k.clone())
                    .ok_or(CatalogError::OutOfRange { pos: *i, len: m.len() })?,
            };
            if values.is_empty() {
                m.shift_remove(&key);
                return Ok(());
            }
            let value = single(values, "map key")?;
            m.insert(key, value);
            Ok(())
        }
        Node::List(items) => {
            let pos = step
                .as_position()
                .ok_or_else(|| CatalogError::InvalidArgument(format!("not a list index: {step}")))?;
            let value = single(values, "list element")?;
            let len = items.len();
            if pos < len {
                items[pos] = value;
            } else if pos == len {
                items.push(value);
            } else {
                return Err(CatalogError::OutOfRange { pos, len });
            }
            Ok(())
        }
        other => Err(CatalogError::NotAContainer(other.kind().to_string())),
    }
}

/// Remove what `step` addresses inside `target`; returns the removed count.
pub fn delete(target: &mut Node, step: &Step) -> usize {
    match target {
        Node::Catalog(c) => c.delete_step(step),
        Node::Map(m) => match step {
            Step::Key(k) => usize::from(m.shift_remove(k.as_str()).is_some()),
            Step::Index(i) => usize::from(m.shift_remove_index(*i).is_some()),
        },
        Node::List(items) => match step.as_position() {
            Some(pos) if pos < items.len() => {
                items.remove(pos);
                1
            }
            _ => 0,
        },
        Node::Scalar(_) | Node::Ref(_) => 0,
    }
}

/// Insert `values` at `pos` of a catalog (under `key`) or a list.
pub fn insert(
    target: &mut Node,
    pos: usize,
    key: Option<String>,
    values: Vec<Node>,
) -> CatalogResult<()> {
    match target {
        Node::Catalog(c) => c.insert_at(pos, key, values),
        Node::List(items) => {
            let len = items.len();
            if pos > len {
                return Err(CatalogError::OutOfRange { pos, len });
            }
            items.splice(pos..pos, values);
            Ok(())
        }
        other => Err(CatalogError::NotAContainer(other.kind().to_string())),
    }
}

/// Relocate `count` consecutive children starting at `pos1` to `pos2`.
pub fn move_items(target: &mut Node, pos1: usize, pos2: usize, count: usize) -> CatalogResult<()> {
    match target {
        Node::Catalog(c) => c.move_items(pos1, pos2, count),
        Node::List(items) => move_in_vec(items, pos1, pos2, count),
        Node::Map(m) => {
            let mut pairs: Vec<_> = std::mem::take(m).into_iter().collect();
            let result = move_in_vec(&mut pairs, pos1, pos2, count);
            *m = pairs.into_iter().collect();
            result
        }
        other => Err(CatalogError::NotAContainer(other.kind().to_string())),
    }
}

/// `pos2` is interpreted after the moved run has been taken out.
pub(crate) fn move_in_vec<T>(
    items: &mut Vec<T>,
    pos1: usize,
    pos2: usize,
    count: usize,
) -> CatalogResult<()> {
    let len = items.len();
    if pos1.checked_add(count).map_or(true, |end| end > len) {
        return Err(CatalogError::OutOfRange { pos: pos1, len });
    }
    if pos2 > len - count {
        return Err(CatalogError::OutOfRange {
            pos: pos2,
            len: len - count,
        });
    }
    let moved: Vec<T> = items.drain(pos1..pos1 + count).collect();
    items.splice(pos2..pos2, moved);
    Ok(())
}

pub(crate) fn single(values: Vec<Node>, what: &str) -> CatalogResult<Node> {
    let mut iter = values.into_iter();
    match (iter.next(), iter.next()) {
        (Some(v), None) => Ok(v),
        _ => Err(CatalogError::InvalidArgument(format!(
            "{what} takes exactly one value"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

/// Pre-order map.
///
/// `f` is called with each node and its path. If it returns a replacement,
/// the replacement is used as-is and the old node's children are not
/// visited. Otherwise the node's children are transformed and the node is
/// rebuilt with the same container kind.
pub fn transform<F>(node: &Node, f: &mut F) -> Node
where
    F: FnMut(&Node, &[Step]) -> Option<Node>,
{
    transform_at(node, f, &mut Vec::new())
}

fn transform_at<F>(node: &Node, f: &mut F, path: &mut Vec<Step>) -> Node
where
    F: FnMut(&Node, &[Step]) -> Option<Node>,
{
    if let Some(replacement) = f(node, path) {
        return replacement;
    }
    match node {
        Node::Catalog(c) => Node::Catalog(transform_catalog(c, f, path)),
        Node::Map(m) => {
            let mut out = indexmap::IndexMap::with_capacity(m.len());
            for (k, v) in m {
                path.push(Step::Key(k.clone()));
                out.insert(k.clone(), transform_at(v, f, path));
                path.pop();
            }
            Node::Map(out)
        }
        Node::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, v) in items.iter().enumerate() {
                path.push(Step::Index(i));
                out.push(transform_at(v, f, path));
                path.pop();
            }
            Node::List(out)
        }
        leaf => leaf.clone(),
    }
}

pub(crate) fn transform_catalog<F>(catalog: &Catalog, f: &mut F, path: &mut Vec<Step>) -> Catalog
where
    F: FnMut(&Node, &[Step]) -> Option<Node>,
{
    let mut out = Catalog::new();
    for (pos, entry) in catalog.entries().iter().enumerate() {
        path.push(catalog.entry_step(pos));
        let value = transform_at(&entry.value, f, path);
        path.pop();
        out.push(entry.key.clone(), value);
    }
    out
}

/// Pre-order visit. Returning `true` from `f` prunes the node's subtree.
pub fn collect<F>(node: &Node, f: &mut F)
where
    F: FnMut(&Node, &[Step]) -> bool,
{
    collect_at(node, f, &mut Vec::new())
}

fn collect_at<F>(node: &Node, f: &mut F, path: &mut Vec<Step>)
where
    F: FnMut(&Node, &[Step]) -> bool,
{
    if f(node, path) {
        return;
    }
    match node {
        Node::Catalog(c) => collect_catalog(c, f, path),
        Node::Map(m) => {
            for (k, v) in m {
                path.push(Step::Key(k.clone()));
                collect_at(v, f, path);
                path.pop();
            }
        }
        Node::List(items) => {
            for (i, v) in items.iter().enumerate() {
                path.push(Step::Index(i));
                collect_at(v, f, path);
                path.pop();
            }
        }
        Node::Scalar(_) | Node::Ref(_) => {}
    }
}

pub(crate) fn collect_catalog<F>(catalog: &Catalog, f: &mut F, path: &mut Vec<Step>)
where
    F: FnMut(&Node, &[Step]) -> bool,
{
    for (pos, entry) in catalog.entries().iter().enumerate() {
        path.push(catalog.entry_step(pos));
        collect_at(&entry.value, f, path);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Reference;
    use crate::path::parse;
    use indexmap::IndexMap;
    use schemat_types::ItemId;

    fn tree() -> Node {
        let mut map = IndexMap::new();
        map.insert("k".to_string(), Node::from("v"));
        let inner = Catalog::from_entries([
            ("x", Node::from(1i64)),
            ("x", Node::from(2i64)),
            ("ref", Node::from(ItemId::new(7))),
        ]);
        Node::Catalog(Catalog::from_entries([
            ("inner", Node::Catalog(inner.clone())),
            ("inner", Node::Catalog(Catalog::from_entries([("x", 3i64)]))),
            ("map", Node::Map(map)),
            ("list", Node::List(vec![Node::from("a"), Node::from("b")])),
        ]))
    }

    // -----------------------------------------------------------------------
    // get / yield_all
    // -----------------------------------------------------------------------

    #[test]
    fn get_follows_first_branch() {
        let t = tree();
        assert_eq!(get(&t, &parse("inner/x")).and_then(Node::as_i64), Some(1));
        assert_eq!(get(&t, &parse("map/k")).and_then(Node::as_str), Some("v"));
        assert_eq!(get(&t, &parse("list/1")).and_then(Node::as_str), Some("b"));
        assert!(std::ptr::eq(get(&t, &[]).unwrap(), &t));
    }

    #[test]
    fn wrong_kind_step_is_not_found() {
        let t = tree();
        assert!(get(&t, &parse("list/abc")).is_none());
        assert!(get(&t, &parse("map/k/deeper")).is_none());
        assert!(get(&t, &parse("inner/ref/x")).is_none());
    }

    #[test]
    fn yield_all_fans_out_over_repeated_keys() {
        let t = tree();
        let xs: Vec<i64> = yield_all(&t, &parse("inner/x"))
            .into_iter()
            .filter_map(Node::as_i64)
            .collect();
        assert_eq!(xs, vec![1, 2, 3]);
        assert!(yield_all(&t, &parse("nothing/here")).is_empty());
    }

    // -----------------------------------------------------------------------
    // set / delete / insert / move
    // -----------------------------------------------------------------------

    #[test]
    fn set_into_map_and_list() {
        let mut t = tree();
        set(&mut t, &parse("map/k2"), vec![Node::from(5i64)]).unwrap();
        set(&mut t, &parse("list/2"), vec![Node::from("c")]).unwrap();
        assert_eq!(get(&t, &parse("map/k2")).and_then(Node::as_i64), Some(5));
        assert_eq!(get(&t, &parse("list/2")).and_then(Node::as_str), Some("c"));
        let err = set(&mut t, &parse("list/9"), vec![Node::null()]).unwrap_err();
        assert_eq!(err, CatalogError::OutOfRange { pos: 9, len: 3 });
    }

    #[test]
    fn set_rejects_multiple_values_for_map() {
        let mut t = tree();
        let err = set(&mut t, &parse("map/k"), vec![Node::null(), Node::null()]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidArgument(_)));
    }

    #[test]
    fn set_on_scalar_is_not_a_container() {
        let mut t = tree();
        let err = set(&mut t, &parse("map/k/x"), vec![Node::null()]).unwrap_err();
        assert_eq!(err, CatalogError::NotAContainer("scalar".into()));
    }

    #[test]
    fn set_missing_parent_fails() {
        let mut t = tree();
        let err = set(&mut t, &parse("nope/x"), vec![Node::null()]).unwrap_err();
        assert_eq!(err, CatalogError::PathNotFound("nope".into()));
    }

    #[test]
    fn delete_across_kinds() {
        let mut t = tree();
        let inner = get_mut(&mut t, &parse("inner")).unwrap();
        assert_eq!(delete(inner, &Step::from("x")), 2);
        let map = get_mut(&mut t, &parse("map")).unwrap();
        assert_eq!(delete(map, &Step::from("k")), 1);
        assert_eq!(delete(map, &Step::from("k")), 0);
        let list = get_mut(&mut t, &parse("list")).unwrap();
        assert_eq!(delete(list, &Step::Index(0)), 1);
        assert_eq!(get(&t, &parse("list/0")).and_then(Node::as_str), Some("b"));
    }

    #[test]
    fn insert_into_list() {
        let mut list = Node::List(vec![Node::from(1i64), Node::from(3i64)]);
        insert(&mut list, 1, None, vec![Node::from(2i64)]).unwrap();
        assert_eq!(list, Node::List(vec![1i64.into(), 2i64.into(), 3i64.into()]));
        assert!(insert(&mut Node::from(1i64), 0, None, vec![]).is_err());
    }

    #[test]
    fn move_runs_of_items() {
        let mut list = Node::List((0..5i64).map(Node::from).collect());
        move_items(&mut list, 0, 3, 2).unwrap();
        let order: Vec<i64> = list.as_list().unwrap().iter().filter_map(Node::as_i64).collect();
        assert_eq!(order, vec![2, 3, 4, 0, 1]);
    }

    #[test]
    fn move_within_map_preserves_pairs() {
        let mut t = tree();
        let map = get_mut(&mut t, &parse("map")).unwrap();
        set(map, &parse("z"), vec![Node::from(0i64)]).unwrap();
        move_items(map, 1, 0, 1).unwrap();
        let keys: Vec<&str> = map.as_map().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "k"]);
    }

    // -----------------------------------------------------------------------
    // transform / collect / clone
    // -----------------------------------------------------------------------

    #[test]
    fn transform_with_no_substitution_is_identity() {
        let t = tree();
        assert_eq!(transform(&t, &mut |_, _| None), t);
    }

    #[test]
    fn transform_substitutes_without_descending() {
        let t = tree();
        let mut visited_below_inner = false;
        let out = transform(&t, &mut |node, path| {
            if path.len() > 1 && path[0] == Step::Index(0) {
                visited_below_inner = true;
            }
            match node {
                Node::Catalog(c) if c.contains_key("ref") => Some(Node::from("replaced")),
                _ => None,
            }
        });
        assert!(!visited_below_inner);
        assert_eq!(get(&out, &[Step::Index(0)]).and_then(Node::as_str), Some("replaced"));
    }

    #[test]
    fn transform_fixed_point_is_idempotent() {
        let t = tree();
        let mut bump = |node: &Node, _: &[Step]| match node {
            Node::Ref(Reference::Persisted(id)) if id.get() < 100 => {
                Some(Node::from(ItemId::new(id.get() + 100)))
            }
            _ => None,
        };
        let once = transform(&t, &mut bump);
        let twice = transform(&once, &mut bump);
        assert_eq!(once, twice);
    }

    #[test]
    fn collect_visits_pre_order_and_prunes() {
        let t = tree();
        let mut paths = Vec::new();
        collect(&t, &mut |node, path| {
            paths.push(display(path));
            matches!(node, Node::Map(_))
        });
        assert_eq!(paths[0], "");
        assert!(paths.contains(&"#0/x".to_string()) || paths.contains(&"#0/#0".to_string()));
        assert!(paths.contains(&"map".to_string()));
        assert!(!paths.contains(&"map/k".to_string()));
    }

    #[test]
    fn clone_keeps_references_opaque() {
        let t = tree();
        let copy = t.clone();
        assert_eq!(copy, t);
        let r = get(&copy, &parse("inner/ref")).and_then(Node::as_reference);
        assert_eq!(r, Some(Reference::Persisted(ItemId::new(7))));
    }
}
