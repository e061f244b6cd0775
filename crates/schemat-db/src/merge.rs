use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// K-way merge of streams that are each sorted by `key`.
///
/// Equal keys are emitted in stream order, so callers control which copy
/// of a duplicated id comes first. Nothing is deduplicated.
pub(crate) fn merge_sorted<T, K, F>(streams: Vec<Vec<T>>, key: F) -> Vec<T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let total = streams.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = streams.into_iter().map(Vec::into_iter).collect();
    let mut heap = BinaryHeap::with_capacity(iters.len());
    for (stream, iter) in iters.iter_mut().enumerate() {
        if let Some(item) = iter.next() {
            heap.push(HeapEntry {
                key: key(&item),
                stream,
                item,
            });
        }
    }

    let mut out = Vec::with_capacity(total);
    while let Some(HeapEntry { stream, item, .. }) = heap.pop() {
        out.push(item);
        if let Some(next) = iters[stream].next() {
            heap.push(HeapEntry {
                key: key(&next),
                stream,
                item: next,
            });
        }
    }
    out
}

struct HeapEntry<K, T> {
    key: K,
    stream: usize,
    item: T,
}

impl<K: Ord, T> PartialEq for HeapEntry<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord, T> Eq for HeapEntry<K, T> {}

impl<K: Ord, T> PartialOrd for HeapEntry<K, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, T> Ord for HeapEntry<K, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for smallest-first.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.stream.cmp(&self.stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn merges_in_order() {
        let out = merge_sorted(vec![vec![1, 4, 9], vec![2, 3], vec![], vec![5]], |x| *x);
        assert_eq!(out, vec![1, 2, 3, 4, 5, 9]);
    }

    #[test]
    fn ties_follow_stream_order() {
        let out = merge_sorted(vec![vec![(1, 'a'), (2, 'a')], vec![(1, 'b')]], |x| x.0);
        assert_eq!(out, vec![(1, 'a'), (1, 'b'), (2, 'a')]);
    }

    proptest! {
        #[test]
        fn output_is_sorted_permutation(mut streams in prop::collection::vec(prop::collection::vec(0u32..100, 0..20), 0..6)) {
            for s in &mut streams {
                s.sort_unstable();
            }
            let mut expected: Vec<u32> = streams.iter().flatten().copied().collect();
            expected.sort_unstable();
            prop_assert_eq!(merge_sorted(streams, |x| *x), expected);
        }
    }
}
