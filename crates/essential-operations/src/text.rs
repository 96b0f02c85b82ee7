use std::collections::HashSet;
use std::hash::Hash;

/// Whether no element occurs twice
pub(crate) fn has_unique_elements<T: Eq + Hash>(items: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(items.len());
    items.iter().all(|item| seen.insert(item))
}
