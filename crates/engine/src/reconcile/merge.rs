use std::collections::HashSet;
use threatfeed_core::Reconcilable;

/// Union of live and snapshot items: deduplicated by id with the first
/// (live) occurrence kept, then sorted newest first.
///
/// Pure; recomputed from scratch on every change to either input.
pub fn merged_view<T: Reconcilable>(live: &[T], snapshot: &[T]) -> Vec<T> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(live.len() + snapshot.len());
    let mut merged = Vec::with_capacity(live.len() + snapshot.len());

    for item in live.iter().chain(snapshot) {
        if seen.insert(item.id()) {
            merged.push(item.clone());
        }
    }

    // stable: equal timestamps keep live-before-snapshot order
    merged.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    merged
}
