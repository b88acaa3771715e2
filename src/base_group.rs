//! Base group assignment from (time window, destination cluster) runs.

/// Labels contiguous runs of equal `(window, cluster)` keys.
///
/// Expects keys already sorted by `(window, cluster)`, which makes each
/// pair a single run. Ids are dense and start at 0.
pub fn assign_base_groups(keys: &[(usize, usize)]) -> Vec<usize> {
    let mut groups = Vec::with_capacity(keys.len());
    let mut current = 0;
    for (index, key) in keys.iter().enumerate() {
        if index > 0 && keys[index - 1] != *key {
            current += 1;
        }
        groups.push(current);
    }
    groups
}
