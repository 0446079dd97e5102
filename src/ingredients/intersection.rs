use std::collections::HashSet;

/// Ingredients shared by every group.
///
/// - no groups: empty
/// - one group: that group unchanged (order and duplicates kept)
/// - several groups: set intersection, de-duplicated
///
/// For several groups the result order is unspecified. It currently follows
/// the first group, but callers must treat it as a set.
pub fn reduce_common<S: AsRef<str>>(groups: &[Vec<S>]) -> Vec<String> {
    match groups {
        [] => Vec::new(),
        [only] => only.iter().map(|s| s.as_ref().to_string()).collect(),
        [first, rest @ ..] => {
            let others: Vec<HashSet<&str>> = rest
                .iter()
                .map(|g| g.iter().map(AsRef::<str>::as_ref).collect())
                .collect();

            let mut seen = HashSet::new();
            first
                .iter()
                .map(AsRef::<str>::as_ref)
                .filter(|item| others.iter().all(|set| set.contains(item)))
                .filter(|item| seen.insert(*item))
                .map(str::to_string)
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_set(items: &[String]) -> HashSet<&str> {
        items.iter().map(String::as_str).collect()
    }

    #[test]
    fn no_groups_is_empty() {
        let groups: Vec<Vec<String>> = Vec::new();
        assert!(reduce_common(&groups).is_empty());
    }

    #[test]
    fn single_group_is_unchanged() {
        let groups = vec![vec!["B", "A", "B", "C"]];
        assert_eq!(reduce_common(&groups), vec!["B", "A", "B", "C"]);
    }

    #[test]
    fn two_groups_intersect() {
        let groups = vec![vec!["A", "B", "C"], vec!["C", "B", "X"]];
        assert_eq!(as_set(&reduce_common(&groups)), HashSet::from(["B", "C"]));
    }

    #[test]
    fn three_groups_intersect() {
        let groups = vec![vec!["A", "B", "C"], vec!["B", "C", "D"], vec!["C", "D", "E"]];
        assert_eq!(as_set(&reduce_common(&groups)), HashSet::from(["C"]));
    }

    #[test]
    fn duplicates_collapse_when_intersecting() {
        let groups = vec![vec!["A", "A", "B"], vec!["A", "B", "B"]];
        let common = reduce_common(&groups);
        assert_eq!(common.len(), 2);
        assert_eq!(as_set(&common), HashSet::from(["A", "B"]));
    }

    #[test]
    fn disjoint_groups_share_nothing() {
        let groups = vec![vec!["A"], vec!["B"], vec![]];
        assert!(reduce_common(&groups).is_empty());
    }

    #[test]
    fn intersection_is_case_sensitive() {
        let groups = vec![vec!["Starch"], vec!["starch"]];
        assert!(reduce_common(&groups).is_empty());
    }
}
