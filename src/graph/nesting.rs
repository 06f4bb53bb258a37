//! Container nesting depth.
//!
//! Depth is found by walking parent lookups up to the root on every call.
//! Containers are shallow, so nothing is cached.

use std::collections::HashSet;

use crate::domain::model::Step;

pub const DEFAULT_MAX_NESTING_DEPTH: usize = 3;

/// Id of the container that lists `step_id` directly.
pub fn parent_id<'a>(step_id: &str, steps: &'a [Step]) -> Option<&'a str> {
    steps
        .iter()
        .find(|s| {
            s.child_ids()
                .is_some_and(|children| children.iter().any(|c| c == step_id))
        })
        .map(|s| s.id.as_str())
}

/// Number of containers enclosing `step_id`; 0 at root level.
///
/// Returns `None` when the parent chain loops.
pub fn container_depth(step_id: &str, steps: &[Step]) -> Option<usize> {
    let mut depth = 0;
    let mut current = step_id;
    while let Some(parent) = parent_id(current, steps) {
        depth += 1;
        if depth > steps.len() {
            return None;
        }
        current = parent;
    }
    Some(depth)
}

/// Container levels in the subtree rooted at `step_id`, counting itself.
/// A non-container is 0, a container with no nested containers is 1.
pub fn subtree_height(step_id: &str, steps: &[Step]) -> usize {
    let mut seen = HashSet::new();
    height(step_id, steps, &mut seen)
}

fn height<'a>(step_id: &'a str, steps: &'a [Step], seen: &mut HashSet<&'a str>) -> usize {
    if !seen.insert(step_id) {
        return 0;
    }
    let Some(children) = steps
        .iter()
        .find(|s| s.id == step_id)
        .and_then(|s| s.child_ids())
    else {
        return 0;
    };
    1 + children
        .iter()
        .map(|c| height(c, steps, seen))
        .max()
        .unwrap_or(0)
}

/// Whether creating a container inside `container_id` (`None` for root)
/// would put it at or beyond `max_depth`.
pub fn would_exceed_limit(container_id: Option<&str>, steps: &[Step], max_depth: usize) -> bool {
    placement_exceeds_limit(container_id, 1, steps, max_depth)
}

/// Like [`would_exceed_limit`] for a whole subtree of `height` container levels.
pub fn placement_exceeds_limit(
    container_id: Option<&str>,
    height: usize,
    steps: &[Step],
    max_depth: usize,
) -> bool {
    if height == 0 {
        return false;
    }
    let top_depth = match container_id {
        None => 0,
        Some(id) => match container_depth(id, steps) {
            Some(depth) => depth + 1,
            None => return true,
        },
    };
    top_depth + height - 1 >= max_depth
}

/// Whether `step_id` is `container_id` or nested anywhere beneath it.
pub fn is_within(step_id: &str, container_id: &str, steps: &[Step]) -> bool {
    let mut current = step_id;
    for _ in 0..=steps.len() {
        if current == container_id {
            return true;
        }
        match parent_id(current, steps) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{HttpMethod, RequestStep};

    fn nested() -> Vec<Step> {
        vec![
            Step::group("g0", vec!["g1".into()]),
            Step::group("g1", vec!["g2".into()]),
            Step::group("g2", vec!["leaf".into()]),
            Step::request("leaf", RequestStep::new("api", HttpMethod::Get, "/")),
        ]
    }

    #[test]
    fn test_container_depth() {
        let steps = nested();
        assert_eq!(container_depth("g0", &steps), Some(0));
        assert_eq!(container_depth("g2", &steps), Some(2));
        assert_eq!(container_depth("leaf", &steps), Some(3));
    }

    #[test]
    fn test_would_exceed_limit_default_three() {
        let steps = nested();
        assert!(!would_exceed_limit(None, &steps, DEFAULT_MAX_NESTING_DEPTH));
        assert!(!would_exceed_limit(Some("g0"), &steps, DEFAULT_MAX_NESTING_DEPTH));
        assert!(!would_exceed_limit(Some("g1"), &steps, DEFAULT_MAX_NESTING_DEPTH));
        assert!(would_exceed_limit(Some("g2"), &steps, DEFAULT_MAX_NESTING_DEPTH));
    }

    #[test]
    fn test_subtree_height_and_placement() {
        let steps = nested();
        assert_eq!(subtree_height("leaf", &steps), 0);
        assert_eq!(subtree_height("g2", &steps), 1);
        assert_eq!(subtree_height("g0", &steps), 3);
        assert!(!placement_exceeds_limit(None, 3, &steps, 3));
        assert!(placement_exceeds_limit(Some("g2"), 1, &steps, 3));
        assert!(!placement_exceeds_limit(Some("g2"), 0, &steps, 3));
    }

    #[test]
    fn test_cycle_counts_as_exceeding() {
        let steps = vec![
            Step::group("a", vec!["b".into()]),
            Step::group("b", vec!["a".into()]),
        ];
        assert_eq!(container_depth("a", &steps), None);
        assert!(would_exceed_limit(Some("a"), &steps, 10));
    }

    #[test]
    fn test_is_within() {
        let steps = nested();
        assert!(is_within("leaf", "g0", &steps));
        assert!(is_within("g1", "g1", &steps));
        assert!(!is_within("g0", "g2", &steps));
    }
}
