//! Prefix trie node.
//!
//! Each node represents one path segment. Children are split by kind so a
//! lookup can try literal branches first, then parameters, then wildcards.
//! Routes are referenced by [`RouteId`]; the table owns the route data.

use crate::params::{ParamKey, ParamStore};
use crate::pattern::Segment;
use crate::table::RouteId;

/// A node in the route trie.
#[derive(Debug, Default)]
pub(crate) struct Node {
    /// Route ending exactly at this node.
    route: Option<RouteId>,

    /// Route ending at this node with an end anchor (trailing slash).
    anchored: Option<RouteId>,

    /// Literal children, sorted by segment for binary search.
    statics: Vec<(Box<str>, Node)>,

    /// Parameter children in registration order.
    params: Vec<(ParamKey, Node)>,

    /// Wildcard routes in registration order.
    wildcards: Vec<(ParamKey, RouteId)>,
}

impl Node {
    /// Inserts a route below this node.
    ///
    /// Returns false if an earlier route already occupies the same slot; the
    /// earlier route keeps it.
    pub(crate) fn insert(&mut self, segments: &[Segment], id: RouteId) -> bool {
        let Some((first, rest)) = segments.split_first() else {
            return claim(&mut self.route, id);
        };

        match first {
            Segment::Literal(text) => {
                let idx = match self
                    .statics
                    .binary_search_by(|(segment, _)| segment.as_ref().cmp(text))
                {
                    Ok(idx) => idx,
                    Err(idx) => {
                        self.statics.insert(idx, (text.clone(), Node::default()));
                        idx
                    }
                };
                self.statics[idx].1.insert(rest, id)
            }
            Segment::Param(key) => {
                let idx = match self.params.iter().position(|(k, _)| k.name() == key.name()) {
                    Some(idx) => idx,
                    None => {
                        self.params.push((key.clone(), Node::default()));
                        self.params.len() - 1
                    }
                };
                self.params[idx].1.insert(rest, id)
            }
            // Wildcards and anchors are always last; the pattern compiler enforces it.
            Segment::Wildcard(key) => {
                if self.wildcards.iter().any(|(k, _)| k.name() == key.name()) {
                    return false;
                }
                self.wildcards.push((key.clone(), id));
                true
            }
            Segment::EndAnchor => claim(&mut self.anchored, id),
        }
    }

    /// Finds the route matching `path`, capturing into `params`.
    ///
    /// `path` is the unmatched remainder and may start with slashes. On
    /// failure `params` is left as it was on entry.
    pub(crate) fn find(
        &self,
        path: &str,
        trailing_slash: bool,
        params: &mut ParamStore,
        decode: bool,
    ) -> Option<RouteId> {
        let rest = path.trim_start_matches('/');
        if rest.is_empty() {
            if trailing_slash && self.anchored.is_some() {
                return self.anchored;
            }
            return self.route;
        }

        let (segment, tail) = rest.split_at(rest.find('/').unwrap_or(rest.len()));

        // Literal match first (highest priority)
        if let Some(child) = self.find_static_child(segment) {
            if let Some(id) = child.find(tail, trailing_slash, params, decode) {
                return Some(id);
            }
        }

        // Then parameters, backtracking on failure
        for (key, child) in &self.params {
            let checkpoint = params.checkpoint();
            params.capture(key, segment, decode);
            if let Some(id) = child.find(tail, trailing_slash, params, decode) {
                return Some(id);
            }
            params.rollback(checkpoint);
        }

        // Wildcard last, takes everything that is left
        if let Some((key, id)) = self.wildcards.first() {
            params.capture(key, rest, decode);
            return Some(*id);
        }

        None
    }

    fn find_static_child(&self, segment: &str) -> Option<&Node> {
        self.statics
            .binary_search_by(|(s, _)| s.as_ref().cmp(segment))
            .ok()
            .map(|idx| &self.statics[idx].1)
    }
}

fn claim(slot: &mut Option<RouteId>, id: RouteId) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(id);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;

    fn insert(root: &mut Node, template: &str, id: usize) -> bool {
        let pattern = Pattern::compile(template, None).unwrap();
        root.insert(pattern.segments(), RouteId::new(id))
    }

    fn find(root: &Node, path: &str) -> (Option<usize>, Vec<(String, String)>) {
        let mut params = ParamStore::new();
        let id = root.find(path, path.ends_with('/'), &mut params, true);
        (id.map(RouteId::index), params.to_owned_pairs())
    }

    #[test]
    fn test_insert_and_find_static() {
        let mut root = Node::default();
        insert(&mut root, "/users", 0);

        assert_eq!(find(&root, "/users").0, Some(0));
        assert_eq!(find(&root, "/posts").0, None);
    }

    #[test]
    fn test_insert_and_find_param() {
        let mut root = Node::default();
        insert(&mut root, "/users/:id", 0);

        let (id, params) = find(&root, "/users/123");
        assert_eq!(id, Some(0));
        assert_eq!(params, vec![("id".to_string(), "123".to_string())]);
    }

    #[test]
    fn test_insert_and_find_wildcard() {
        let mut root = Node::default();
        insert(&mut root, "/files/*path", 0);

        let (id, params) = find(&root, "/files/images/logo.png");
        assert_eq!(id, Some(0));
        assert_eq!(params, vec![("path".to_string(), "images/logo.png".to_string())]);
        assert_eq!(find(&root, "/files").0, None);
        assert_eq!(find(&root, "/files/").0, None);
    }

    #[test]
    fn test_static_priority_over_param() {
        let mut root = Node::default();
        insert(&mut root, "/users/:id", 0);
        insert(&mut root, "/users/me", 1);

        assert_eq!(find(&root, "/users/me").0, Some(1));
        assert_eq!(find(&root, "/users/123").0, Some(0));
    }

    #[test]
    fn test_param_priority_over_wildcard() {
        let mut root = Node::default();
        insert(&mut root, "/files/*", 0);
        insert(&mut root, "/files/:name", 1);

        assert_eq!(find(&root, "/files/a").0, Some(1));
        assert_eq!(find(&root, "/files/a/b").0, Some(0));
    }

    #[test]
    fn test_backtracking_discards_params() {
        let mut root = Node::default();
        insert(&mut root, "/a/:x/c", 0);
        insert(&mut root, "/a/*rest", 1);

        let (id, params) = find(&root, "/a/b/d");
        assert_eq!(id, Some(1));
        assert_eq!(params, vec![("rest".to_string(), "b/d".to_string())]);
    }

    #[test]
    fn test_literal_dead_end_falls_back_to_param() {
        let mut root = Node::default();
        insert(&mut root, "/users/settings/advanced", 0);
        insert(&mut root, "/users/:id", 1);

        let (id, params) = find(&root, "/users/settings");
        assert_eq!(id, Some(1));
        assert_eq!(params, vec![("id".to_string(), "settings".to_string())]);
    }

    #[test]
    fn test_first_registered_param_wins() {
        let mut root = Node::default();
        insert(&mut root, "/users/:id", 0);
        insert(&mut root, "/users/:name", 1);

        let (id, params) = find(&root, "/users/7");
        assert_eq!(id, Some(0));
        assert_eq!(params, vec![("id".to_string(), "7".to_string())]);
    }

    #[test]
    fn test_duplicate_slot_keeps_first() {
        let mut root = Node::default();
        assert!(insert(&mut root, "/users", 0));
        assert!(!insert(&mut root, "/users/", 1));
        assert!(insert(&mut root, "/files/*", 2));
        assert!(!insert(&mut root, "/files/*", 3));
        assert_eq!(find(&root, "/users").0, Some(0));
    }

    #[test]
    fn test_end_anchor_and_trailing_slash() {
        let mut root = Node::default();
        insert(&mut root, "/users", 0);
        insert(&mut root, "/users/{$}", 1);
        insert(&mut root, "/posts", 2);

        assert_eq!(find(&root, "/users").0, Some(0));
        assert_eq!(find(&root, "/users/").0, Some(1));
        // Without an anchored route the trailing slash is ignored
        assert_eq!(find(&root, "/posts/").0, Some(2));
    }

    #[test]
    fn test_root_paths() {
        let mut root = Node::default();
        insert(&mut root, "/", 0);
        assert_eq!(find(&root, "/").0, Some(0));

        insert(&mut root, "/{$}", 1);
        assert_eq!(find(&root, "/").0, Some(1));
    }

    #[test]
    fn test_repeated_slashes_ignored() {
        let mut root = Node::default();
        insert(&mut root, "/api/v1/users", 0);
        assert_eq!(find(&root, "//api///v1/users").0, Some(0));
    }

    #[test]
    fn test_percent_decoding() {
        let mut root = Node::default();
        insert(&mut root, "/users/:name", 0);

        let (_, params) = find(&root, "/users/john%20doe");
        assert_eq!(params, vec![("name".to_string(), "john doe".to_string())]);
    }
}
