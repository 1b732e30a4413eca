//! weave-router: Zero-dependency radix trie path matcher
//!
//! The path-matching engine underneath the weave route table. Routes are
//! identified by a numeric id that doubles as their registration rank: when
//! several patterns match the same path, the lowest id wins. That gives the
//! "first registered route wins" semantics a URL mapper needs while keeping
//! O(k) segment lookup.
//!
//! ## Path Syntax
//! - `{name}` or `:name` - Named placeholder (captures one segment)
//! - `{*name}`, `*name` or `*` - Wildcard (captures the remaining path)
//!
//! Placeholder names are stored per route, so two routes may use different
//! names for the same position (`/items/{id}` and `/items/{slug}/tags`).
//!
//! ## Example
//! ```
//! use weave_router::Router;
//!
//! let mut router = Router::new();
//! router.insert("GET", "/items/{id}", 0);
//! router.insert("GET", "/items/latest", 1);
//!
//! // Registration order decides, not specificity.
//! let m = router.find("GET", "/items/latest").unwrap();
//! assert_eq!(m.route_id, 0);
//! assert_eq!(m.params, vec![("id".to_string(), "latest".to_string())]);
//! ```

use std::collections::HashMap;

/// Route match result
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Id of the matched route
    pub route_id: u32,
    /// Captured path parameters as (name, value) pairs
    pub params: Vec<(String, String)>,
}

impl Match {
    /// Get params as HashMap for convenient access
    pub fn params_map(&self) -> HashMap<String, String> {
        self.params.iter().cloned().collect()
    }
}

/// A route terminating at a node, with the placeholder names it binds.
#[derive(Debug, Clone)]
struct Endpoint {
    route_id: u32,
    names: Vec<String>,
}

#[derive(Debug, Default)]
struct Node {
    /// Static children (key = path segment)
    children: HashMap<String, Node>,
    /// Placeholder child, shared by every route using a placeholder here
    param_child: Option<Box<Node>>,
    /// Routes ending with a wildcard at this depth
    wildcards: Vec<Endpoint>,
    /// Routes terminating exactly at this node
    endpoints: Vec<Endpoint>,
}

/// One parsed pattern segment.
#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
    Wildcard(&'a str),
}

fn parse_segment(segment: &str) -> Segment<'_> {
    if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        match inner.strip_prefix('*') {
            Some(name) => Segment::Wildcard(if name.is_empty() { "*" } else { name }),
            None => Segment::Param(inner),
        }
    } else if let Some(name) = segment.strip_prefix(':') {
        Segment::Param(name)
    } else if let Some(name) = segment.strip_prefix('*') {
        Segment::Wildcard(if name.is_empty() { "*" } else { name })
    } else {
        Segment::Static(segment)
    }
}

/// Split on `/`, dropping only the leading slash. Empty inner segments are
/// kept, so `/items//42` has three segments and `/items/` has two.
fn split(path: &str) -> Vec<&str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    if path.is_empty() {
        return Vec::new();
    }
    path.split('/').collect()
}

/// Per-method radix trie router
#[derive(Debug, Default)]
pub struct Router {
    /// Method -> Trie root
    trees: HashMap<String, Node>,
}

impl Router {
    /// Create a new router
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route under one method.
    ///
    /// The same `route_id` may be inserted under several methods. Segments
    /// after a wildcard are ignored.
    ///
    /// # Example
    /// ```
    /// use weave_router::Router;
    ///
    /// let mut router = Router::new();
    /// router.insert("GET", "/users/{id}", 0);
    /// router.insert("POST", "/users", 1);
    /// ```
    pub fn insert(&mut self, method: &str, path: &str, route_id: u32) {
        let mut node = self.trees.entry(method.to_uppercase()).or_default();
        let mut names = Vec::new();

        for segment in split(path) {
            match parse_segment(segment) {
                Segment::Static(s) => {
                    node = node.children.entry(s.to_string()).or_default();
                }
                Segment::Param(name) => {
                    names.push(name.to_string());
                    node = &mut **node.param_child.get_or_insert_with(Box::default);
                }
                Segment::Wildcard(name) => {
                    names.push(name.to_string());
                    node.wildcards.push(Endpoint { route_id, names });
                    return;
                }
            }
        }

        node.endpoints.push(Endpoint { route_id, names });
    }

    /// Find the matching route with the lowest id
    ///
    /// # Example
    /// ```
    /// use weave_router::Router;
    ///
    /// let mut router = Router::new();
    /// router.insert("GET", "/users/:id", 0);
    ///
    /// let m = router.find("GET", "/users/42").unwrap();
    /// assert_eq!(m.route_id, 0);
    /// assert_eq!(m.params[0], ("id".to_string(), "42".to_string()));
    /// ```
    pub fn find(&self, method: &str, path: &str) -> Option<Match> {
        self.find_all(method, path).into_iter().next()
    }

    /// Find every matching route, ordered by route id
    pub fn find_all(&self, method: &str, path: &str) -> Vec<Match> {
        let mut matches = Vec::new();
        if let Some(tree) = self.trees.get(&method.to_uppercase()) {
            let segments = split(path);
            let mut values = Vec::new();
            Self::collect(tree, &segments, &mut values, &mut matches);
        }
        matches.sort_by_key(|m| m.route_id);
        matches
    }

    fn collect(node: &Node, segments: &[&str], values: &mut Vec<String>, out: &mut Vec<Match>) {
        if segments.is_empty() {
            out.extend(node.endpoints.iter().map(|e| Self::bind(e, values.as_slice())));
            return;
        }

        let segment = segments[0];
        let rest = &segments[1..];

        if let Some(child) = node.children.get(segment) {
            Self::collect(child, rest, values, out);
        }

        // A placeholder never binds an empty segment
        if let (Some(param), false) = (&node.param_child, segment.is_empty()) {
            values.push(segment.to_string());
            Self::collect(param, rest, values, out);
            values.pop();
        }

        if !node.wildcards.is_empty() {
            values.push(segments.join("/"));
            out.extend(node.wildcards.iter().map(|e| Self::bind(e, values.as_slice())));
            values.pop();
        }
    }

    fn bind(endpoint: &Endpoint, values: &[String]) -> Match {
        Match {
            route_id: endpoint.route_id,
            params: endpoint
                .names
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect(),
        }
    }

    /// Check if a method has any routes registered
    pub fn has_method(&self, method: &str) -> bool {
        self.trees.contains_key(&method.to_uppercase())
    }

    /// Get all registered methods
    pub fn methods(&self) -> Vec<String> {
        self.trees.keys().cloned().collect()
    }
}
