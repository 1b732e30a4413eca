//! Route table
//!
//! Maps a verb set and a path pattern to a controller action. Routes are
//! matched in registration order; the first route whose pattern, verbs and
//! requirements all fit wins.
//!
//! Patterns use `{name}` placeholders (one segment), `{name:regex}` for an
//! inline requirement, and `{*name}` for a trailing wildcard. A route can be
//! written in code:
//!
//! ```
//! use weave_core::routes::{Route, RouteTable};
//! use weave_core::Method;
//!
//! let table = RouteTable::new(vec![
//!     Route::new("GET", "/items/{id:\\d+}", "items", "show").unwrap(),
//! ]);
//! let m = table.match_route(Method::Get, "/items/42").unwrap();
//! assert_eq!(m.action(), "show");
//! assert_eq!(m.get("id"), Some("42"));
//! ```
//!
//! or as a 4- or 5-element TOML descriptor:
//!
//! ```toml
//! routes = [
//!     ["GET", "/items/{id}", "items", "show"],
//!     [["PUT", "POST"], "/{user}/items/{id}", "items", "save", { auth = "True" }],
//! ]
//! ```

use crate::request::Method;
use crate::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use weave_router::Router;

/// Verb set given to a route: a single verb or a list
#[derive(Debug, Clone)]
pub struct Verbs(Vec<String>);

impl From<&str> for Verbs {
    fn from(verb: &str) -> Self {
        Verbs(vec![verb.to_string()])
    }
}

impl From<Method> for Verbs {
    fn from(method: Method) -> Self {
        Verbs(vec![method.to_string()])
    }
}

impl From<Vec<&str>> for Verbs {
    fn from(verbs: Vec<&str>) -> Self {
        Verbs(verbs.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for Verbs {
    fn from(verbs: &[&str]) -> Self {
        Verbs(verbs.iter().map(|v| v.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Verbs {
    fn from(verbs: [&str; N]) -> Self {
        Verbs(verbs.iter().map(|v| v.to_string()).collect())
    }
}

/// Extra match conditions: default values and placeholder requirements
#[derive(Debug, Clone, Default)]
pub struct RouteExtras {
    defaults: BTreeMap<String, String>,
    requirements: Vec<(String, Regex)>,
}

impl RouteExtras {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value added to the match result unless a placeholder provides it
    pub fn default_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Placeholder `name` must fully match `pattern`
    pub fn requirement(mut self, name: impl Into<String>, pattern: &str) -> Result<Self> {
        let name = name.into();
        let regex = compile_requirement(&name, pattern)?;
        self.requirements.push((name, regex));
        Ok(self)
    }

    /// Parse the fifth element of a route descriptor.
    ///
    /// `requirements` and `defaults` are sub-tables; any other key is a
    /// default value.
    pub fn from_toml(value: &toml::Value) -> Result<Self> {
        let table = value
            .as_table()
            .ok_or_else(|| Error::Config(format!("Route extras must be a table. Got {}", value)))?;

        let mut extras = RouteExtras::new();
        for (key, value) in table {
            match (key.as_str(), value) {
                ("requirements", toml::Value::Table(reqs)) => {
                    for (name, pattern) in reqs {
                        let pattern = pattern.as_str().ok_or_else(|| {
                            Error::Config(format!("Requirement for {} must be a string", name))
                        })?;
                        extras = extras.requirement(name.clone(), pattern)?;
                    }
                }
                ("defaults", toml::Value::Table(defaults)) => {
                    for (name, value) in defaults {
                        extras = extras.default_value(name.clone(), scalar_to_string(value)?);
                    }
                }
                (_, value) => {
                    extras = extras.default_value(key.clone(), scalar_to_string(value)?);
                }
            }
        }
        Ok(extras)
    }

    fn satisfied_by(&self, params: &[(String, String)]) -> bool {
        self.requirements.iter().all(|(name, regex)| {
            params
                .iter()
                .find(|(k, _)| k == name)
                .map_or(true, |(_, v)| regex.is_match(v))
        })
    }
}

fn compile_requirement(name: &str, pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| Error::InvalidPath(format!("requirement for {{{}}}: {}", name, e)))
}

fn scalar_to_string(value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(if *b { "True" } else { "False" }.to_string()),
        other => Err(Error::Config(format!("Route default must be a scalar. Got {}", other))),
    }
}

/// A single routing rule
#[derive(Debug, Clone)]
pub struct Route {
    verbs: Vec<Method>,
    pattern: String,
    controller: String,
    action: String,
    extras: RouteExtras,
}

impl Route {
    /// Create a route. Inline `{name:regex}` requirements are extracted from
    /// the pattern.
    pub fn new(
        verbs: impl Into<Verbs>,
        pattern: &str,
        controller: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<Self> {
        let Verbs(names) = verbs.into();
        if names.is_empty() {
            return Err(Error::Config(format!("Route {} has no verbs", pattern)));
        }
        let verbs = names
            .iter()
            .map(|v| v.parse::<Method>().map_err(|_| Error::Config(format!("Unknown verb {:?}", v))))
            .collect::<Result<Vec<_>>>()?;

        if !pattern.starts_with('/') {
            return Err(Error::InvalidPath(format!("pattern must start with '/': {}", pattern)));
        }

        let mut extras = RouteExtras::new();
        let mut segments = Vec::new();
        for segment in pattern.split('/') {
            let inline = segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .and_then(|s| s.split_once(':'));
            match inline {
                Some((name, requirement)) => {
                    extras = extras.requirement(name, requirement)?;
                    segments.push(format!("{{{}}}", name));
                }
                None => segments.push(segment.to_string()),
            }
        }

        Ok(Self {
            verbs,
            pattern: segments.join("/"),
            controller: controller.into(),
            action: action.into(),
            extras,
        })
    }

    /// Merge extra conditions into the route
    pub fn with_extras(mut self, extras: RouteExtras) -> Self {
        self.extras.defaults.extend(extras.defaults);
        self.extras.requirements.extend(extras.requirements);
        self
    }

    /// Parse a 4- or 5-element descriptor
    /// `(verbs, pattern, controller, action[, extras])`.
    pub fn from_descriptor(descriptor: &toml::Value) -> Result<Self> {
        let arity_error =
            || Error::Config(format!("Each URL description needs 4 or 5 elements. Got {}", descriptor));

        let parts = descriptor.as_array().ok_or_else(arity_error)?;
        if parts.len() != 4 && parts.len() != 5 {
            return Err(arity_error());
        }

        let verbs: Vec<&str> = match &parts[0] {
            toml::Value::String(verb) => vec![verb.as_str()],
            toml::Value::Array(verbs) => verbs
                .iter()
                .map(|v| {
                    v.as_str()
                        .ok_or_else(|| Error::Config(format!("Verb must be a string. Got {}", v)))
                })
                .collect::<Result<_>>()?,
            other => return Err(Error::Config(format!("Invalid verbs {}", other))),
        };

        let text = |idx: usize, what: &str| {
            parts[idx]
                .as_str()
                .ok_or_else(|| Error::Config(format!("Route {} must be a string. Got {}", what, parts[idx])))
        };

        let route = Route::new(verbs, text(1, "pattern")?, text(2, "controller")?, text(3, "action")?)?;
        match parts.get(4) {
            Some(extras) => Ok(route.with_extras(RouteExtras::from_toml(extras)?)),
            None => Ok(route),
        }
    }

    pub fn verbs(&self) -> &[Method] {
        &self.verbs
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

/// Result of a successful match
///
/// Holds `controller` and `action`, the route defaults and the placeholder
/// values, placeholders taking precedence.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    route_index: usize,
    values: BTreeMap<String, String>,
    path_params: Vec<(String, String)>,
}

impl MatchResult {
    pub fn controller(&self) -> &str {
        self.get("controller").unwrap_or_default()
    }

    pub fn action(&self) -> &str {
        self.get("action").unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Add a value, e.g. the user id resolved by the auth gate
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Values captured from the path
    pub fn path_params(&self) -> &[(String, String)] {
        &self.path_params
    }

    /// Position of the matched route in the table
    pub fn route_index(&self) -> usize {
        self.route_index
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Compiled, ordered route table
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    router: Router,
}

impl RouteTable {
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut table = Self::default();
        for route in routes {
            table.push(route);
        }
        table
    }

    /// Compile a list of TOML descriptors
    pub fn from_descriptors(descriptors: &[toml::Value]) -> Result<Self> {
        let routes = descriptors
            .iter()
            .map(Route::from_descriptor)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(routes))
    }

    /// Register a route after the existing ones
    pub fn push(&mut self, route: Route) {
        let id = self.routes.len() as u32;
        for verb in &route.verbs {
            self.router.insert(verb.as_str(), &route.pattern, id);
        }
        self.routes.push(route);
    }

    /// First route, in registration order, matching method and path
    pub fn match_route(&self, method: Method, path: &str) -> Option<MatchResult> {
        self.router
            .find_all(method.as_str(), path)
            .into_iter()
            .find_map(|m| {
                let index = m.route_id as usize;
                let route = self.routes.get(index)?;
                if !route.extras.satisfied_by(&m.params) {
                    return None;
                }

                let mut values = BTreeMap::new();
                values.insert("controller".to_string(), route.controller.clone());
                values.insert("action".to_string(), route.action.clone());
                values.extend(route.extras.defaults.clone());
                values.extend(m.params.iter().cloned());

                Some(MatchResult {
                    route_index: index,
                    values,
                    path_params: m.params,
                })
            })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Deserialize)]
struct RouteFile {
    #[serde(default)]
    routes: Vec<toml::Value>,
}

/// Parse the `routes` array of a TOML document
pub fn load_routes(source: &str) -> Result<Vec<Route>> {
    let file: RouteFile = toml::from_str(source)?;
    file.routes.iter().map(Route::from_descriptor).collect()
}

/// Load the `routes` array of a TOML file
pub fn load_routes_file(path: impl AsRef<Path>) -> Result<Vec<Route>> {
    let source = std::fs::read_to_string(path.as_ref())?;
    load_routes(&source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn descriptor(source: &str) -> toml::Value {
        let doc: toml::Table = format!("d = {}", source).parse().unwrap();
        doc["d"].clone()
    }

    #[test]
    fn test_match_extracts_placeholders() {
        let table = RouteTable::new(vec![Route::new(["GET"], "/items/{id}", "items", "show").unwrap()]);

        let m = table.match_route(Method::Get, "/items/42").unwrap();
        assert_eq!(m.controller(), "items");
        assert_eq!(m.action(), "show");
        assert_eq!(m.get("id"), Some("42"));
        assert_eq!(m.path_params(), &[("id".to_string(), "42".to_string())]);
    }

    #[test]
    fn test_verb_must_be_in_set() {
        let table = RouteTable::new(vec![
            Route::new(vec!["PUT", "POST"], "/items/{id}", "items", "save").unwrap(),
        ]);

        assert!(table.match_route(Method::Put, "/items/1").is_some());
        assert!(table.match_route(Method::Post, "/items/1").is_some());
        assert!(table.match_route(Method::Get, "/items/1").is_none());
    }

    #[test]
    fn test_first_registered_wins() {
        let table = RouteTable::new(vec![
            Route::new("GET", "/items/{id}", "items", "show").unwrap(),
            Route::new("GET", "/items/latest", "items", "latest").unwrap(),
        ]);

        let m = table.match_route(Method::Get, "/items/latest").unwrap();
        assert_eq!(m.action(), "show");
        assert_eq!(m.route_index(), 0);
    }

    #[test]
    fn test_requirement_falls_through_to_next_route() {
        let table = RouteTable::new(vec![
            Route::new("GET", "/items/{id:\\d+}", "items", "show").unwrap(),
            Route::new("GET", "/items/{name}", "items", "by_name").unwrap(),
        ]);

        assert_eq!(table.match_route(Method::Get, "/items/42").unwrap().action(), "show");

        let m = table.match_route(Method::Get, "/items/latest").unwrap();
        assert_eq!(m.action(), "by_name");
        assert_eq!(m.get("name"), Some("latest"));
    }

    #[test]
    fn test_inline_requirement_is_anchored() {
        let route = Route::new("GET", "/items/{id:\\d+}", "items", "show").unwrap();
        assert_eq!(route.pattern(), "/items/{id}");

        let table = RouteTable::new(vec![route]);
        assert!(table.match_route(Method::Get, "/items/42abc").is_none());
    }

    #[test]
    fn test_defaults_and_placeholder_precedence() {
        let extras = RouteExtras::new()
            .default_value("auth", "True")
            .default_value("id", "none");
        let table = RouteTable::new(vec![
            Route::new("GET", "/{controller}/{action}/{id}", "unused", "unused")
                .unwrap()
                .with_extras(extras),
        ]);

        let m = table.match_route(Method::Get, "/storage/get/7").unwrap();
        assert_eq!(m.controller(), "storage");
        assert_eq!(m.action(), "get");
        assert_eq!(m.get("auth"), Some("True"));
        assert_eq!(m.get("id"), Some("7"));
    }

    #[test]
    fn test_no_match_is_none() {
        let table = RouteTable::new(vec![Route::new("GET", "/items", "items", "list").unwrap()]);
        assert!(table.match_route(Method::Get, "/nope").is_none());
    }

    #[test]
    fn test_route_validation() {
        assert!(matches!(
            Route::new(Vec::<&str>::new(), "/x", "c", "a"),
            Err(Error::Config(_))
        ));
        assert!(matches!(Route::new("FETCH", "/x", "c", "a"), Err(Error::Config(_))));
        assert!(matches!(Route::new("GET", "x", "c", "a"), Err(Error::InvalidPath(_))));
        assert!(matches!(
            Route::new("GET", "/x/{id:(}", "c", "a"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_descriptor_four_elements() {
        let route = Route::from_descriptor(&descriptor(r#"["GET", "/items/{id}", "items", "show"]"#)).unwrap();
        assert_eq!(route.verbs(), &[Method::Get]);
        assert_eq!(route.controller(), "items");
        assert_eq!(route.action(), "show");
    }

    #[test]
    fn test_descriptor_five_elements() {
        let route = Route::from_descriptor(&descriptor(
            r#"[["PUT", "POST"], "/{user}/items/{id}", "items", "save", { auth = true, requirements = { id = "\\d+" } }]"#,
        ))
        .unwrap();
        assert_eq!(route.verbs(), &[Method::Put, Method::Post]);

        let table = RouteTable::new(vec![route]);
        let m = table.match_route(Method::Post, "/bob/items/3").unwrap();
        assert_eq!(m.get("auth"), Some("True"));
        assert_eq!(m.get("user"), Some("bob"));
        assert!(table.match_route(Method::Post, "/bob/items/x").is_none());
    }

    #[test]
    fn test_descriptor_arity_is_checked() {
        for bad in [
            r#"["GET", "/items", "items"]"#,
            r#"["GET", "/items", "items", "list", {}, "extra"]"#,
            r#""GET /items""#,
        ] {
            let err = Route::from_descriptor(&descriptor(bad)).unwrap_err();
            assert!(err.to_string().contains("needs 4 or 5 elements"), "{}", err);
        }
    }

    #[test]
    fn test_load_routes() {
        let routes = load_routes(
            r#"
            routes = [
                ["GET", "/items", "items", "list"],
                ["DELETE", "/items/{id}", "items", "delete"],
            ]
            "#,
        )
        .unwrap();
        assert_eq!(routes.len(), 2);

        let table = RouteTable::new(routes);
        assert_eq!(table.len(), 2);
        assert_eq!(table.match_route(Method::Delete, "/items/9").unwrap().action(), "delete");
    }

    #[test]
    fn test_table_from_descriptors() {
        let descriptors = vec![
            descriptor(r#"["GET", "/a", "c", "a"]"#),
            descriptor(r#"["GET", "/b", "c"]"#),
        ];
        assert!(RouteTable::from_descriptors(&descriptors).is_err());
    }

    #[test]
    fn test_extra_slashes_do_not_match() {
        let table = RouteTable::new(vec![Route::new("GET", "/items/{id}", "items", "show").unwrap()]);

        assert!(table.match_route(Method::Get, "/items//42").is_none());
        assert!(table.match_route(Method::Get, "//items///42").is_none());
        assert!(table.match_route(Method::Get, "/items/").is_none());
    }

    #[test]
    fn test_load_routes_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "routes = [[\"GET\", \"/items/{{id}}\", \"items\", \"show\"]]\n").unwrap();

        let table = RouteTable::new(load_routes_file(file.path()).unwrap());
        assert_eq!(table.match_route(Method::Get, "/items/3").unwrap().get("id"), Some("3"));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_routes_file(dir.path().join("routes.toml")), Err(Error::Io(_))));
    }
}
