//! Controllers and actions
//!
//! A controller is a named group of actions. Controllers are built once per
//! dispatcher from a factory that receives the dispatcher's base config, and
//! are shared by every request afterwards; any state they hold must be
//! thread-safe.
//!
//! ```
//! use weave_core::controller::{Controller, Reply};
//!
//! let items = Controller::new("items")
//!     .action("show", |req, _params| {
//!         let id = req.param("id").unwrap_or("?");
//!         Ok(Reply::Text(format!("item {}", id)))
//!     });
//! assert!(items.get("show").is_some());
//! ```

use crate::config::Config;
use crate::request::Request;
use crate::response::Response;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error carried by action failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Implicit action parameters (the query string on GET and DELETE)
pub type Params = HashMap<String, String>;

/// What an action hands back to the dispatcher
#[derive(Debug, Clone)]
pub enum Reply {
    /// Body text; fills the response staged on the request, if any
    Text(String),
    /// A finished response, passed through unchanged
    Response(Response),
}

impl From<String> for Reply {
    fn from(body: String) -> Self {
        Reply::Text(body)
    }
}

impl From<&str> for Reply {
    fn from(body: &str) -> Self {
        Reply::Text(body.to_string())
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

/// Action failure
#[derive(Debug, Error)]
pub enum ActionError {
    /// A downstream dependency is unavailable; the client should retry later
    #[error("Backend error: {0}")]
    Backend(BoxError),

    /// Anything else
    #[error("{0}")]
    Other(BoxError),
}

impl ActionError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        ActionError::Backend(err.into())
    }

    pub fn other(err: impl Into<BoxError>) -> Self {
        ActionError::Other(err.into())
    }

    pub fn is_backend(&self) -> bool {
        matches!(self, ActionError::Backend(_))
    }
}

/// Action outcome
pub type ActionResult = std::result::Result<Reply, ActionError>;

/// Request handler bound to a controller
pub type Action = Arc<dyn Fn(&mut Request, &Params) -> ActionResult + Send + Sync>;

/// Builds a controller from the dispatcher's base config
pub type ControllerFactory = Box<dyn FnOnce(&Config) -> Controller + Send>;

/// Named group of actions
#[derive(Clone)]
pub struct Controller {
    name: String,
    actions: HashMap<String, Action>,
}

impl Controller {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: HashMap::new(),
        }
    }

    /// Register an action
    pub fn action<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Request, &Params) -> ActionResult + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, action: &str) -> Option<&Action> {
        self.actions.get(action)
    }

    /// Sorted action names
    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("actions", &self.action_names())
            .finish()
    }
}

/// Controllers by name, owned by the dispatcher
#[derive(Debug, Default)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Controller>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate every controller from its factory
    pub fn build<I>(factories: I, config: &Config) -> Self
    where
        I: IntoIterator<Item = (String, ControllerFactory)>,
    {
        let controllers = factories
            .into_iter()
            .map(|(name, factory)| (name, factory(config)))
            .collect();
        Self { controllers }
    }

    pub fn insert(&mut self, name: impl Into<String>, controller: Controller) {
        self.controllers.insert(name.into(), controller);
    }

    pub fn get(&self, name: &str) -> Option<&Controller> {
        self.controllers.get(name)
    }

    /// Resolve a controller action; `None` when either part is unknown
    pub fn get_function(&self, controller: &str, action: &str) -> Option<&Action> {
        self.controllers.get(controller)?.get(action)
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Method, RequestBuilder};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_get_function() {
        let mut registry = ControllerRegistry::new();
        registry.insert(
            "items",
            Controller::new("items").action("list", |_req, _params| Ok("[]".into())),
        );

        assert!(registry.get_function("items", "list").is_some());
        assert!(registry.get_function("items", "delete").is_none());
        assert!(registry.get_function("users", "list").is_none());
    }

    #[test]
    fn test_build_passes_config() {
        let config = Config::new().with("storage.quota", 10);
        let factory: ControllerFactory = Box::new(|config: &Config| {
            let quota = config.get_int("storage.quota").unwrap_or(0);
            Controller::new("storage")
                .action("quota", move |_req, _params| Ok(Reply::Text(quota.to_string())))
        });

        let registry = ControllerRegistry::build(vec![("storage".to_string(), factory)], &config);
        let action = registry.get_function("storage", "quota").unwrap();

        let mut req = RequestBuilder::new(Method::Get, "/quota").build();
        match action(&mut req, &Params::new()).unwrap() {
            Reply::Text(body) => assert_eq!(body, "10"),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_controller_state_is_shared() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let controller = Controller::new("stats").action("hit", move |_req, _params| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::Text(String::new()))
        });

        let action = controller.get("hit").unwrap();
        let mut req = RequestBuilder::new(Method::Post, "/hit").build();
        action(&mut req, &Params::new()).unwrap();
        action(&mut req, &Params::new()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_action_error_kinds() {
        let err = ActionError::backend("mysql is gone");
        assert!(err.is_backend());
        assert_eq!(err.to_string(), "Backend error: mysql is gone");

        let err = ActionError::other("bad input");
        assert!(!err.is_backend());
        assert_eq!(err.to_string(), "bad input");
    }

    #[test]
    fn test_action_names_sorted() {
        let controller = Controller::new("c")
            .action("b", |_r, _p| Ok("".into()))
            .action("a", |_r, _p| Ok("".into()));
        assert_eq!(controller.action_names(), vec!["a", "b"]);
    }
}
