//! Request dispatcher
//!
//! The dispatcher owns the route table, the controllers, the auth gate and
//! the per-host config cache, and runs one request through them:
//!
//! 1. refuse `HEAD`
//! 2. stamp the server time and resolve the host config
//! 3. run the pre-hook
//! 4. strip one trailing slash
//! 5. serve the heartbeat or debug page, bypassing routing and auth
//! 6. match a route (404 when none fits) and check auth
//! 7. call the action with the query parameters on `GET` and `DELETE`
//! 8. normalize the reply and stamp the response
//!
//! A backend failure becomes a 503 with `Retry-After`. Auth failures and
//! other action failures are returned as errors for the application layer.
//!
//! ```
//! use weave_core::{Controller, Dispatcher, Method, RequestBuilder, Route};
//!
//! let dispatcher = Dispatcher::builder()
//!     .route(Route::new("GET", "/items/{id}", "items", "show").unwrap())
//!     .controller("items", |_config| {
//!         Controller::new("items").action("show", |req, _params| {
//!             Ok(format!("item {}", req.param("id").unwrap_or("?")).into())
//!         })
//!     })
//!     .build()
//!     .unwrap();
//!
//! let res = dispatcher
//!     .dispatch(RequestBuilder::new(Method::Get, "/items/42").build())
//!     .unwrap();
//! assert_eq!(res.body_string().unwrap(), "item 42");
//! ```

use crate::auth::{AuthFactory, Authenticator};
use crate::config::{Config, Settings};
use crate::controller::{ActionError, Controller, ControllerFactory, ControllerRegistry, Params};
use crate::host::HostConfigCache;
use crate::normalize::{finalize, normalize};
use crate::request::{Method, Request};
use crate::response::Response;
use crate::routes::{Route, RouteTable};
use crate::standard::StandardController;
use crate::timestamp::ServerTime;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, error};

/// Pre-hook run before routing; returns headers added to the response
pub type BeforeCallFn = Arc<dyn Fn(&mut Request) -> Vec<(String, String)> + Send + Sync>;

/// Builder for [`Dispatcher`]
pub struct DispatcherBuilder {
    routes: Vec<Route>,
    controllers: Vec<(String, ControllerFactory)>,
    config: Config,
    auth: Option<AuthFactory>,
    before_call: Option<BeforeCallFn>,
    standard: StandardController,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            controllers: Vec::new(),
            config: Config::new(),
            auth: None,
            before_call: None,
            standard: StandardController::new(),
        }
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route; earlier routes take precedence
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Append several routes in order
    pub fn routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes.extend(routes);
        self
    }

    /// Register a controller factory, called once at build time
    pub fn controller<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: FnOnce(&Config) -> Controller + Send + 'static,
    {
        self.controllers.push((name.into(), Box::new(factory)));
        self
    }

    /// Base configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Install an auth gate built from the base config
    pub fn auth_with<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&Config) -> Result<Box<dyn Authenticator>> + Send + 'static,
    {
        self.auth = Some(Box::new(factory));
        self
    }

    /// Install the pre-hook
    pub fn before_call<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Request) -> Vec<(String, String)> + Send + Sync + 'static,
    {
        self.before_call = Some(Arc::new(hook));
        self
    }

    /// Liveness check behind the heartbeat page
    pub fn check_server<F>(mut self, check: F) -> Self
    where
        F: Fn(&Request) -> std::result::Result<(), ActionError> + Send + Sync + 'static,
    {
        self.standard = self.standard.check_server(check);
        self
    }

    /// Extra lines for the debug page
    pub fn debug_server<F>(mut self, lines: F) -> Self
    where
        F: Fn(&Request) -> Vec<String> + Send + Sync + 'static,
    {
        self.standard = self.standard.debug_server(lines);
        self
    }

    /// Build controllers and the auth gate, and compile the route table
    pub fn build(self) -> Result<Dispatcher> {
        let settings = Settings::from_config(&self.config);
        let controllers = ControllerRegistry::build(self.controllers, &self.config);
        let auth = match self.auth {
            Some(factory) => Some(factory(&self.config)?),
            None => None,
        };

        debug!(
            routes = self.routes.len(),
            controllers = controllers.len(),
            auth = auth.is_some(),
            "dispatcher built"
        );

        Ok(Dispatcher {
            routes: RouteTable::new(self.routes),
            controllers,
            config: self.config,
            settings,
            hosts: HostConfigCache::new(),
            auth,
            before_call: self.before_call,
            standard: self.standard,
        })
    }
}

/// Routes requests to controller actions
pub struct Dispatcher {
    routes: RouteTable,
    controllers: ControllerRegistry,
    config: Config,
    settings: Settings,
    hosts: HostConfigCache,
    auth: Option<Box<dyn Authenticator>>,
    before_call: Option<BeforeCallFn>,
    standard: StandardController,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Base configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Effective configuration for `host`
    pub fn host_config(&self, host: &str) -> Arc<Config> {
        self.hosts.resolve(host, &self.config)
    }

    /// Run one request through the pipeline
    pub fn dispatch(&self, mut req: Request) -> Result<Response> {
        self.handle(&mut req)
    }

    /// Like [`dispatch`](Self::dispatch), leaving the request (with its
    /// server time, config and match result) to the caller
    pub fn handle(&self, req: &mut Request) -> Result<Response> {
        if req.method == Method::Head {
            return Err(Error::UnsupportedMethod(req.method));
        }

        let server_time = ServerTime::now();
        req.server_time = Some(server_time);

        let host = req.host().to_string();
        req.config = Some(self.host_config(&host));

        let extra_headers = match &self.before_call {
            Some(hook) => hook(req),
            None => Vec::new(),
        };

        let mut response = self.respond(req)?;
        finalize(&mut response, server_time, &extra_headers);
        Ok(response)
    }

    fn respond(&self, req: &mut Request) -> Result<Response> {
        let url = req.path.strip_suffix('/').unwrap_or(&req.path).to_string();
        if !url.is_empty() {
            req.set_path(url.as_str());
        }

        if let Some(page) = &self.settings.heartbeat_page {
            if is_page(&url, page) {
                return Ok(self.standard.heartbeat(req, self.settings.retry_after));
            }
        }
        if let Some(page) = &self.settings.debug_page {
            if is_page(&url, page) {
                return Ok(self.standard.debug(req));
            }
        }

        let Some(mut matched) = self.routes.match_route(req.method, &req.path) else {
            debug!(method = %req.method, path = %req.path, "no route");
            return Ok(Response::not_found("Not Found"));
        };

        if let Some(auth) = &self.auth {
            auth.check(req, &mut matched)?;
        }

        let controller = matched.controller().to_string();
        let action_name = matched.action().to_string();
        let Some(action) = self.controllers.get_function(&controller, &action_name) else {
            debug!(controller = %controller, action = %action_name, "unknown action");
            return Ok(Response::not_found(&format!("Unknown URL '{}'", req.path)));
        };

        req.params = matched.path_params().iter().cloned().collect();
        req.match_info = Some(matched);

        let params = if req.method.takes_query_params() {
            req.query_params()
        } else {
            Params::new()
        };

        match action(req, &params) {
            Ok(reply) => Ok(normalize(reply, req.response.take())),
            Err(ActionError::Backend(e)) => {
                error!(
                    controller = %controller,
                    action = %action_name,
                    error = %e,
                    detail = ?e,
                    "backend failure"
                );
                Ok(Response::service_unavailable(self.settings.retry_after))
            }
            Err(source) => Err(Error::Action {
                controller,
                action: action_name,
                source,
            }),
        }
    }
}

fn is_page(url: &str, page: &str) -> bool {
    url.strip_prefix('/') == Some(page)
}
