//! Application layer
//!
//! [`App`] puts a middleware chain around a [`Dispatcher`] and turns every
//! error into a response, so [`App::call`] always answers.

use crate::dispatcher::Dispatcher;
use crate::middleware::{AccessLog, Middleware, MiddlewareChain};
use crate::timestamp::TIMESTAMP_HEADER;
use crate::{Error, Request, Response};
use std::sync::Arc;

/// Dispatcher plus middleware and error catching
pub struct App {
    dispatcher: Arc<Dispatcher>,
    middleware: MiddlewareChain,
    client_debug: bool,
}

impl App {
    /// Wrap a dispatcher. `debug = true` installs the access log;
    /// `client_debug = true` shows fault details to clients.
    pub fn new(dispatcher: Dispatcher) -> Self {
        let settings = dispatcher.settings().clone();
        let mut middleware = MiddlewareChain::new();
        if settings.debug {
            middleware.add(AccessLog::new());
        }

        Self {
            dispatcher: Arc::new(dispatcher),
            middleware,
            client_debug: settings.client_debug,
        }
    }

    /// Append a middleware; it runs after the ones already installed
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.add(middleware);
        self
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serve one request
    pub fn call(&self, mut req: Request) -> Response {
        if let Some(mut res) = self.middleware.run_before(&mut req) {
            self.middleware.run_after(&req, &mut res);
            return res;
        }

        let mut res = match self.dispatcher.handle(&mut req) {
            Ok(res) => res,
            Err(err) => self.error_response(&req, err),
        };

        self.middleware.run_after(&req, &mut res);
        res
    }

    fn error_response(&self, req: &Request, err: Error) -> Response {
        if !err.is_client_facing() {
            tracing::error!(
                method = %req.method,
                path = %req.path,
                error = %err,
                detail = ?err,
                "request failed"
            );
        }
        let mut res = err.into_response(self.client_debug);
        if let Some(time) = req.server_time {
            res.set_header(TIMESTAMP_HEADER, time.to_string());
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, Authenticator};
    use crate::controller::{ActionError, Controller, Reply};
    use crate::request::{Method, RequestBuilder};
    use crate::response::StatusCode;
    use crate::routes::{MatchResult, Route};
    use crate::Config;

    struct DenyAll;

    impl Authenticator for DenyAll {
        fn check(&self, _req: &Request, _matched: &mut MatchResult) -> std::result::Result<(), AuthError> {
            Err(AuthError::unauthorized("Sync", "who are you"))
        }
    }

    fn dispatcher(config: Config) -> Dispatcher {
        Dispatcher::builder()
            .route(Route::new("GET", "/hello", "misc", "hello").unwrap())
            .route(Route::new("GET", "/boom", "misc", "boom").unwrap())
            .route(Route::new("GET", "/private", "misc", "hello").unwrap())
            .controller("misc", |_config| {
                Controller::new("misc")
                    .action("hello", |_req, _params| Ok(Reply::Text("hello".to_string())))
                    .action("boom", |_req, _params| Err(ActionError::other("secret detail")))
            })
            .config(config)
            .build()
            .unwrap()
    }

    fn get(path: &str) -> Request {
        RequestBuilder::new(Method::Get, path).build()
    }

    #[test]
    fn test_success_passes_through() {
        let app = App::new(dispatcher(Config::new()));
        let res = app.call(get("/hello"));
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body_string().unwrap(), "hello");
    }

    #[test]
    fn test_head_becomes_400() {
        let app = App::new(dispatcher(Config::new()));
        let res = app.call(RequestBuilder::new(Method::Head, "/hello").build());
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body_string().unwrap(), "\"HEAD\" not supported");
        assert!(res.header(TIMESTAMP_HEADER).is_none());
    }

    #[test]
    fn test_fault_is_500_without_detail() {
        let app = App::new(dispatcher(Config::new()));
        let res = app.call(get("/boom"));
        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.body.is_empty());
        assert!(res.header(TIMESTAMP_HEADER).is_some());
    }

    #[test]
    fn test_fault_detail_with_client_debug() {
        let app = App::new(dispatcher(Config::new().with("client_debug", true)));
        let res = app.call(get("/boom"));
        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.body_string().unwrap().contains("secret detail"));
    }

    #[test]
    fn test_auth_error_rendered_by_gate() {
        let dispatcher = Dispatcher::builder()
            .route(Route::new("GET", "/private", "misc", "hello").unwrap())
            .controller("misc", |_config| {
                Controller::new("misc").action("hello", |_req, _params| Ok("hello".into()))
            })
            .auth_with(|_config| {
                let auth: Box<dyn Authenticator> = Box::new(DenyAll);
                Ok(auth)
            })
            .build()
            .unwrap();

        let res = App::new(dispatcher).call(get("/private"));
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.header("WWW-Authenticate"), Some("Basic realm=\"Sync\""));
        assert_eq!(res.body_string().unwrap(), "who are you");
    }

    #[test]
    fn test_debug_installs_access_log() {
        let app = App::new(dispatcher(Config::new().with("debug", true)));
        assert_eq!(app.middleware.len(), 1);

        let app = App::new(dispatcher(Config::new()));
        assert!(app.middleware.is_empty());
    }

    struct Maintenance;

    impl Middleware for Maintenance {
        fn before(&self, _req: &mut Request) -> Option<Response> {
            Some(Response::service_unavailable(120))
        }

        fn after(&self, _req: &Request, res: &mut Response) {
            res.set_header("X-Maintenance", "1");
        }
    }

    #[test]
    fn test_middleware_can_short_circuit() {
        let app = App::new(dispatcher(Config::new())).with(Maintenance);
        let res = app.call(get("/hello"));
        assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.header("X-Maintenance"), Some("1"));
    }
}
