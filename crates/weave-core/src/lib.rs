//! weave-core: request-dispatch core for sync-style web services
//!
//! Maps verb + path patterns to controller actions and wraps them with an
//! authentication gate, per-host configuration, heartbeat and debug pages,
//! and one error-to-status translation layer.
//!
//! ## Features
//! - `native` - hyper server on a tokio runtime, plus subscriber setup

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod app;
pub mod auth;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod middleware;
pub mod normalize;
pub mod request;
pub mod response;
pub mod routes;
pub mod standard;
pub mod timestamp;

#[cfg(feature = "native")]
pub mod logging;

#[cfg(feature = "native")]
pub mod server;

// Re-exports
pub use app::App;
pub use auth::{AuthError, Authenticator, BasicAuth, BasicCredentials, UserDirectory};
pub use config::{Config, Settings, Value};
pub use controller::{ActionError, ActionResult, Controller, Params, Reply};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{Error, Result};
pub use request::{Method, Request, RequestBuilder};
pub use response::{Response, ResponseBuilder, StatusCode};
pub use routes::{load_routes, load_routes_file, MatchResult, Route, RouteExtras, RouteTable};
pub use timestamp::{ServerTime, TIMESTAMP_HEADER};

// Middleware re-exports
pub use middleware::{AccessLog, Middleware, MiddlewareChain};

#[cfg(feature = "native")]
pub use logging::{init_tracing, LoggingConfig};

#[cfg(feature = "native")]
pub use server::{bind_listener, from_hyper_request, serve, serve_listener, to_hyper_response, ServerConfig};
