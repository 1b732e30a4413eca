//! Error types for weave-core

use crate::auth::AuthError;
use crate::controller::ActionError;
use crate::request::Method;
use crate::response::{Response, ResponseBuilder, StatusCode};
use thiserror::Error;

/// Result type alias for weave operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the weave dispatcher
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Invalid route pattern or placeholder requirement
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Malformed route table or configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Method the dispatcher refuses to serve
    #[error("\"{0}\" not supported")]
    UnsupportedMethod(Method),

    /// Authentication failure, owned by the auth gate
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Unclassified failure raised by an action
    #[error("Action {controller}.{action} failed: {source}")]
    Action {
        controller: String,
        action: String,
        #[source]
        source: ActionError,
    },

    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Status code the application layer answers with
    pub fn status(&self) -> StatusCode {
        match self {
            Error::UnsupportedMethod(_) => StatusCode::BAD_REQUEST,
            Error::Auth(e) => e.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error is part of the HTTP contract rather than a fault
    pub fn is_client_facing(&self) -> bool {
        matches!(self, Error::UnsupportedMethod(_) | Error::Auth(_))
    }

    /// Render the error as a response.
    ///
    /// Auth failures are rendered by the auth component itself. Faults get an
    /// empty body unless `show_detail` is set.
    pub fn into_response(self, show_detail: bool) -> Response {
        match self {
            Error::UnsupportedMethod(method) => {
                Response::bad_request(&format!("\"{}\" not supported", method))
            }
            Error::Auth(e) => e.into_response(),
            other => {
                let builder = ResponseBuilder::new(StatusCode::INTERNAL_SERVER_ERROR);
                if show_detail {
                    builder
                        .header("content-type", "text/plain")
                        .body(other.to_string())
                        .build()
                } else {
                    builder.build()
                }
            }
        }
    }
}
