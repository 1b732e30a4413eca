//! Authentication gate
//!
//! The dispatcher calls an [`Authenticator`] once per routed request, before
//! the action runs. A failure is returned to the caller as-is: the
//! authenticator decides status, challenge and body.
//!
//! [`BasicAuth`] is the stock gate. It only guards routes whose match carries
//! `auth = "True"` and checks HTTP Basic credentials against a
//! [`UserDirectory`] supplied by the application.

use crate::config::Config;
use crate::request::Request;
use crate::response::{Response, ResponseBuilder, StatusCode};
use crate::routes::MatchResult;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Default realm announced in Basic challenges
pub const DEFAULT_REALM: &str = "Sync";

/// Authentication failure, rendered by the gate that raised it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Missing or wrong credentials; the client may retry with others
    #[error("Unauthorized: {message}")]
    Unauthorized { realm: String, message: String },

    /// Authenticated, but not allowed here
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl AuthError {
    pub fn unauthorized(realm: impl Into<String>, message: impl Into<String>) -> Self {
        AuthError::Unauthorized {
            realm: realm.into(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            AuthError::Unauthorized { realm, message } => ResponseBuilder::new(StatusCode::UNAUTHORIZED)
                .header("WWW-Authenticate", format!("Basic realm=\"{}\"", realm))
                .header("content-type", "text/plain")
                .body(message)
                .build(),
            AuthError::Forbidden(message) => ResponseBuilder::new(StatusCode::FORBIDDEN)
                .header("content-type", "text/plain")
                .body(message)
                .build(),
        }
    }
}

/// Pluggable authentication check
pub trait Authenticator: Send + Sync {
    /// Accept the request or explain why not. May add values (such as the
    /// user id) to the match result.
    fn check(&self, req: &Request, matched: &mut MatchResult) -> Result<(), AuthError>;
}

/// Builds the gate from the dispatcher's base config
pub type AuthFactory = Box<dyn FnOnce(&Config) -> crate::Result<Box<dyn Authenticator>> + Send>;

/// Credential store behind [`BasicAuth`]
pub trait UserDirectory: Send + Sync {
    /// User id for valid credentials, `None` otherwise
    fn authenticate_user(&self, user_name: &str, password: &str) -> Option<String>;
}

impl<F> UserDirectory for F
where
    F: Fn(&str, &str) -> Option<String> + Send + Sync,
{
    fn authenticate_user(&self, user_name: &str, password: &str) -> Option<String> {
        self(user_name, password)
    }
}

/// Basic authentication credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    /// Parse from Authorization header
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, encoded) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;

        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Encode to Authorization header value
    pub fn encode(&self) -> String {
        let combined = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(combined))
    }
}

/// HTTP Basic gate for routes flagged `auth = "True"`
pub struct BasicAuth<D> {
    realm: String,
    directory: D,
}

impl<D: UserDirectory> BasicAuth<D> {
    pub fn new(realm: impl Into<String>, directory: D) -> Self {
        Self {
            realm: realm.into(),
            directory,
        }
    }

    /// Read the realm from `auth.realm`
    pub fn from_config(config: &Config, directory: D) -> Self {
        let realm = config.get_str("auth.realm").unwrap_or(DEFAULT_REALM);
        Self::new(realm, directory)
    }

    fn deny(&self, message: &str) -> AuthError {
        AuthError::unauthorized(self.realm.clone(), message)
    }
}

fn requires_auth(matched: &MatchResult) -> bool {
    matched
        .get("auth")
        .map_or(false, |v| v.eq_ignore_ascii_case("true"))
}

impl<D: UserDirectory> Authenticator for BasicAuth<D> {
    fn check(&self, req: &Request, matched: &mut MatchResult) -> Result<(), AuthError> {
        if !requires_auth(matched) {
            return Ok(());
        }

        let header = req
            .header("authorization")
            .ok_or_else(|| self.deny("Authentication required"))?;
        let creds =
            BasicCredentials::parse(header).ok_or_else(|| self.deny("Invalid authorization header"))?;

        if let Some(expected) = matched.get("username") {
            if expected != creds.username {
                tracing::debug!(url_user = %expected, auth_user = %creds.username, "username mismatch");
                return Err(self.deny("Username does not match the URL"));
            }
        }

        let user_id = self
            .directory
            .authenticate_user(&creds.username, &creds.password)
            .ok_or_else(|| self.deny("Invalid credentials"))?;

        matched.insert("user_id", user_id);
        Ok(())
    }
}
