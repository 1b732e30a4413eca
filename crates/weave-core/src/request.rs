//! HTTP Request types

use crate::config::Config;
use crate::response::Response;
use crate::routes::MatchResult;
use crate::timestamp::ServerTime;
use crate::{Error, Result};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// HTTP Methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Connect,
    Trace,
}

impl Method {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
        }
    }

    /// Whether actions receive the query string as parameters
    pub fn takes_query_params(&self) -> bool {
        matches!(self, Method::Get | Method::Delete)
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "CONNECT" => Ok(Method::Connect),
            "TRACE" => Ok(Method::Trace),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP Request
///
/// Besides the wire-level fields, a request carries the per-request state the
/// dispatcher builds up: server time, effective config and match result.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    /// Query string (without leading ?)
    pub query: Option<String>,
    /// Virtual host the request was addressed to
    pub host: Option<String>,
    /// Request headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(String, String); 16]>,
    /// Request body
    pub body: bytes::Bytes,
    /// Placeholder values captured by the route table
    pub params: HashMap<String, String>,
    /// Environment bag (`REQUEST_METHOD`, `PATH_INFO`, ...)
    pub environ: HashMap<String, String>,
    /// When the transport handed the request over
    pub received_at: Instant,
    /// Dispatch-start time
    pub server_time: Option<ServerTime>,
    /// Effective configuration for this request's host
    pub config: Option<Arc<Config>>,
    /// Routing result
    pub match_info: Option<MatchResult>,
    /// Response staged by an action, filled with a text reply
    pub response: Option<Response>,
}

impl Request {
    /// Create a new request
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let mut environ = HashMap::new();
        environ.insert("REQUEST_METHOD".to_string(), method.to_string());
        environ.insert("PATH_INFO".to_string(), path.clone());

        Self {
            method,
            path,
            query: None,
            host: None,
            headers: SmallVec::new(),
            body: bytes::Bytes::new(),
            params: HashMap::new(),
            environ,
            received_at: Instant::now(),
            server_time: None,
            config: None,
            match_info: None,
            response: None,
        }
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get content-type header
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Host the request targets: explicit host, then the `Host` header
    pub fn host(&self) -> &str {
        self.host
            .as_deref()
            .or_else(|| self.header("host"))
            .unwrap_or("localhost")
    }

    /// Replace the path seen by routing and by the environment bag
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
        self.environ.insert("PATH_INFO".to_string(), self.path.clone());
    }

    /// Get a route parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|s| s.as_str())
    }

    /// Look up a key in the request's effective config
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.as_deref().and_then(|c| c.get_str(key))
    }

    /// Response an action can decorate before returning a text reply
    pub fn response_mut(&mut self) -> &mut Response {
        self.response.get_or_insert_with(Response::ok)
    }

    /// Parse query string into key-value pairs. Later duplicates win.
    pub fn query_params(&self) -> HashMap<String, String> {
        self.query
            .as_deref()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default()
    }
}

/// Builder for constructing requests
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Create a new builder
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request: Request::new(method, path),
        }
    }

    /// Set query string
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.request.query = Some(query.into());
        self
    }

    /// Set the virtual host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.request.host = Some(host.into());
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    /// Set body
    pub fn body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.request.body = body.into();
        self
    }

    /// Add an environment entry
    pub fn environ(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.environ.insert(key.into(), value.into());
        self
    }

    /// Build the request
    pub fn build(mut self) -> Request {
        let query = self.request.query.clone().unwrap_or_default();
        let host = self.request.host().to_string();
        self.request.environ.insert("QUERY_STRING".to_string(), query);
        self.request.environ.insert("HTTP_HOST".to_string(), host);
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
        assert!("INVALID".parse::<Method>().is_err());
    }

    #[test]
    fn test_query_param_methods() {
        assert!(Method::Get.takes_query_params());
        assert!(Method::Delete.takes_query_params());
        assert!(!Method::Post.takes_query_params());
        assert!(!Method::Put.takes_query_params());
    }

    #[test]
    fn test_request_header() {
        let req = RequestBuilder::new(Method::Get, "/")
            .header("Content-Type", "application/json")
            .build();

        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn test_query_params() {
        let req = RequestBuilder::new(Method::Get, "/")
            .query("foo=bar&baz=qux%20quux&foo=last")
            .build();

        let params = req.query_params();
        assert_eq!(params.get("foo"), Some(&"last".to_string()));
        assert_eq!(params.get("baz"), Some(&"qux quux".to_string()));
    }

    #[test]
    fn test_host_resolution() {
        let req = RequestBuilder::new(Method::Get, "/")
            .header("Host", "example.com")
            .build();
        assert_eq!(req.host(), "example.com");
        assert_eq!(req.environ.get("HTTP_HOST").unwrap(), "example.com");

        let req = RequestBuilder::new(Method::Get, "/")
            .host("sync.example.org")
            .header("Host", "example.com")
            .build();
        assert_eq!(req.host(), "sync.example.org");

        assert_eq!(Request::new(Method::Get, "/").host(), "localhost");
    }

    #[test]
    fn test_set_path_updates_environ() {
        let mut req = RequestBuilder::new(Method::Get, "/items/").build();
        assert_eq!(req.environ.get("PATH_INFO").unwrap(), "/items/");

        req.set_path("/items");
        assert_eq!(req.path, "/items");
        assert_eq!(req.environ.get("PATH_INFO").unwrap(), "/items");
    }
}
