//! Heartbeat and debug pages
//!
//! Both pages are served before routing, so they work even when the route
//! table or the auth gate is misconfigured. The application customizes them
//! through two callbacks given to the dispatcher builder.

use crate::controller::ActionError;
use crate::request::Request;
use crate::response::{Response, ResponseBuilder, StatusCode};
use std::fmt::Write;
use std::sync::Arc;

/// Liveness check run by the heartbeat page
pub type CheckServerFn = Arc<dyn Fn(&Request) -> std::result::Result<(), ActionError> + Send + Sync>;

/// Extra lines for the debug page
pub type DebugServerFn = Arc<dyn Fn(&Request) -> Vec<String> + Send + Sync>;

/// Heartbeat status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStatus {
    Healthy,
    Unavailable,
}

impl HeartbeatStatus {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HeartbeatStatus::Healthy => StatusCode::OK,
            HeartbeatStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Serves the heartbeat and debug pages
#[derive(Clone)]
pub struct StandardController {
    check_server: CheckServerFn,
    debug_server: DebugServerFn,
}

fn always_healthy(_: &Request) -> std::result::Result<(), ActionError> {
    Ok(())
}

fn no_lines(_: &Request) -> Vec<String> {
    Vec::new()
}

impl Default for StandardController {
    fn default() -> Self {
        Self {
            check_server: Arc::new(always_healthy),
            debug_server: Arc::new(no_lines),
        }
    }
}

impl StandardController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the liveness check
    pub fn check_server<F>(mut self, check: F) -> Self
    where
        F: Fn(&Request) -> std::result::Result<(), ActionError> + Send + Sync + 'static,
    {
        self.check_server = Arc::new(check);
        self
    }

    /// Replace the debug page extension
    pub fn debug_server<F>(mut self, lines: F) -> Self
    where
        F: Fn(&Request) -> Vec<String> + Send + Sync + 'static,
    {
        self.debug_server = Arc::new(lines);
        self
    }

    /// Run the liveness check
    pub fn probe(&self, req: &Request) -> HeartbeatStatus {
        match (self.check_server)(req) {
            Ok(()) => HeartbeatStatus::Healthy,
            Err(e) => {
                tracing::error!(error = %e, "heartbeat check failed");
                HeartbeatStatus::Unavailable
            }
        }
    }

    /// `200 OK` when the server is healthy, `503` with `Retry-After` otherwise
    pub fn heartbeat(&self, req: &Request, retry_after: u64) -> Response {
        match self.probe(req) {
            HeartbeatStatus::Healthy => ResponseBuilder::new(StatusCode::OK)
                .header("content-type", "text/plain")
                .body("OK")
                .build(),
            HeartbeatStatus::Unavailable => Response::service_unavailable(retry_after),
        }
    }

    /// Plain-text dump of the request, its environment and the server lines
    pub fn debug(&self, req: &Request) -> Response {
        let mut page = String::from("Debug information\n=================\n\n");

        page.push_str("Request\n-------\n");
        let _ = writeln!(page, "method: {}", req.method);
        let _ = writeln!(page, "path: {}", req.path);
        let _ = writeln!(page, "host: {}", req.host());
        if let Some(time) = req.server_time {
            let _ = writeln!(page, "server time: {}", time);
        }

        page.push_str("\nEnviron\n-------\n");
        let mut environ: Vec<_> = req.environ.iter().collect();
        environ.sort();
        for (key, value) in environ {
            let _ = writeln!(page, "{}: {}", key, value);
        }

        let lines = (self.debug_server)(req);
        if !lines.is_empty() {
            page.push_str("\nServer\n------\n");
            for line in lines {
                page.push_str(&line);
                page.push('\n');
            }
        }

        Response::text(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Method, RequestBuilder};

    fn request() -> Request {
        RequestBuilder::new(Method::Get, "/__heartbeat__").host("example.com").build()
    }

    #[test]
    fn test_heartbeat_ok() {
        let res = StandardController::new().heartbeat(&request(), 1800);
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body_string().unwrap(), "OK");
    }

    #[test]
    fn test_heartbeat_backend_down() {
        let controller =
            StandardController::new().check_server(|_| Err(ActionError::backend("ldap down")));
        assert_eq!(controller.probe(&request()), HeartbeatStatus::Unavailable);

        let res = controller.heartbeat(&request(), 60);
        assert_eq!(res.status, HeartbeatStatus::Unavailable.status_code());
        assert_eq!(res.header("Retry-After"), Some("60"));
    }

    #[test]
    fn test_debug_page() {
        let controller =
            StandardController::new().debug_server(|_| vec!["storage: sql".to_string()]);
        let body = controller.debug(&request()).body_string().unwrap();

        assert!(body.contains("host: example.com"));
        assert!(body.contains("PATH_INFO: /__heartbeat__"));
        assert!(body.contains("storage: sql"));

        let environ = body.find("HTTP_HOST").unwrap();
        let path_info = body.find("PATH_INFO").unwrap();
        assert!(environ < path_info);
    }
}
