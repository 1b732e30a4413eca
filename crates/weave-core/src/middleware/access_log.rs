//! Access log middleware
//!
//! One structured line per request, emitted once the response is known.

use super::Middleware;
use crate::{Request, Response};

/// Logs method, path, status and elapsed time of every request
#[derive(Debug, Clone, Default)]
pub struct AccessLog {
    /// Also log the query string
    pub log_query: bool,
}

impl AccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_query(mut self) -> Self {
        self.log_query = true;
        self
    }
}

impl Middleware for AccessLog {
    fn before(&self, _req: &mut Request) -> Option<Response> {
        None
    }

    fn after(&self, req: &Request, res: &mut Response) {
        let elapsed = req.received_at.elapsed();
        let query = if self.log_query {
            req.query.as_deref().unwrap_or("")
        } else {
            ""
        };

        tracing::info!(
            method = %req.method,
            path = %req.path,
            query = %query,
            host = %req.host(),
            status = res.status.as_u16(),
            bytes = res.body.len(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "request"
        );
    }
}
