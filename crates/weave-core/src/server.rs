//! Native HTTP transport
//!
//! A thin hyper server around an [`App`]: requests are converted, run
//! through [`App::call`] on the blocking pool (actions are synchronous and may
//! block on their backends), and converted back.

use crate::config::Config;
use crate::{App, Error, Method, RequestBuilder, Response, Result, StatusCode};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    /// Read `server.host` and `server.port`
    pub fn from_config(config: &Config) -> Result<Self> {
        let defaults = Self::default();
        let port = match config.get_int("server.port") {
            Some(port) => u16::try_from(port)
                .map_err(|_| Error::Config(format!("Invalid server.port {}", port)))?,
            None => defaults.port,
        };

        Ok(Self {
            hostname: config
                .get_str("server.host")
                .map(str::to_string)
                .unwrap_or(defaults.hostname),
            port,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.hostname, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid listen address {}:{}: {}", self.hostname, self.port, e)))
    }
}

/// Active connection count, reported at shutdown
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    active: AtomicU64,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn decrement(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

/// Bind a listening socket with address reuse and `TCP_NODELAY`.
///
/// Must be called from within a tokio runtime.
pub fn bind_listener(addr: &SocketAddr) -> Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(1024)?;

    Ok(TcpListener::from_std(socket.into())?)
}

/// Convert a hyper request, collecting its body.
///
/// The path is percent-decoded before routing; the query string is left raw.
pub async fn from_hyper_request<B>(req: hyper::Request<B>) -> Result<crate::Request>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();
    let method: Method = parts.method.as_str().parse()?;

    let path = percent_encoding::percent_decode_str(parts.uri.path())
        .decode_utf8()
        .map_err(|_| Error::InvalidPath(format!("invalid UTF-8 in path {}", parts.uri.path())))?;

    let mut builder = RequestBuilder::new(method, path.into_owned());
    if let Some(query) = parts.uri.query() {
        builder = builder.query(query);
    }
    if let Some(host) = parts.uri.host() {
        builder = builder.host(host);
    }
    for (name, value) in &parts.headers {
        if let Ok(v) = value.to_str() {
            builder = builder.header(name.as_str(), v);
        }
    }

    let body = body
        .collect()
        .await
        .map_err(|e| Error::Internal(format!("reading request body: {}", e)))?
        .to_bytes();

    Ok(builder.body(body).build())
}

/// Convert our Response to hyper Response
pub fn to_hyper_response(res: Response) -> Result<http::Response<Full<Bytes>>> {
    let mut builder = http::Response::builder().status(res.status.as_u16());

    for (name, value) in &res.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
        .body(Full::new(res.body))
        .map_err(|e| Error::Internal(format!("building response: {}", e)))
}

fn internal_error() -> http::Response<Full<Bytes>> {
    let mut res = http::Response::new(Full::new(Bytes::new()));
    *res.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
    res
}

async fn handle<B>(app: Arc<App>, req: hyper::Request<B>) -> std::result::Result<http::Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let res = match from_hyper_request(req).await {
        Ok(request) => match tokio::task::spawn_blocking(move || app.call(request)).await {
            Ok(res) => res,
            Err(e) => {
                error!(error = %e, "dispatch task failed");
                Response::new(StatusCode::INTERNAL_SERVER_ERROR)
            }
        },
        Err(e) => {
            debug!(error = %e, "rejecting request");
            Response::bad_request(&e.to_string())
        }
    };

    Ok(to_hyper_response(res).unwrap_or_else(|e| {
        warn!(error = %e, "invalid response");
        internal_error()
    }))
}

/// Bind `config` and serve until `shutdown` resolves
pub async fn serve<F>(app: App, config: &ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let listener = bind_listener(&config.addr()?)?;
    serve_listener(app, listener, shutdown).await
}

/// Serve connections from `listener` until `shutdown` resolves.
///
/// Connections already accepted run to completion on their own tasks.
pub async fn serve_listener<F>(app: App, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let app = Arc::new(app);
    let tracker = Arc::new(ConnectionTracker::new());
    info!(addr = ?listener.local_addr().ok(), "listening");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };

                let _ = stream.set_nodelay(true);
                let app = Arc::clone(&app);
                let tracker = Arc::clone(&tracker);
                tracker.increment();

                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req: hyper::Request<Incoming>| handle(Arc::clone(&app), req));

                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        debug!(peer = %peer, error = %e, "connection error");
                    }
                    tracker.decrement();
                });
            }
            _ = &mut shutdown => {
                info!(active = tracker.count(), "shutting down");
                break;
            }
        }
    }

    Ok(())
}
