//! HTTP Status Responder
//!
//! ## Overview
//!
//! Operators look at the node with a browser. The page is a few hundred
//! bytes of HTML rebuilt by the sampler on every tick and published on a
//! `watch` channel; the responder only ever copies the latest version out.
//!
//! ## Implementation Choices
//!
//! We intentionally keep this simple:
//! - Any `GET`, any path, same page
//! - Every other method gets `405 Method Not Allowed`
//! - One request per connection, keep-alive is off
//!
//! Parsing, framing and malformed requests are left to `hyper`.
//!
//! ## Example Usage
//!
//! ```no_run
//! use telenode_connectors::http::{StatusConfig, StatusServer};
//! use tokio::sync::watch;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (page_tx, page) = watch::channel(String::from("<html></html>"));
//! let server = StatusServer::bind(StatusConfig::new("0.0.0.0:8080"), page).await?;
//! tokio::spawn(server.run());
//!
//! page_tx.send_replace(String::from("<html><body>22.3</body></html>"));
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::header::{self, HeaderValue};
use hyper::server::conn::AddrIncoming;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use log::{info, warn};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;

const CONTENT_TYPE: &str = "text/html;charset=utf-8";

/// HTTP-specific errors
#[derive(Debug, Error)]
pub enum HttpError {
    /// Socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server setup or serving failed
    #[error("Server error: {0}")]
    Server(#[from] hyper::Error),
}

/// Status responder configuration
#[derive(Debug, Clone)]
pub struct StatusConfig {
    /// Address to listen on
    pub bind: String,
}

impl StatusConfig {
    pub fn new(bind: impl Into<String>) -> Self {
        Self { bind: bind.into() }
    }
}

/// Serves the latest status page
pub struct StatusServer {
    incoming: AddrIncoming,
    local_addr: SocketAddr,
    page: watch::Receiver<String>,
}

impl StatusServer {
    pub async fn bind(config: StatusConfig, page: watch::Receiver<String>) -> Result<Self, HttpError> {
        let listener = TcpListener::bind(&config.bind).await?;
        let incoming = AddrIncoming::from_listener(listener)?;
        let local_addr = incoming.local_addr();
        Ok(Self {
            incoming,
            local_addr,
            page,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the listener fails
    pub async fn run(self) {
        info!("status page on http://{}", self.local_addr);

        let page = self.page;
        let make_service = make_service_fn(move |_conn| {
            let page = page.clone();
            async move { Ok::<_, Infallible>(service_fn(move |req| respond(req, page.clone()))) }
        });

        let server = Server::builder(self.incoming)
            .http1_keepalive(false)
            .serve(make_service);
        if let Err(e) = server.await {
            warn!("status server stopped: {}", e);
        }
    }
}

async fn respond(req: Request<Body>, page: watch::Receiver<String>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::GET {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("GET"));
        return Ok(response);
    }

    let body = page.borrow().clone();
    let mut response = Response::new(Body::from(body));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
    Ok(response)
}
