//! Test server wrapper for integration tests
//!
//! Holds a [`ControlServer`] backed by a [`MockEngine`]. Requests can go
//! through an in-process router (`request`) or a real listener (`start`).

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot`

use playctl_api::api::build_router;
use playctl_api::{ControlServer, ServerOptions};

use super::MockEngine;

/// Control server instance with a scripted engine
pub struct TestServer {
    pub server: Arc<ControlServer>,
    pub engine: Arc<MockEngine>,
    router: Router,
}

impl TestServer {
    pub fn new() -> Self {
        let engine = Arc::new(MockEngine::new());
        let options = ServerOptions {
            delegation_timeout: Duration::from_millis(500),
            ..ServerOptions::default()
        };
        let server = Arc::new(ControlServer::new(engine.clone(), options));
        let router = build_router(server.detached_context());
        Self {
            server,
            engine,
            router,
        }
    }

    /// Send one request through the router. Returns status, headers and the
    /// body parsed as JSON (`None` when empty).
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&str>,
    ) -> (StatusCode, HeaderMap, Option<Value>) {
        let mut builder = Request::builder().method(method).uri(path);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&bytes).unwrap())
        };
        (status, headers, json)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Option<Value>) {
        let (status, _, body) = self.request(Method::GET, path, None).await;
        (status, body)
    }

    pub async fn post(&self, path: &str, body: &str) -> (StatusCode, Option<Value>) {
        let (status, _, body) = self.request(Method::POST, path, Some(body)).await;
        (status, body)
    }
}

/// A port that was free a moment ago
pub async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
