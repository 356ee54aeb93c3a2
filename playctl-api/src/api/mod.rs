//! HTTP and WebSocket transport
//!
//! One listener serves both transports. Every request falls through to a
//! single handler: WebSocket upgrades go to [`ws`], everything else to
//! [`http`]. Both route actions through [`dispatch`].

pub mod dispatch;
pub mod http;
pub mod server;
pub mod ws;

use axum::http::{header, HeaderValue};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::actions::ActionRegistry;
use crate::engine::PlayerEngine;
use crate::state::StateStore;
use crate::subscriptions::SubscriptionManager;

pub use server::{ControlServer, ServerOptions};

/// Shared application context passed to all handlers
///
/// **Note:** Cheap to clone; every member is shared. One context exists per
/// listener generation, but registry, store and subscriptions are owned by
/// the [`ControlServer`] and outlive restarts.
#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<ActionRegistry>,
    pub store: Arc<StateStore>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub engine: Arc<dyn PlayerEngine>,
    /// Upper bound for one engine delegation
    pub delegation_timeout: Duration,
    /// Wakes the sync loop after a command reached the engine
    pub sync_nudge: Arc<Notify>,
    /// Cancelled when this listener generation stops
    pub shutdown: CancellationToken,
}

/// Build the router for one listener generation
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .fallback(http::handle_request)
        .with_state(ctx)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(TraceLayer::new_for_http())
}
