//! HTTP request handling
//!
//! - `OPTIONS` any path: 204, empty body
//! - `POST /<action>`: run the action with the JSON body as parameters
//! - anything else: full state snapshot
//!
//! WebSocket upgrade requests on any path are handed to [`super::ws`].

use axum::{
    body::Bytes,
    extract::{State, WebSocketUpgrade},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use playctl_common::{ActionInvocation, Fields};
use serde_json::Value;
use tracing::debug;

use super::{dispatch, ws, AppContext};
use crate::error::{Error, Result};

/// Fallback handler for every path and method
pub async fn handle_request(
    State(ctx): State<AppContext>,
    upgrade: Option<WebSocketUpgrade>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    if let Some(upgrade) = upgrade {
        return upgrade
            .on_upgrade(move |socket| ws::handle_socket(socket, ctx))
            .into_response();
    }

    match method {
        Method::OPTIONS => StatusCode::NO_CONTENT.into_response(),
        Method::POST => match post_action(&ctx, uri.path(), &body).await {
            Ok(value) => Json(value).into_response(),
            Err(e) => e.into_response(),
        },
        _ => Json(Value::Object(ctx.store.get_all())).into_response(),
    }
}

/// Action name from a request path: `/volume` → `volume`
fn action_from_path(path: &str) -> Result<&str> {
    let name = path.strip_prefix('/').unwrap_or(path);
    if name.is_empty() {
        Err(Error::NoAction)
    } else {
        Ok(name)
    }
}

/// Request body as a parameter object; an empty body is `{}`
fn parse_body(body: &[u8]) -> Result<Fields> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Fields::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(Error::InvalidBody(
            "Request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(Error::InvalidBody(e.to_string())),
    }
}

async fn post_action(ctx: &AppContext, path: &str, body: &[u8]) -> Result<Value> {
    let action = action_from_path(path)?;
    let params = parse_body(body)?;
    debug!("POST action {}", action);

    let invocation = ActionInvocation::from_parts(action, params);
    dispatch::run(ctx, &invocation).await
}
