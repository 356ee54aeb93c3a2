//! Action dispatch shared by both transports
//!
//! Registered handlers run first. Names the registry does not know are
//! delegated to the player engine, bounded by the delegation timeout.

use playctl_common::{ActionInvocation, ServerFrame};
use serde_json::Value;
use tracing::{debug, warn};

use super::AppContext;
use crate::engine::{self, EngineError};
use crate::error::{Error, Result};

/// Run one invocation and return the success payload.
///
/// - registered, success → handler response (or a bare `ok` frame)
/// - registered, failure → [`Error::Malformed`]
/// - unregistered → exactly one engine delegation; success answers
///   `{type:"ok", action, data}`, any engine error or timeout
///   [`Error::ActionFailed`]
pub async fn run(ctx: &AppContext, invocation: &ActionInvocation) -> Result<Value> {
    if let Some(result) = ctx.registry.dispatch(invocation).await {
        if !result.success {
            return Err(Error::Malformed(invocation.action.clone()));
        }
        let body = match result.response {
            Some(response) => Value::Object(response),
            None => ServerFrame::ok(invocation.action.as_str(), Default::default()).to_value(),
        };
        return Ok(body);
    }

    debug!("Delegating {} to player engine", invocation.action);
    match engine::delegate(ctx.engine.as_ref(), invocation, ctx.delegation_timeout).await {
        Ok(data) => {
            ctx.sync_nudge.notify_one();
            Ok(ServerFrame::ok_with_data(invocation.action.as_str(), data).to_value())
        }
        Err(e) => {
            match &e {
                EngineError::Timeout(_) => {
                    warn!("Delegation of {} timed out: {}", invocation.action, e)
                }
                _ => debug!("Delegation of {} failed: {}", invocation.action, e),
            }
            Err(Error::ActionFailed(invocation.action.clone()))
        }
    }
}
