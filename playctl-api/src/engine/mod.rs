//! Player engine delegation interface
//!
//! The media engine (player state, queue, decoding) is an external
//! collaborator. The control plane only reaches it through [`PlayerEngine`]:
//!
//! - **Commands** (`send_command`): validated built-in actions, fire-and-forget
//! - **Invocations** (`invoke`): actions the registry does not know about
//! - **Snapshots** (`snapshot`): live state read by the sync loop
//!
//! Invocations and snapshots are always wrapped in a timeout by the caller
//! (see [`delegate`]); an engine that never answers surfaces as a failed
//! action, not a hung connection.

pub mod local;

use async_trait::async_trait;
use playctl_common::protocol::json_number;
use playctl_common::{ActionInvocation, Fields};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub use local::LocalPlayer;

/// Errors reported across the engine boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Engine has no handler for this action
    #[error("Action not found: {0}")]
    NotFound(String),

    /// Engine did not answer in time
    #[error("Engine did not respond within {0:?}")]
    Timeout(Duration),

    /// Engine is gone (task ended, channel closed)
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// Engine ran the action and it failed
    #[error("Action failed: {0}")]
    Failed(String),
}

/// Point-in-time view of the player, as read by the sync loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerSnapshot {
    pub playing: bool,
    /// Seconds into the current item
    pub play_time: f64,
    pub repeat_mode: i64,
    pub shuffle: bool,
    /// Active queue as the engine reports it
    pub play_queue: Value,
    /// 0-100
    pub volume: Option<f64>,
    pub current_time: Option<f64>,
    /// Epoch milliseconds of the last play start
    pub last_play_start: Option<f64>,
    /// Metadata of the current item (`track`, `album`, `artist`, `coverUrl`,
    /// `isrc`, `duration`, `bestQuality`)
    pub media: Option<Fields>,
}

impl PlayerSnapshot {
    /// Flatten into state-store field names.
    ///
    /// Optional values are only present when known and finite.
    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("playing".into(), Value::Bool(self.playing));
        fields.insert("playTime".into(), json_number(self.play_time));
        fields.insert("repeatMode".into(), Value::from(self.repeat_mode));
        fields.insert("playQueue".into(), self.play_queue);
        fields.insert("shuffle".into(), Value::Bool(self.shuffle));

        let optional = [
            ("currentTime", self.current_time),
            ("lastPlayStart", self.last_play_start),
            ("volume", self.volume),
        ];
        for (name, value) in optional {
            if let Some(v) = value.filter(|v| v.is_finite()) {
                fields.insert(name.into(), json_number(v));
            }
        }

        if let Some(media) = self.media {
            fields.extend(media);
        }
        fields
    }
}

/// Narrow interface to the embedded player engine
#[async_trait]
pub trait PlayerEngine: Send + Sync + 'static {
    /// Forward a validated command (`{action, <param>: value}`).
    /// Delivery is best-effort; the engine confirms through later snapshots.
    fn send_command(&self, command: &ActionInvocation);

    /// Run an action the control plane does not handle itself
    async fn invoke(&self, invocation: &ActionInvocation) -> Result<Value, EngineError>;

    /// Read the live player state
    async fn snapshot(&self) -> Result<PlayerSnapshot, EngineError>;
}

/// Invoke `invocation` on the engine, bounded by `timeout`
pub async fn delegate(
    engine: &dyn PlayerEngine,
    invocation: &ActionInvocation,
    timeout: Duration,
) -> Result<Value, EngineError> {
    match tokio::time::timeout(timeout, engine.invoke(invocation)).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout(timeout)),
    }
}

/// Read a snapshot from the engine, bounded by `timeout`
pub async fn snapshot_with_timeout(
    engine: &dyn PlayerEngine,
    timeout: Duration,
) -> Result<PlayerSnapshot, EngineError> {
    match tokio::time::timeout(timeout, engine.snapshot()).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StalledEngine;

    #[async_trait]
    impl PlayerEngine for StalledEngine {
        fn send_command(&self, _command: &ActionInvocation) {}

        async fn invoke(&self, _invocation: &ActionInvocation) -> Result<Value, EngineError> {
            std::future::pending().await
        }

        async fn snapshot(&self) -> Result<PlayerSnapshot, EngineError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_delegate_times_out() {
        let engine = StalledEngine;
        let result = delegate(
            &engine,
            &ActionInvocation::new("next"),
            Duration::from_millis(20),
        )
        .await;
        assert_eq!(result, Err(EngineError::Timeout(Duration::from_millis(20))));

        let snap = snapshot_with_timeout(&engine, Duration::from_millis(20)).await;
        assert!(matches!(snap, Err(EngineError::Timeout(_))));
    }

    #[test]
    fn test_snapshot_fields() {
        let mut media = Fields::new();
        media.insert("isrc".into(), json!("USUM71703861"));

        let snapshot = PlayerSnapshot {
            playing: true,
            play_time: 12.0,
            repeat_mode: 1,
            shuffle: false,
            play_queue: json!([]),
            volume: Some(42.0),
            current_time: Some(f64::NAN),
            last_play_start: None,
            media: Some(media),
        };

        let fields = Value::Object(snapshot.into_fields());
        assert_eq!(
            fields,
            json!({
                "playing": true,
                "playTime": 12,
                "repeatMode": 1,
                "playQueue": [],
                "shuffle": false,
                "volume": 42,
                "isrc": "USUM71703861",
            })
        );
    }
}
