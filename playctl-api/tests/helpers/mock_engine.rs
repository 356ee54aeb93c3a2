//! Scripted player engine

use async_trait::async_trait;
use playctl_api::engine::{EngineError, PlayerEngine, PlayerSnapshot};
use playctl_common::ActionInvocation;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Engine whose answers are configured per action
///
/// Unknown actions answer `NotFound`; stalled actions never answer. Every
/// call is counted.
#[derive(Default)]
pub struct MockEngine {
    responses: Mutex<HashMap<String, Value>>,
    stalled: Mutex<HashSet<String>>,
    commands: Mutex<Vec<ActionInvocation>>,
    invocations: AtomicUsize,
    snapshot: Mutex<PlayerSnapshot>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `action` with `data`
    pub fn respond(&self, action: &str, data: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(action.to_string(), data);
    }

    /// Make `invoke` for `action` hang forever
    pub fn stall(&self, action: &str) {
        self.stalled.lock().unwrap().insert(action.to_string());
    }

    /// Replace the state returned by `snapshot()`
    pub fn set_snapshot(&self, snapshot: PlayerSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn set_volume(&self, volume: f64) {
        self.snapshot.lock().unwrap().volume = Some(volume);
    }

    /// Number of `invoke` calls so far
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Commands received through `send_command`
    pub fn commands(&self) -> Vec<ActionInvocation> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlayerEngine for MockEngine {
    fn send_command(&self, command: &ActionInvocation) {
        self.commands.lock().unwrap().push(command.clone());
    }

    async fn invoke(&self, invocation: &ActionInvocation) -> Result<Value, EngineError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let stalled = self.stalled.lock().unwrap().contains(&invocation.action);
        if stalled {
            std::future::pending::<()>().await;
        }
        self.responses
            .lock()
            .unwrap()
            .get(&invocation.action)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(invocation.action.clone()))
    }

    async fn snapshot(&self) -> Result<PlayerSnapshot, EngineError> {
        Ok(self.snapshot.lock().unwrap().clone())
    }
}
