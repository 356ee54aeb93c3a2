//! Background loops
//!
//! - [`SyncLoop`]: pulls the engine's live state into the state store every
//!   poll interval (or immediately when nudged); only changed fields fan out.
//! - [`PortWatcher`]: restarts the server when the configured listen port
//!   differs from the port it runs on.
//!
//! Both run until their cancellation token fires.

use playctl_common::config::TomlConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::api::ControlServer;
use crate::config::PortSetting;
use crate::engine::{self, EngineError, PlayerEngine};
use crate::error::Result;
use crate::state::StateStore;

// ============================================================================
// State sync
// ============================================================================

/// Periodic engine → state store sync
pub struct SyncLoop {
    engine: Arc<dyn PlayerEngine>,
    store: Arc<StateStore>,
    nudge: Arc<Notify>,
    interval: Duration,
    timeout: Duration,
}

impl SyncLoop {
    /// Sync loop for `server`'s engine and store, reading at most every
    /// `interval`. A snapshot read is bounded by `timeout`.
    pub fn new(server: &ControlServer, interval: Duration, timeout: Duration) -> Self {
        Self {
            engine: Arc::clone(server.engine()),
            store: Arc::clone(server.store()),
            nudge: Arc::clone(server.sync_nudge()),
            interval,
            timeout,
        }
    }

    /// Read one snapshot and write it through the store. Returns how many
    /// fields changed.
    pub async fn poll_once(&self) -> std::result::Result<usize, EngineError> {
        let snapshot = engine::snapshot_with_timeout(self.engine.as_ref(), self.timeout).await?;
        Ok(self.store.set_fields(snapshot.into_fields()))
    }

    /// Poll until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut engine_ok = true;

        info!("State sync started (every {:?})", self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.nudge.notified() => trace!("State sync nudged"),
            }

            match self.poll_once().await {
                Ok(changed) => {
                    if !engine_ok {
                        info!("Player engine reachable again");
                        engine_ok = true;
                    }
                    if changed > 0 {
                        trace!("State sync updated {} fields", changed);
                    }
                }
                Err(e) => {
                    // Logged once per outage
                    if engine_ok {
                        warn!("Failed to read player state: {}", e);
                        engine_ok = false;
                    }
                }
            }
        }
        info!("State sync stopped");
    }
}

// ============================================================================
// Port watcher
// ============================================================================

/// Restarts the server when the configured port changes
pub struct PortWatcher {
    server: Arc<ControlServer>,
    setting: Arc<PortSetting>,
    interval: Duration,
    config_file: Option<PathBuf>,
    last_file_port: Mutex<Option<i64>>,
}

impl PortWatcher {
    pub fn new(server: Arc<ControlServer>, setting: Arc<PortSetting>, interval: Duration) -> Self {
        Self {
            server,
            setting,
            interval,
            config_file: None,
            last_file_port: Mutex::new(None),
        }
    }

    /// Re-read `path` on each check and feed its `port` into the setting.
    ///
    /// The file only counts when its `port` changes, so a port set at
    /// runtime is not overwritten by an unchanged file.
    pub fn with_config_file(mut self, path: PathBuf, current_port: i64) -> Self {
        self.config_file = Some(path);
        self.last_file_port = Mutex::new(Some(current_port));
        self
    }

    fn reload_file(&self) {
        let Some(path) = &self.config_file else {
            return;
        };
        if !path.exists() {
            return;
        }

        let toml = match TomlConfig::load(path) {
            Ok(toml) => toml,
            Err(e) => {
                debug!("Skipping config re-read: {}", e);
                return;
            }
        };

        let mut last = self
            .last_file_port
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *last != Some(toml.port) {
            *last = Some(toml.port);
            info!("Config file {:?} now sets port {}", path, toml.port);
            let _ = self.setting.set(toml.port);
        }
    }

    /// Compare the configured port with the running one and restart on
    /// mismatch (or start when not running). Returns the new address when a
    /// (re)start happened.
    pub async fn check_once(&self) -> Result<Option<SocketAddr>> {
        self.reload_file();
        let desired = self.setting.get();

        match self.server.port().await {
            Some(current) if current == desired => Ok(None),
            Some(current) => {
                info!("Listen port changed: {} -> {}, restarting server", current, desired);
                self.server.start(desired).await.map(Some)
            }
            None => {
                info!("Control server not running, starting on port {}", desired);
                self.server.start(desired).await.map(Some)
            }
        }
    }

    /// Check every interval, and immediately after each port change, until
    /// `shutdown` is cancelled. Failed restarts are retried on the next tick.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut changes = self.setting.subscribe();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
                Ok(()) = changes.changed() => {}
            }

            match self.check_once().await {
                Ok(Some(addr)) => info!("Control server now listening on {}", addr),
                Ok(None) => {}
                Err(e) => error!("Failed to restart control server: {}", e),
            }
        }
        debug!("Port watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ServerOptions;
    use crate::engine::LocalPlayer;
    use playctl_common::ActionInvocation;
    use serde_json::json;

    fn server() -> Arc<ControlServer> {
        Arc::new(ControlServer::new(
            Arc::new(LocalPlayer::spawn(vec!["a".into(), "b".into()])),
            ServerOptions::default(),
        ))
    }

    #[tokio::test]
    async fn test_poll_writes_snapshot_fields() {
        let server = server();
        let sync = SyncLoop::new(&server, Duration::from_millis(250), Duration::from_secs(1));

        let changed = sync.poll_once().await.unwrap();
        assert!(changed >= 6);
        let store = server.store();
        assert_eq!(store.get_field("playing"), Some(json!(false)));
        assert_eq!(store.get_field("volume"), Some(json!(100)));
        assert_eq!(store.get_field("playQueue"), Some(json!([{"id": "a"}, {"id": "b"}])));
        assert_eq!(store.get_field("track"), Some(json!({"id": "a"})));

        // Nothing moved while paused
        assert_eq!(sync.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_command_then_poll_updates_volume() {
        let server = server();
        let sync = SyncLoop::new(&server, Duration::from_millis(250), Duration::from_secs(1));
        sync.poll_once().await.unwrap();

        server
            .engine()
            .send_command(&ActionInvocation::new("volume").with_param("volume", 42));
        sync.poll_once().await.unwrap();
        assert_eq!(server.store().get_field("volume"), Some(json!(42)));
    }

    #[tokio::test]
    async fn test_nudge_triggers_poll() {
        let server = server();
        let sync = SyncLoop::new(&server, Duration::from_secs(3600), Duration::from_secs(1));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sync.run(shutdown.clone()));

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(50)).await;
        server
            .engine()
            .send_command(&ActionInvocation::new("setShuffleMode").with_param("shuffle", true));
        server.sync_nudge().notify_one();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(server.store().get_field("shuffle"), Some(json!(true)));
        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_port_watcher_restarts_on_change() {
        let server = server();
        let first = server.start(0).await.unwrap();

        let setting = Arc::new(PortSetting::new(first.port()));
        let watcher = PortWatcher::new(server.clone(), setting.clone(), Duration::from_secs(5));
        assert_eq!(watcher.check_once().await.unwrap(), None);

        // Pick a free port for the move
        let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = probe.local_addr().unwrap().port();
        drop(probe);

        setting.set(i64::from(target)).unwrap();
        let moved = watcher.check_once().await.unwrap().unwrap();
        assert_eq!(moved.port(), target);
        assert_eq!(server.port().await, Some(target));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_port_watcher_reads_config_file() {
        let server = server();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 24123\n").unwrap();

        let setting = Arc::new(PortSetting::new(24123));
        let watcher = PortWatcher::new(server.clone(), setting.clone(), Duration::from_secs(5))
            .with_config_file(path.clone(), 24123);

        std::fs::write(&path, "port = 0\n").unwrap();
        watcher.reload_file();
        assert_eq!(setting.get(), 24123);

        std::fs::write(&path, "port = 24200\n").unwrap();
        watcher.reload_file();
        assert_eq!(setting.get(), 24200);

        // Unchanged file does not undo a runtime change
        setting.set(24300).unwrap();
        watcher.reload_file();
        assert_eq!(setting.get(), 24300);
    }
}
