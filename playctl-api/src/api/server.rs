//! Restartable control server
//!
//! [`ControlServer`] owns the action registry, state store and subscription
//! table for its whole lifetime. Only the listener is tied to a start/stop
//! cycle: `stop` closes every WebSocket, stops accepting and releases the
//! port; `start` while running performs a full stop first.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{build_router, AppContext};
use crate::actions::{ActionRegistry, Registration};
use crate::engine::PlayerEngine;
use crate::error::{Error, Result};
use crate::state::StateStore;
use crate::subscriptions::SubscriptionManager;
use playctl_common::config::DEFAULT_DELEGATION_TIMEOUT_MS;
use playctl_common::{ActionInvocation, ActionResult};

/// Upper bound for draining in-flight HTTP requests on stop
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener-independent server settings
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Interface to bind
    pub host: IpAddr,
    /// Upper bound for one engine delegation
    pub delegation_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            delegation_timeout: Duration::from_millis(DEFAULT_DELEGATION_TIMEOUT_MS),
        }
    }
}

struct RunningServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Control-plane server instance
///
/// **Note:** No global state; several instances can coexist in one process
/// (each on its own port).
pub struct ControlServer {
    registry: Arc<ActionRegistry>,
    store: Arc<StateStore>,
    subscriptions: Arc<SubscriptionManager>,
    engine: Arc<dyn PlayerEngine>,
    sync_nudge: Arc<Notify>,
    options: ServerOptions,
    running: Mutex<Option<RunningServer>>,
}

impl ControlServer {
    /// Create a stopped server with the built-in actions registered
    pub fn new(engine: Arc<dyn PlayerEngine>, options: ServerOptions) -> Self {
        let sync_nudge = Arc::new(Notify::new());
        let subscriptions = Arc::new(SubscriptionManager::new());
        Self {
            registry: ActionRegistry::with_builtins(Arc::clone(&engine), Arc::clone(&sync_nudge)),
            store: Arc::new(StateStore::new(Arc::clone(&subscriptions))),
            subscriptions,
            engine,
            sync_nudge,
            options,
            running: Mutex::new(None),
        }
    }

    /// Bind `port` and start serving. Port 0 binds an ephemeral port.
    ///
    /// Returns the bound address. On bind failure the server is left not
    /// running.
    pub async fn start(&self, port: u16) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            self.shutdown_listener(previous).await;
        }

        let listener = TcpListener::bind(SocketAddr::new(self.options.host, port))
            .await
            .map_err(|source| Error::Bind { port, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| Error::Bind { port, source })?;

        let shutdown = CancellationToken::new();
        let router = build_router(self.context(shutdown.clone()));

        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("Server on {} failed: {}", addr, e);
            }
        });

        info!("Control server listening on {}", addr);
        *running = Some(RunningServer {
            addr,
            shutdown,
            task,
        });
        Ok(addr)
    }

    /// Stop serving and release the port. No-op when not running.
    pub async fn stop(&self) {
        if let Some(previous) = self.running.lock().await.take() {
            self.shutdown_listener(previous).await;
        }
    }

    async fn shutdown_listener(&self, mut server: RunningServer) {
        info!("Stopping control server on {}", server.addr);
        server.shutdown.cancel();
        self.subscriptions.close_all();

        if tokio::time::timeout(STOP_TIMEOUT, &mut server.task)
            .await
            .is_err()
        {
            warn!(
                "Control server on {} did not drain within {:?}, aborting",
                server.addr, STOP_TIMEOUT
            );
            server.task.abort();
            let _ = server.task.await;
        }
        info!("Control server on {} stopped", server.addr);
    }

    fn context(&self, shutdown: CancellationToken) -> AppContext {
        AppContext {
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            subscriptions: Arc::clone(&self.subscriptions),
            engine: Arc::clone(&self.engine),
            delegation_timeout: self.options.delegation_timeout,
            sync_nudge: Arc::clone(&self.sync_nudge),
            shutdown,
        }
    }

    /// Bound address of the current listener
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|server| server.addr)
    }

    /// Port of the current listener
    pub async fn port(&self) -> Option<u16> {
        self.local_addr().await.map(|addr| addr.port())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Register an action handler on this server's registry
    pub fn register_action<F, Fut>(&self, name: impl Into<String>, handler: F) -> Registration
    where
        F: Fn(ActionInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        self.registry.register(name, handler)
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    pub fn engine(&self) -> &Arc<dyn PlayerEngine> {
        &self.engine
    }

    /// Notifier the sync loop waits on between ticks
    pub fn sync_nudge(&self) -> &Arc<Notify> {
        &self.sync_nudge
    }

    /// Handler context bound to no listener, for driving the transport
    /// handlers directly
    pub fn detached_context(&self) -> AppContext {
        self.context(CancellationToken::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LocalPlayer;
    use serde_json::json;

    #[tokio::test]
    async fn test_start_stop_ephemeral() {
        let server = ControlServer::new(Arc::new(LocalPlayer::spawn(vec![])), ServerOptions::default());
        assert!(!server.is_running().await);

        let addr = server.start(0).await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr().await, Some(addr));

        server.stop().await;
        assert!(!server.is_running().await);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let server = ControlServer::new(Arc::new(LocalPlayer::spawn(vec![])), ServerOptions::default());
        server.start(0).await.unwrap();
        server.store().set_field("volume", json!(30));

        server.start(0).await.unwrap();
        assert_eq!(server.store().get_field("volume"), Some(json!(30)));
        assert!(server.registry().contains("volume"));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_not_running() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let server = ControlServer::new(Arc::new(LocalPlayer::spawn(vec![])), ServerOptions::default());
        let result = server.start(port).await;
        assert!(matches!(result, Err(Error::Bind { port: p, .. }) if p == port));
        assert!(!server.is_running().await);
    }
}
