//! Proxy server lifecycle.
//!
//! [`Server::run`] binds the listening channel, accepts clients on the
//! calling thread and spawns one [`Bridge`] thread per client. When the
//! governing token fires the listener is closed, and the server waits for
//! live bridges up to the drain timeout. A bridge still running after that
//! is left to finish on its own.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use ipcsniff_peer::{Connection, Dialer, EventHandler, Listener, NoopHandler, PeerError};
use ipcsniff_transport::CancelToken;
use tracing::{debug, error, info, warn};

use crate::bridge::Bridge;
use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::tracker::BridgeTracker;

/// Where a [`Server`] is in its life. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Listening,
    Draining,
    Closed,
}

/// Accepts clients and bridges each one to the origin.
pub struct Server {
    config: ProxyConfig,
    handler: Arc<dyn EventHandler>,
    state: Mutex<ServerState>,
    next_conn_id: AtomicU64,
    tracker: BridgeTracker,
}

impl Server {
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_handler(config, Arc::new(NoopHandler))
    }

    /// Server that reports decoded events to `handler`.
    pub fn with_handler(config: ProxyConfig, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            config,
            handler,
            state: Mutex::new(ServerState::Created),
            next_conn_id: AtomicU64::new(1),
            tracker: BridgeTracker::new(),
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn state(&self) -> ServerState {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Path the listening channel binds to.
    pub fn local_path(&self) -> PathBuf {
        self.config
            .channel()
            .channel_path(self.config.listen_instance_id)
    }

    /// Number of bridges currently running.
    pub fn active_bridges(&self) -> usize {
        self.tracker.active()
    }

    /// Serve until `cancel` fires or accepting fails.
    ///
    /// Returns `Ok(())` after a clean drain, [`ProxyError::ListenFailed`] or
    /// [`ProxyError::AcceptFailed`] for listener failures and
    /// [`ProxyError::ShutdownTimeout`] when bridges outlive the drain bound.
    /// A server runs at most once.
    pub fn run(&self, cancel: &CancelToken) -> Result<()> {
        {
            let state = self.state();
            if state != ServerState::Created {
                return Err(ProxyError::InvalidState(state));
            }
        }

        let listen_id = self.config.listen_instance_id;
        let listener = match Listener::listen(
            listen_id,
            &self.config.channel(),
            self.config.connection(),
        ) {
            Ok(listener) => listener,
            Err(source) => {
                self.set_state(ServerState::Closed);
                return Err(ProxyError::ListenFailed {
                    instance_id: listen_id,
                    source,
                });
            }
        };
        self.set_state(ServerState::Listening);
        info!(
            path = %listener.path().display(),
            transport = listener.transport_name(),
            "listening"
        );
        info!("waiting for client connection");

        let run_scope = cancel.child_token();
        let watcher = {
            let scope = run_scope.clone();
            let handle = listener.handle();
            thread::Builder::new()
                .name("ipcsniff-watch".to_string())
                .spawn(move || {
                    scope.wait();
                    handle.close();
                })
                .map_err(ProxyError::Spawn)?
        };

        let dialer = Dialer::new(self.config.origin_dial_options());
        let accept_result = loop {
            match listener.accept() {
                Ok(client) => self.spawn_bridge(client, &dialer, &run_scope),
                Err(PeerError::Closed) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        if let Err(err) = &accept_result {
            error!(error = %err, "accept failed, stopping");
        }
        run_scope.cancel();
        self.set_state(ServerState::Draining);

        info!("closing listener");
        listener.close();
        drop(listener);
        if watcher.join().is_err() {
            warn!("listener watcher panicked");
        }

        let drained = self.tracker.wait_timeout(self.config.drain_timeout);
        self.set_state(ServerState::Closed);

        accept_result.map_err(ProxyError::AcceptFailed)?;
        if !drained {
            warn!(
                active = self.tracker.active(),
                timeout = ?self.config.drain_timeout,
                "bridges still running after drain timeout"
            );
            return Err(ProxyError::ShutdownTimeout(self.config.drain_timeout));
        }

        info!("listener is closed");
        Ok(())
    }

    fn spawn_bridge(&self, client: Connection, dialer: &Dialer, scope: &CancelToken) {
        let conn = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        match client.peer_credentials() {
            Some((uid, gid, pid)) => info!(conn, uid, gid, pid, "client connected"),
            None => info!(conn, "client connected"),
        }

        let bridge = Bridge::new(conn, dialer.clone(), Arc::clone(&self.handler));
        let guard = self.tracker.track();
        let scope = scope.clone();

        let spawned = thread::Builder::new()
            .name(format!("ipcsniff-bridge-{conn}"))
            .spawn(move || {
                let _guard = guard;
                match bridge.run(client, &scope) {
                    Ok(()) => debug!(conn, "bridge finished"),
                    // Already logged by the bridge; it ends only this client.
                    Err(err) => debug!(conn, error = %err, "bridge ended with error"),
                }
                info!(conn, "client disconnected");
            });

        if let Err(err) = spawned {
            error!(conn, error = %err, "failed to spawn bridge thread");
        }
    }

    fn set_state(&self, next: ServerState) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let prev = *state;
        *state = next;
        debug!(from = ?prev, to = ?next, "server state");
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("active_bridges", &self.active_bridges())
            .finish()
    }
}
