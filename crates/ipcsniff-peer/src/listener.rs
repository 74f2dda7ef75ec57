use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ipcsniff_transport::{ChannelConfig, ChannelListener, IpcStream};
use tracing::{debug, warn};

use crate::conn::{Connection, ConnectionConfig};
use crate::error::{PeerError, Result};

/// Listens for and accepts peer connections on one channel.
pub struct Listener {
    channel: ChannelListener,
    config: ConnectionConfig,
    closed: Arc<AtomicBool>,
}

impl Listener {
    /// Bind the channel for `instance_id`.
    pub fn listen(
        instance_id: u32,
        channel: &ChannelConfig,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let channel = ipcsniff_transport::listen(instance_id, channel)?;
        Ok(Self {
            channel,
            config,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Block until a peer connects.
    ///
    /// Returns `Err(PeerError::Closed)` once [`Listener::close`] (or a
    /// [`ListenerHandle`]) has been called, within one poll interval. A peer
    /// whose connection cannot be set up is dropped and accepting continues.
    pub fn accept(&self) -> Result<Connection> {
        self.accept_with(Connection::from_stream)
    }

    fn accept_with<F>(&self, mut setup: F) -> Result<Connection>
    where
        F: FnMut(IpcStream, u32, &ConnectionConfig) -> Result<Connection>,
    {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(PeerError::Closed);
            }
            let Some(stream) = self.channel.accept_timeout(self.config.poll_interval)? else {
                continue;
            };
            if self.closed.load(Ordering::SeqCst) {
                let _ = stream.shutdown();
                return Err(PeerError::Closed);
            }
            // The stream is dropped, and the peer disconnected, when setup fails.
            match setup(stream, self.instance_id(), &self.config) {
                Ok(conn) => {
                    debug!(instance_id = self.instance_id(), "accepted peer");
                    return Ok(conn);
                }
                Err(err) => {
                    warn!(instance_id = self.instance_id(), error = %err, "dropping peer after failed setup");
                }
            }
        }
    }

    /// Stop accepting. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Handle that can close this listener from another thread.
    pub fn handle(&self) -> ListenerHandle {
        ListenerHandle {
            closed: Arc::clone(&self.closed),
        }
    }

    pub fn instance_id(&self) -> u32 {
        self.channel.name().instance_id()
    }

    /// Bound channel path.
    pub fn path(&self) -> &Path {
        self.channel.path()
    }

    pub fn transport_name(&self) -> &'static str {
        self.channel.transport_name()
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("channel", &self.channel)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Cloneable closer for a [`Listener`].
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    closed: Arc<AtomicBool>,
}

impl ListenerHandle {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Path the channel for `instance_id` would bind to under `channel`.
pub fn channel_path(instance_id: u32, channel: &ChannelConfig) -> PathBuf {
    channel.channel_path(instance_id)
}
