use std::fmt;
use std::time::Duration;

use ipcsniff_peer::PeerError;

use crate::server::ServerState;

/// Relay direction within a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to origin.
    Send,
    /// Origin to client.
    Receive,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Send => "send",
            Direction::Receive => "receive",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from a bridge or the proxy server.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The listening channel could not be bound.
    #[error("failed to listen on instance {instance_id}: {source}")]
    ListenFailed {
        instance_id: u32,
        #[source]
        source: PeerError,
    },

    /// Accepting a client failed; the server stops.
    #[error("listener error: {0}")]
    AcceptFailed(#[source] PeerError),

    /// The origin could not be dialed for one bridge.
    #[error("failed to open connection to origin instance {instance_id}: {source}")]
    DialFailed {
        instance_id: u32,
        #[source]
        source: PeerError,
    },

    /// One relay direction failed for a reason other than shutdown.
    #[error("{direction} relay failed: {source}")]
    Relay {
        direction: Direction,
        #[source]
        source: PeerError,
    },

    /// Bridges were still running when the drain bound elapsed.
    #[error("bridges still running after {0:?}")]
    ShutdownTimeout(Duration),

    /// `run` was called on a server that already ran.
    #[error("server cannot start from state {0:?}")]
    InvalidState(ServerState),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
