use ipcsniff_frame::FrameError;
use ipcsniff_transport::TransportError;

/// Errors that can occur on a connection, dialer or listener.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// Frame-level error other than the ones classified below.
    #[error("frame error: {0}")]
    Frame(FrameError),

    /// No data arrived within one poll interval. Not fatal; retry.
    #[error("no data within {0:?}")]
    Timeout(std::time::Duration),

    /// The connection (or listener) was closed, by the peer or locally.
    #[error("connection closed")]
    Closed,

    /// The peer declared or we attempted a frame above the size bound.
    /// The stream cannot be resynchronised; the connection must close.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The governing cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PeerError {
    /// True for errors that end a connection's useful life.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PeerError::Timeout(_))
    }

    /// True for the expected ways a relay loop ends: local cancellation or
    /// either side closing.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, PeerError::Cancelled | PeerError::Closed)
    }
}

impl From<TransportError> for PeerError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => PeerError::Cancelled,
            other => PeerError::Transport(other),
        }
    }
}

impl From<FrameError> for PeerError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::PayloadTooLarge { size, max } => PeerError::FrameTooLarge { size, max },
            FrameError::ConnectionClosed => PeerError::Closed,
            other => PeerError::Frame(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_errors_map_to_connection_taxonomy() {
        let too_large: PeerError = FrameError::PayloadTooLarge { size: 9, max: 4 }.into();
        assert!(matches!(too_large, PeerError::FrameTooLarge { size: 9, max: 4 }));

        let closed: PeerError = FrameError::ConnectionClosed.into();
        assert!(closed.is_shutdown());
    }

    #[test]
    fn cancelled_is_distinct_from_closed() {
        let cancelled: PeerError = TransportError::Cancelled.into();
        assert!(matches!(cancelled, PeerError::Cancelled));
        assert!(cancelled.is_shutdown());
        assert!(!matches!(cancelled, PeerError::Closed));
    }

    #[test]
    fn only_timeout_is_non_terminal() {
        assert!(!PeerError::Timeout(std::time::Duration::from_millis(100)).is_terminal());
        assert!(PeerError::Closed.is_terminal());
        assert!(PeerError::FrameTooLarge { size: 1, max: 0 }.is_terminal());
    }
}
