use std::path::PathBuf;

use ipcsniff_transport::{CancelToken, ChannelConfig};
use tracing::debug;

use crate::conn::{Connection, ConnectionConfig};
use crate::error::{PeerError, Result};

/// Instance ids tried, in order, when probing for a peer.
pub const PROBE_INSTANCE_IDS: [u32; 3] = [0, 1, 2];

/// Which channel a dial targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialTarget {
    /// Exactly this instance id.
    Fixed(u32),
    /// The first of [`PROBE_INSTANCE_IDS`] that accepts.
    Probe,
}

/// Options for [`Dialer`].
#[derive(Debug, Clone)]
pub struct DialOptions {
    pub target: DialTarget,
    pub channel: ChannelConfig,
    pub connection: ConnectionConfig,
}

impl DialOptions {
    /// Dial exactly `instance_id`.
    pub fn fixed(instance_id: u32) -> Self {
        Self {
            target: DialTarget::Fixed(instance_id),
            channel: ChannelConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }

    /// Probe the well-known instance ids in order.
    pub fn probe() -> Self {
        Self {
            target: DialTarget::Probe,
            ..Self::fixed(0)
        }
    }

    /// Override the socket directory (Unix only).
    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.channel.runtime_dir = Some(dir.into());
        self
    }

    pub fn with_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }
}

/// Opens outbound connections.
#[derive(Debug, Clone)]
pub struct Dialer {
    options: DialOptions,
}

impl Dialer {
    pub fn new(options: DialOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DialOptions {
        &self.options
    }

    /// Dial the configured target.
    ///
    /// `cancel` bounds the dial attempts only. In probe mode the first
    /// instance that accepts wins and later ids are never tried; if none
    /// accepts, the error from the last attempt is returned.
    pub fn dial(&self, cancel: &CancelToken) -> Result<Connection> {
        self.dial_observed(cancel, |_, _| {})
    }

    /// Like [`Dialer::dial`], reporting every attempt to `observe`.
    ///
    /// Callers that need per-attempt diagnostics in probe mode collect them
    /// here; `dial` itself only keeps the last error.
    pub fn dial_observed<F>(&self, cancel: &CancelToken, mut observe: F) -> Result<Connection>
    where
        F: FnMut(u32, std::result::Result<(), &PeerError>),
    {
        let ids: &[u32] = match &self.options.target {
            DialTarget::Fixed(id) => std::slice::from_ref(id),
            DialTarget::Probe => &PROBE_INSTANCE_IDS,
        };

        let mut last_err = PeerError::Closed;
        for &instance_id in ids {
            match self.dial_instance(cancel, instance_id) {
                Ok(conn) => {
                    observe(instance_id, Ok(()));
                    return Ok(conn);
                }
                Err(err) => {
                    debug!(instance_id, error = %err, "dial attempt failed");
                    observe(instance_id, Err(&err));
                    if matches!(err, PeerError::Cancelled) {
                        return Err(err);
                    }
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    fn dial_instance(&self, cancel: &CancelToken, instance_id: u32) -> Result<Connection> {
        let stream = ipcsniff_transport::connect(cancel, instance_id, &self.options.channel)?;
        let conn = Connection::from_stream(stream, instance_id, &self.options.connection)?;
        debug!(
            instance_id,
            path = ?self.options.channel.channel_path(instance_id),
            "connected"
        );
        Ok(conn)
    }
}
