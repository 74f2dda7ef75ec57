use std::path::PathBuf;
use std::time::Duration;

use ipcsniff_peer::{ConnectionConfig, DialOptions, DEFAULT_POLL_INTERVAL};
use ipcsniff_transport::ChannelConfig;

/// Longest a stopping server waits for in-flight bridges.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Startup parameters for a proxy [`Server`](crate::Server).
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Instance id the proxy listens on.
    pub listen_instance_id: u32,
    /// Instance id of the origin process every bridge dials.
    pub origin_instance_id: u32,
    /// Socket directory override (Unix only).
    pub runtime_dir: Option<PathBuf>,
    pub poll_interval: Duration,
    pub drain_timeout: Duration,
    pub max_message_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_instance_id: 0,
            origin_instance_id: 1,
            runtime_dir: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            max_message_size: ipcsniff_frame::DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl ProxyConfig {
    pub fn channel(&self) -> ChannelConfig {
        ChannelConfig {
            runtime_dir: self.runtime_dir.clone(),
            pipe_buffer_size: u32::try_from(self.max_message_size).unwrap_or(u32::MAX),
        }
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            poll_interval: self.poll_interval,
            max_message_size: self.max_message_size,
        }
    }

    /// Dial options for the origin side of every bridge.
    pub fn origin_dial_options(&self) -> DialOptions {
        DialOptions {
            channel: self.channel(),
            ..DialOptions::fixed(self.origin_instance_id)
        }
        .with_connection_config(self.connection())
    }
}
