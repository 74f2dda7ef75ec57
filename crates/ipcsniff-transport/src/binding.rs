//! Platform channel binding.
//!
//! [`listen`] and [`connect`] open the channel named by an instance id. On
//! Unix the channel is a filesystem socket, on Windows a named pipe; callers
//! above this module only ever see [`ChannelListener`] and [`IpcStream`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::naming::ChannelName;
use crate::traits::IpcStream;

/// Default size of the named pipe buffers, matching the default frame bound.
pub const DEFAULT_PIPE_BUFFER_SIZE: u32 = 64 * 1024;

/// Where and how channels are opened.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Socket directory override (Unix only). `None` resolves it from the environment.
    pub runtime_dir: Option<PathBuf>,
    /// In/out buffer size for created named pipes (Windows only).
    pub pipe_buffer_size: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            runtime_dir: None,
            pipe_buffer_size: DEFAULT_PIPE_BUFFER_SIZE,
        }
    }
}

impl ChannelConfig {
    /// Platform path of the channel for `instance_id`.
    pub fn channel_path(&self, instance_id: u32) -> PathBuf {
        ChannelName::new(instance_id).display_path(self.runtime_dir.as_deref())
    }
}

/// A bound channel accepting peers.
pub struct ChannelListener {
    name: ChannelName,
    inner: ListenerInner,
}

enum ListenerInner {
    #[cfg(unix)]
    Unix(crate::uds::UnixDomainSocket),
    #[cfg(windows)]
    Pipe(crate::pipe::NamedPipeListener),
}

impl ChannelListener {
    /// Wait up to `timeout` for a peer; `Ok(None)` means none arrived.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<IpcStream>> {
        match &self.inner {
            #[cfg(unix)]
            ListenerInner::Unix(socket) => socket.accept_timeout(timeout),
            #[cfg(windows)]
            ListenerInner::Pipe(pipe) => pipe.accept_timeout(timeout),
        }
    }

    pub fn name(&self) -> ChannelName {
        self.name
    }

    /// Platform path the listener is bound to.
    pub fn path(&self) -> &Path {
        match &self.inner {
            #[cfg(unix)]
            ListenerInner::Unix(socket) => socket.path(),
            #[cfg(windows)]
            ListenerInner::Pipe(pipe) => Path::new(pipe.path()),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            ListenerInner::Unix(socket) => socket.transport_name(),
            #[cfg(windows)]
            ListenerInner::Pipe(pipe) => pipe.transport_name(),
        }
    }
}

impl std::fmt::Debug for ChannelListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelListener")
            .field("name", &self.name)
            .field("path", &self.path())
            .finish()
    }
}

/// Bind the channel for `instance_id` in listen mode.
pub fn listen(instance_id: u32, config: &ChannelConfig) -> Result<ChannelListener> {
    let name = ChannelName::new(instance_id);

    #[cfg(unix)]
    let inner = ListenerInner::Unix(crate::uds::UnixDomainSocket::bind(
        name.socket_path(config.runtime_dir.as_deref()),
    )?);
    #[cfg(windows)]
    let inner = ListenerInner::Pipe(crate::pipe::NamedPipeListener::bind(
        &name.pipe_path(),
        config.pipe_buffer_size,
    )?);

    Ok(ChannelListener { name, inner })
}

/// Dial the channel for `instance_id`.
///
/// `cancel` bounds the dial attempt only; reads and writes on the returned
/// stream are not affected by it.
pub fn connect(cancel: &CancelToken, instance_id: u32, config: &ChannelConfig) -> Result<IpcStream> {
    let name = ChannelName::new(instance_id);
    debug!(channel = %name, "dialing channel");

    #[cfg(unix)]
    {
        crate::uds::UnixDomainSocket::connect_cancellable(
            name.socket_path(config.runtime_dir.as_deref()),
            cancel,
        )
    }
    #[cfg(windows)]
    {
        let _ = config;
        crate::pipe::connect(&name.pipe_path(), cancel)
    }
}
