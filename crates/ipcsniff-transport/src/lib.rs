//! Local IPC channel binding.
//!
//! Opens the channel selected by a numeric instance id, either as a listener
//! or as an outbound connection:
//! - Unix domain sockets (Linux/macOS)
//! - Named pipes (Windows)
//!
//! This is the lowest layer of ipcsniff and the only one that differs by
//! platform. Everything else builds on the [`IpcStream`] and
//! [`ChannelListener`] types provided here.

pub mod binding;
pub mod cancel;
pub mod error;
pub mod naming;
pub mod traits;

#[cfg(windows)]
pub mod pipe;
#[cfg(unix)]
pub mod uds;

pub use binding::{connect, listen, ChannelConfig, ChannelListener, DEFAULT_PIPE_BUFFER_SIZE};
pub use cancel::CancelToken;
pub use error::{is_timeout_kind, Result, TransportError};
pub use naming::{ChannelName, CHANNEL_PREFIX};
pub use traits::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
