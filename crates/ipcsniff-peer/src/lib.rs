//! Peer connections over local IPC channels.
//!
//! A [`Connection`] carries framed messages to exactly one peer and can be
//! cancelled or closed from any thread. [`Dialer`] and [`Listener`] produce
//! connections; [`HandshakePacket`] and [`EventPacket`] describe the
//! payloads seen on them.

pub mod conn;
pub mod connector;
pub mod error;
pub mod event;
pub mod handshake;
pub mod listener;

pub use conn::{
    CloseHandle, Connection, ConnectionConfig, ConnectionReader, ConnectionWriter,
    DEFAULT_POLL_INTERVAL,
};
pub use connector::{DialOptions, DialTarget, Dialer, PROBE_INSTANCE_IDS};
pub use error::{PeerError, Result};
pub use event::{EventHandler, EventPacket, NoopHandler, EVENT_ERROR, EVENT_READY};
pub use handshake::{HandshakePacket, DEFAULT_RPC_VERSION};
pub use listener::{channel_path, Listener, ListenerHandle};
