//! Transparent logging proxy for local IPC channels.
//!
//! ipcsniff sits between a client library and the process it talks to,
//! forwarding every framed message unchanged and logging it on the way.
//!
//! # Crate Structure
//!
//! - [`transport`]: channel binding (Unix domain sockets, named pipes) and cancellation
//! - [`frame`]: opcode + length framing
//! - [`peer`]: cancellable connections, dialer and listener
//! - [`proxy`]: bridge and server lifecycle

/// Re-export transport types.
pub mod transport {
    pub use ipcsniff_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ipcsniff_frame::*;
}

/// Re-export peer types.
pub mod peer {
    pub use ipcsniff_peer::*;
}

/// Re-export proxy types.
pub mod proxy {
    pub use ipcsniff_proxy::*;
}
