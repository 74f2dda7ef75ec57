//! Logging relay between an IPC client and its origin process.
//!
//! The proxy listens on one instance id and, for every client that connects,
//! dials the origin instance and forwards frames both ways unchanged while
//! logging each one.

pub mod bridge;
pub mod config;
pub mod error;
pub mod server;
pub mod tracker;

pub use bridge::Bridge;
pub use config::{ProxyConfig, DEFAULT_DRAIN_TIMEOUT};
pub use error::{Direction, ProxyError, Result};
pub use server::{Server, ServerState};
pub use tracker::{BridgeGuard, BridgeTracker};
