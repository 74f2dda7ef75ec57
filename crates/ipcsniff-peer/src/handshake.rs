use serde::{Deserialize, Serialize};

use crate::error::Result;

/// RPC version a client announces unless told otherwise.
pub const DEFAULT_RPC_VERSION: &str = "1";

/// Payload of the first frame a client sends, with opcode `HANDSHAKE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakePacket {
    /// RPC version.
    pub v: String,
    /// Application client identifier.
    pub client_id: String,
}

impl HandshakePacket {
    /// Handshake for `client_id` at [`DEFAULT_RPC_VERSION`].
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            v: DEFAULT_RPC_VERSION.to_string(),
            client_id: client_id.into(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}
