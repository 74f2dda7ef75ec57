use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Event type: the server is ready to take commands.
pub const EVENT_READY: &str = "READY";
/// Event type: the server reports a failure.
pub const EVENT_ERROR: &str = "ERROR";

/// Payload of a data frame.
///
/// Every field is optional; commands carry `cmd`/`args`/`nonce`, events carry
/// `evt`/`data`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventPacket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl EventPacket {
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Event type, when present and non-empty.
    pub fn event_type(&self) -> Option<&str> {
        self.evt.as_deref().filter(|evt| !evt.is_empty())
    }

    /// `data` re-serialized as raw JSON; empty when absent.
    pub fn raw_data(&self) -> Result<Vec<u8>> {
        match &self.data {
            Some(data) => Ok(serde_json::to_vec(data)?),
            None => Ok(Vec::new()),
        }
    }
}

/// Observer for events seen on a relayed connection.
///
/// Called from relay threads, so implementations must be cheap and must not
/// block forwarding.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event_type: &str, data: &[u8]);
}

/// Handler that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl EventHandler for NoopHandler {
    fn on_event(&self, _event_type: &str, _data: &[u8]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ready_event() {
        let packet = EventPacket::from_payload(
            br#"{"cmd":"DISPATCH","evt":"READY","data":{"v":1},"nonce":null}"#,
        )
        .unwrap();
        assert_eq!(packet.cmd.as_deref(), Some("DISPATCH"));
        assert_eq!(packet.event_type(), Some(EVENT_READY));
        assert_eq!(packet.raw_data().unwrap(), br#"{"v":1}"#);
        assert_eq!(packet.nonce, None);
    }

    #[test]
    fn command_without_event_has_no_event_type() {
        let packet =
            EventPacket::from_payload(br#"{"cmd":"SUBSCRIBE","args":{},"nonce":"n1","evt":""}"#)
                .unwrap();
        assert_eq!(packet.event_type(), None);
        assert!(packet.raw_data().unwrap().is_empty());
    }

    #[test]
    fn omits_absent_fields() {
        let packet = EventPacket {
            evt: Some(EVENT_ERROR.to_string()),
            ..EventPacket::default()
        };
        assert_eq!(packet.to_payload().unwrap(), br#"{"evt":"ERROR"}"#);
    }

    #[test]
    fn rejects_non_json() {
        assert!(EventPacket::from_payload(b"\x00\x01").is_err());
    }

    #[test]
    fn noop_handler_is_object_safe() {
        let handler: Box<dyn EventHandler> = Box::new(NoopHandler);
        handler.on_event(EVENT_READY, b"{}");
    }
}
