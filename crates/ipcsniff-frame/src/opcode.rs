//! Frame opcodes.
//!
//! The codec carries opcodes as raw `u32` values and never rejects unknown
//! ones; [`Opcode`] names the values the protocol defines.

/// Connection handshake; payload is a JSON handshake packet.
pub const HANDSHAKE: u32 = 0;

/// Application message; payload is a JSON event/command packet.
pub const FRAME: u32 = 1;

/// Orderly close notification.
pub const CLOSE: u32 = 2;

/// Liveness probe.
pub const PING: u32 = 3;

/// Liveness probe reply.
pub const PONG: u32 = 4;

/// Known opcode values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Handshake = HANDSHAKE,
    Frame = FRAME,
    Close = CLOSE,
    Ping = PING,
    Pong = PONG,
}

impl Opcode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Handshake => "HANDSHAKE",
            Opcode::Frame => "FRAME",
            Opcode::Close => "CLOSE",
            Opcode::Ping => "PING",
            Opcode::Pong => "PONG",
        }
    }
}

impl TryFrom<u32> for Opcode {
    type Error = u32;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            HANDSHAKE => Ok(Opcode::Handshake),
            FRAME => Ok(Opcode::Frame),
            CLOSE => Ok(Opcode::Close),
            PING => Ok(Opcode::Ping),
            PONG => Ok(Opcode::Pong),
            other => Err(other),
        }
    }
}

impl From<Opcode> for u32 {
    fn from(opcode: Opcode) -> Self {
        opcode.as_u32()
    }
}

/// Returns a human-readable name for a raw opcode.
pub fn opcode_name(opcode: u32) -> &'static str {
    Opcode::try_from(opcode)
        .map(Opcode::name)
        .unwrap_or("UNKNOWN")
}
