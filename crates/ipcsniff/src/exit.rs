use std::fmt;

use ipcsniff_peer::PeerError;
use ipcsniff_proxy::ProxyError;
use ipcsniff_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn listen_error_code(err: &PeerError) -> i32 {
    match err {
        PeerError::Transport(
            TransportError::Bind { source, .. } | TransportError::Accept(source),
        ) if source.kind() == std::io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        _ => TRANSPORT_ERROR,
    }
}

pub fn proxy_error(err: ProxyError) -> CliError {
    let code = match &err {
        ProxyError::ListenFailed { source, .. } | ProxyError::AcceptFailed(source) => {
            listen_error_code(source)
        }
        ProxyError::ShutdownTimeout(_) => TIMEOUT,
        ProxyError::DialFailed { .. } | ProxyError::Relay { .. } => FAILURE,
        ProxyError::InvalidState(_) | ProxyError::Spawn(_) => INTERNAL,
    };
    CliError::new(code, err.to_string())
}
