//! Channel naming.
//!
//! A channel is selected by a small numeric instance id. Both the listening
//! and the dialing side derive the same name from the same id, so two
//! processes agree on a channel without exchanging anything else.

use std::path::{Path, PathBuf};

/// Prefix shared by every channel name.
pub const CHANNEL_PREFIX: &str = "discord-ipc-";

/// Environment variables consulted, in order, for the socket directory.
#[cfg(unix)]
pub const RUNTIME_DIR_VARS: [&str; 4] = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"];

/// Directory used when none of [`RUNTIME_DIR_VARS`] is set.
#[cfg(unix)]
pub const FALLBACK_RUNTIME_DIR: &str = "/tmp";

/// Logical channel name derived from an instance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelName {
    instance_id: u32,
}

impl ChannelName {
    pub fn new(instance_id: u32) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    /// Bare channel name, e.g. `discord-ipc-0`.
    pub fn file_name(&self) -> String {
        format!("{CHANNEL_PREFIX}{}", self.instance_id)
    }

    /// Filesystem path of the Unix domain socket for this channel.
    ///
    /// `runtime_dir` overrides the directory normally taken from the
    /// environment.
    #[cfg(unix)]
    pub fn socket_path(&self, runtime_dir: Option<&Path>) -> PathBuf {
        match runtime_dir {
            Some(dir) => dir.join(self.file_name()),
            None => default_runtime_dir().join(self.file_name()),
        }
    }

    /// Named pipe path for this channel, e.g. `\\.\pipe\discord-ipc-0`.
    #[cfg(windows)]
    pub fn pipe_path(&self) -> String {
        format!(r"\\.\pipe\{}", self.file_name())
    }

    /// Platform path for diagnostics and error reporting.
    pub fn display_path(&self, runtime_dir: Option<&Path>) -> PathBuf {
        #[cfg(unix)]
        {
            self.socket_path(runtime_dir)
        }
        #[cfg(windows)]
        {
            let _ = runtime_dir;
            PathBuf::from(self.pipe_path())
        }
    }
}

impl std::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{CHANNEL_PREFIX}{}", self.instance_id)
    }
}

/// Resolve the socket directory from the environment.
#[cfg(unix)]
pub fn default_runtime_dir() -> PathBuf {
    RUNTIME_DIR_VARS
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(FALLBACK_RUNTIME_DIR))
}
