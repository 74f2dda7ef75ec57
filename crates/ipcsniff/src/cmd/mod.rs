use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};

pub mod proxy;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Relay and log traffic between a client and the origin process.
    Proxy(ProxyArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command) -> CliResult<i32> {
    match command {
        Command::Proxy(args) => proxy::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ProxyArgs {
    /// Instance id to listen on.
    #[arg(long, env = "IPCSNIFF_LISTEN_INSTANCE_ID", default_value_t = 0)]
    pub listen_instance_id: u32,
    /// Instance id of the origin process.
    #[arg(long, env = "IPCSNIFF_ORIGIN_INSTANCE_ID", default_value_t = 1)]
    pub origin_instance_id: u32,
    /// Socket directory (Unix). Default: XDG_RUNTIME_DIR, TMPDIR, TMP, TEMP, then /tmp.
    #[arg(long, env = "IPCSNIFF_RUNTIME_DIR", value_name = "DIR")]
    pub runtime_dir: Option<PathBuf>,
    /// Read poll deadline (e.g. 100ms, 1s).
    #[arg(long, env = "IPCSNIFF_POLL_INTERVAL", default_value = "100ms", value_parser = parse_duration)]
    pub poll_interval: Duration,
    /// Longest wait for live bridges on shutdown (e.g. 10s).
    #[arg(long, env = "IPCSNIFF_DRAIN_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub drain_timeout: Duration,
    /// Largest accepted message payload in bytes.
    #[arg(
        long,
        env = "IPCSNIFF_MAX_MESSAGE_SIZE",
        default_value_t = 64 * 1024,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_message_size: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `5s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_millis() {
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
    }

    #[test]
    fn parse_duration_invalid() {
        assert!(parse_duration("0ms").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("").is_err());
    }
}
