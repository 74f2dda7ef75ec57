use ipcsniff_proxy::{ProxyConfig, Server};
use ipcsniff_transport::CancelToken;
use tracing::info;

use crate::cmd::ProxyArgs;
use crate::exit::{proxy_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: ProxyArgs) -> CliResult<i32> {
    let config = config_from_args(args);
    let token = CancelToken::new();
    install_signal_handler(token.clone())?;

    info!(
        listen_instance_id = config.listen_instance_id,
        origin_instance_id = config.origin_instance_id,
        "starting proxy"
    );
    Server::new(config).run(&token).map_err(proxy_error)?;
    Ok(SUCCESS)
}

fn config_from_args(args: ProxyArgs) -> ProxyConfig {
    ProxyConfig {
        listen_instance_id: args.listen_instance_id,
        origin_instance_id: args.origin_instance_id,
        runtime_dir: args.runtime_dir,
        poll_interval: args.poll_interval,
        drain_timeout: args.drain_timeout,
        max_message_size: args.max_message_size as usize,
    }
}

/// Cancel `token` on SIGINT or SIGTERM.
fn install_signal_handler(token: CancelToken) -> CliResult<()> {
    ctrlc::set_handler(move || {
        info!("stop requested");
        token.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
