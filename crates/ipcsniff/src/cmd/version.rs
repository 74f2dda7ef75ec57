use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("ipcsniff {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: ipcsniff");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "build_target: {}",
        option_env!("IPCSNIFF_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("IPCSNIFF_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("channel_prefix: {}", ipcsniff_transport::CHANNEL_PREFIX);
    println!(
        "max_message_size: {}",
        ipcsniff_frame::DEFAULT_MAX_PAYLOAD
    );

    Ok(SUCCESS)
}
