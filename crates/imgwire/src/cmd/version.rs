use imgwire_frame::{WireMode, DEFAULT_MAX_FRAME_BYTES, DEFAULT_QUALITY};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("imgwire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: imgwire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("IMGWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("IMGWIRE_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    let (major, minor, patch) = imgwire_transport::libzmq_version();
    println!("libzmq: {major}.{minor}.{patch}");
    println!(
        "wire_modes: {}",
        WireMode::ALL
            .iter()
            .map(|mode| format!("{}={}", mode.index(), mode))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("default_quality: {DEFAULT_QUALITY}");
    println!("max_frame_bytes: {DEFAULT_MAX_FRAME_BYTES}");
    println!("features: peer={}, cli=true", cfg!(feature = "peer"));

    Ok(SUCCESS)
}
