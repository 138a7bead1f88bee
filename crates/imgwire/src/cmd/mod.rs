use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use imgwire_frame::WireMode;
use imgwire_transport::Endpoint;

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod feed;
pub mod ping;
pub mod send;
pub mod serve;
pub mod version;

const DEFAULT_SERVE_ENDPOINT: &str = "tcp://*:5556";
const DEFAULT_CLIENT_ENDPOINT: &str = "tcp://127.0.0.1:5556";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the demonstration mean classifier.
    Serve(ServeArgs),
    /// Handshake, then send one frame one or more times.
    Send(SendArgs),
    /// Stream a directory of images through the live feed.
    Feed(FeedArgs),
    /// Check whether a server answers handshakes.
    Ping(PingArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Feed(args) => feed::run(args, format),
        Command::Ping(args) => ping::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Wire settings shared by every network command.
#[derive(Args, Debug, Clone)]
pub struct WireArgs {
    /// Wire mode: header-raw, compressed-blob, multipart-raw, image-codec (or 0-3).
    #[arg(long, env = "IMGWIRE_MODE", default_value = "image-codec")]
    pub mode: WireMode,
    /// JPEG quality for image-codec; clamped to 1-100.
    #[arg(long, env = "IMGWIRE_QUALITY", default_value_t = 75, allow_negative_numbers = true)]
    pub quality: i32,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endpoint to bind.
    #[arg(env = "IMGWIRE_ENDPOINT", default_value = DEFAULT_SERVE_ENDPOINT)]
    pub endpoint: Endpoint,
    #[command(flatten)]
    pub wire: WireArgs,
    /// Log every reply body.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server endpoint.
    #[arg(env = "IMGWIRE_ENDPOINT", default_value = DEFAULT_CLIENT_ENDPOINT)]
    pub endpoint: Endpoint,
    #[command(flatten)]
    pub wire: WireArgs,
    /// Image file to send.
    #[arg(long, conflicts_with_all = ["zeros", "fill"])]
    pub image: Option<PathBuf>,
    /// Send an all-zero uint8 frame, WxHxC.
    #[arg(long, value_name = "WxHxC", conflicts_with_all = ["image", "fill"])]
    pub zeros: Option<String>,
    /// Send a constant uint8 frame, WxHxC:VALUE.
    #[arg(long, value_name = "WxHxC:VALUE", conflicts_with_all = ["image", "zeros"])]
    pub fill: Option<String>,
    /// Number of times to send the frame.
    #[arg(long, default_value_t = 1)]
    pub count: u32,
    /// Reply timeout per request (e.g. 1s, 500ms).
    #[arg(long, env = "IMGWIRE_TIMEOUT", default_value = "1000ms")]
    pub timeout: String,
    /// Give up after this many handshake attempts. Default: retry until Ctrl-C.
    #[arg(long)]
    pub handshake_attempts: Option<u32>,
}

#[derive(Args, Debug)]
pub struct FeedArgs {
    /// Server endpoint.
    #[arg(env = "IMGWIRE_ENDPOINT", default_value = DEFAULT_CLIENT_ENDPOINT)]
    pub endpoint: Endpoint,
    #[command(flatten)]
    pub wire: WireArgs,
    /// Directory of images to replay.
    #[arg(long)]
    pub dir: PathBuf,
    /// Capture without contacting a server.
    #[arg(long)]
    pub capture_only: bool,
    /// Stop after N captures.
    #[arg(long)]
    pub max: Option<u64>,
    /// Reply timeout per request (e.g. 1s, 500ms).
    #[arg(long, env = "IMGWIRE_TIMEOUT", default_value = "1000ms")]
    pub timeout: String,
    /// Pause between polls of the feed (e.g. 30ms).
    #[arg(long, default_value = "30ms")]
    pub poll_interval: String,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    /// Server endpoint.
    #[arg(env = "IMGWIRE_ENDPOINT", default_value = DEFAULT_CLIENT_ENDPOINT)]
    pub endpoint: Endpoint,
    #[command(flatten)]
    pub wire: WireArgs,
    /// Reply timeout per attempt (e.g. 1s, 500ms).
    #[arg(long, env = "IMGWIRE_TIMEOUT", default_value = "1000ms")]
    pub timeout: String,
    /// Number of handshake attempts.
    #[arg(long, default_value_t = 3)]
    pub attempts: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Parse `5s`, `150ms` or a bare number of seconds.
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
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
