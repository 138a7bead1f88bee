mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "imgwire", version, about = "Image transport to inference servers")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "IMGWIRE_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use imgwire_frame::WireMode;

    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "imgwire",
            "send",
            "tcp://10.0.0.5:5556",
            "--fill",
            "4x4x3:10",
            "--mode",
            "0",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.endpoint.port(), 5556);
        assert_eq!(args.wire.mode, WireMode::HeaderRaw);
        assert_eq!(args.wire.quality, 75);
    }

    #[test]
    fn rejects_conflicting_frame_args() {
        let err = Cli::try_parse_from([
            "imgwire",
            "send",
            "tcp://127.0.0.1:5556",
            "--zeros",
            "4x4x3",
            "--fill",
            "4x4x3:1",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = Cli::try_parse_from(["imgwire", "serve", "tcp://*:5556", "--mode", "pickle"])
            .expect_err("unknown mode should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_feed_subcommand() {
        let cli = Cli::try_parse_from([
            "imgwire",
            "feed",
            "127.0.0.1:5556",
            "--dir",
            "/tmp/frames",
            "--capture-only",
            "--max",
            "10",
        ])
        .expect("feed args should parse");
        assert!(matches!(cli.command, Command::Feed(ref args) if args.capture_only));
    }
}
