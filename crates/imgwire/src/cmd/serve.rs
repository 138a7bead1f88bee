use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use imgwire_frame::WireCodec;
use imgwire_peer::{MeanClassifier, ServeStats, Server, ServerConfig};
use serde::Serialize;

use crate::cmd::{install_ctrlc_handler, ServeArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{now_unix_seconds, print_json, print_rows, OutputFormat};

#[derive(Serialize)]
struct ServeOutput {
    kind: &'static str,
    endpoint: String,
    mode: String,
    requests: u64,
    handshakes: u64,
    classified: u64,
    decode_failures: u64,
    classifier_failures: u64,
    rebinds: u64,
    stopped_at: u64,
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let config = ServerConfig {
        endpoint: args.endpoint,
        codec: WireCodec::new(args.wire.mode).with_quality(args.wire.quality),
        verbose: args.verbose,
        ..ServerConfig::default()
    };
    let server = Server::bind_with_config(config).map_err(|err| peer_error("bind failed", err))?;
    let endpoint = server.endpoint().to_string();
    let mode = server.mode().to_string();

    let stats = server
        .serve(MeanClassifier, &running)
        .map_err(|err| peer_error("serve failed", err))?;

    print_stats(endpoint, mode, &stats, format);
    Ok(SUCCESS)
}

fn print_stats(endpoint: String, mode: String, stats: &ServeStats, format: OutputFormat) {
    let out = ServeOutput {
        kind: "serve-summary",
        endpoint,
        mode,
        requests: stats.requests,
        handshakes: stats.handshakes,
        classified: stats.classified,
        decode_failures: stats.decode_failures,
        classifier_failures: stats.classifier_failures,
        rebinds: stats.rebinds,
        stopped_at: now_unix_seconds(),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        _ => print_rows(
            &[
                ("endpoint", out.endpoint.clone()),
                ("mode", out.mode.clone()),
                ("requests", out.requests.to_string()),
                ("handshakes", out.handshakes.to_string()),
                ("classified", out.classified.to_string()),
                ("decode failures", out.decode_failures.to_string()),
                ("classifier failures", out.classifier_failures.to_string()),
                ("rebinds", out.rebinds.to_string()),
            ],
            format,
        ),
    }
}
