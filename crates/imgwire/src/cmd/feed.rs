use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use imgwire_frame::{Frame, WireCodec};
use imgwire_peer::{DirectorySource, FeedOptions, LiveFeed, Reply, Session, SessionConfig};
use serde::Serialize;

use crate::cmd::{install_ctrlc_handler, parse_duration, FeedArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_json, print_pretty, reply_text, OutputFormat};

#[derive(Serialize)]
struct FeedItemOutput<'a> {
    kind: &'static str,
    index: u64,
    shape: [u64; 3],
    mean: f64,
    reply: Option<&'a Reply>,
}

pub fn run(args: FeedArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let poll_interval = parse_duration(&args.poll_interval)?;
    let source =
        DirectorySource::open(&args.dir).map_err(|err| peer_error("open failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut config = SessionConfig::new(args.endpoint, args.wire.mode, timeout);
    config.codec = WireCodec::new(args.wire.mode).with_quality(args.wire.quality);
    let session = if args.capture_only {
        Session::unverified(config)
    } else {
        Session::open_until(config, &running)
    }
    .map_err(|err| peer_error("session failed", err))?;

    let options = FeedOptions {
        capture_only: args.capture_only,
        max_frames: args.max,
        ..FeedOptions::default()
    };
    let mut feed =
        LiveFeed::start(session, source, options).map_err(|err| peer_error("start failed", err))?;

    let mut index = 0u64;
    loop {
        // Read before polling so the final item is never missed.
        let finished = !feed.is_running();
        if let Some((frame, reply)) = feed.poll() {
            print_item(index, &frame, reply.as_ref(), format);
            index += 1;
            continue;
        }
        if finished || !running.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(poll_interval);
    }

    feed.stop();
    tracing::info!(
        printed = index,
        published = feed.slot().published(),
        dropped = feed.slot().dropped(),
        "feed finished"
    );
    Ok(SUCCESS)
}

fn print_item(index: u64, frame: &Frame, reply: Option<&Reply>, format: OutputFormat) {
    let out = FeedItemOutput {
        kind: "feed-item",
        index,
        shape: frame.shape(),
        mean: (frame.mean() * 100.0).round() / 100.0,
        reply,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        _ => print_pretty(&[
            ("index", out.index.to_string()),
            ("shape", format!("{:?}", out.shape)),
            ("mean", format!("{:.2}", out.mean)),
            ("reply", reply_text(out.reply)),
        ]),
    }
}
