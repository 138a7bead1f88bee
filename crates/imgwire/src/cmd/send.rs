use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use imgwire_frame::{Frame, WireCodec};
use imgwire_peer::{FrameRequester, Reply, Session, SessionConfig};
use serde::Serialize;

use crate::cmd::{install_ctrlc_handler, parse_duration, SendArgs};
use crate::exit::{
    frame_error, peer_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{print_json, print_rows, reply_text, round_ms, OutputFormat};

#[derive(Serialize)]
struct SendOutput<'a> {
    kind: &'static str,
    endpoint: String,
    mode: String,
    shape: [u64; 3],
    sent: u32,
    replies: usize,
    mean_latency_ms: Option<f64>,
    reply: Option<&'a Reply>,
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = resolve_frame(&args)?;
    let timeout = parse_duration(&args.timeout)?;

    let mut config = SessionConfig::new(args.endpoint.clone(), args.wire.mode, timeout);
    config.codec = WireCodec::new(args.wire.mode).with_quality(args.wire.quality);
    config.handshake.max_attempts = args.handshake_attempts;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut session =
        Session::open_until(config, &running).map_err(|err| peer_error("handshake failed", err))?;

    let (last, latencies) = send_repeatedly(&mut session, &frame, args.count, &running);
    let out = SendOutput {
        kind: "send-result",
        endpoint: args.endpoint.to_string(),
        mode: args.wire.mode.to_string(),
        shape: frame.shape(),
        sent: args.count,
        replies: latencies.len(),
        mean_latency_ms: mean_ms(&latencies),
        reply: last.as_ref(),
    };
    print_send(&out, format);

    match &last {
        None => Err(CliError::new(TIMEOUT, "no reply received")),
        Some(reply) if reply.is_error() => Ok(FAILURE),
        Some(_) => Ok(SUCCESS),
    }
}

/// Send `frame` up to `count` times; returns the last reply and the
/// latency of every answered request.
fn send_repeatedly<R: FrameRequester>(
    requester: &mut R,
    frame: &Frame,
    count: u32,
    running: &AtomicBool,
) -> (Option<Reply>, Vec<Duration>) {
    let mut last = None;
    let mut latencies = Vec::new();
    for _ in 0..count {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let started = Instant::now();
        if let Some(reply) = requester.request(frame) {
            latencies.push(started.elapsed());
            last = Some(reply);
        }
    }
    (last, latencies)
}

fn mean_ms(latencies: &[Duration]) -> Option<f64> {
    if latencies.is_empty() {
        return None;
    }
    let total: f64 = latencies.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
    Some(round_ms(total / latencies.len() as f64))
}

fn print_send(out: &SendOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        _ => print_rows(
            &[
                ("endpoint", out.endpoint.clone()),
                ("mode", out.mode.clone()),
                ("shape", format!("{:?}", out.shape)),
                ("sent", out.sent.to_string()),
                ("replies", out.replies.to_string()),
                (
                    "mean latency",
                    out.mean_latency_ms
                        .map_or_else(|| "-".to_string(), |ms| format!("{ms:.2}ms")),
                ),
                ("reply", reply_text(out.reply)),
            ],
            format,
        ),
    }
}

fn resolve_frame(args: &SendArgs) -> CliResult<Frame> {
    if let Some(path) = &args.image {
        return load_image(path);
    }
    if let Some(spec) = &args.zeros {
        let (width, height, channels) = parse_dims(spec)?;
        return Frame::zeros(width, height, channels)
            .map_err(|err| frame_error("invalid --zeros", err));
    }
    if let Some(spec) = &args.fill {
        let (dims, value) = spec
            .rsplit_once(':')
            .ok_or_else(|| CliError::new(USAGE, format!("--fill expects WxHxC:VALUE, got {spec}")))?;
        let (width, height, channels) = parse_dims(dims)?;
        let value: u8 = value
            .parse()
            .map_err(|_| CliError::new(USAGE, format!("fill value must be 0-255, got {value}")))?;
        return Frame::filled(width, height, channels, value)
            .map_err(|err| frame_error("invalid --fill", err));
    }
    Err(CliError::new(
        USAGE,
        "one of --image, --zeros or --fill is required",
    ))
}

fn load_image(path: &Path) -> CliResult<Frame> {
    let image = image::open(path).map_err(|err| {
        CliError::new(DATA_INVALID, format!("failed reading {}: {err}", path.display()))
    })?;
    Frame::from_rgb_as_bgr(image.into_rgb8())
        .map_err(|err| frame_error(&format!("failed converting {}", path.display()), err))
}

/// Parse `WxHxC`, or `WxH` for a 3-channel frame.
fn parse_dims(spec: &str) -> CliResult<(u32, u32, u32)> {
    let invalid = || CliError::new(USAGE, format!("expected WxHxC, got {spec}"));
    let dims = spec
        .split(['x', 'X'])
        .map(|part| part.trim().parse::<u32>().map_err(|_| invalid()))
        .collect::<CliResult<Vec<_>>>()?;
    match dims[..] {
        [width, height] => Ok((width, height, 3)),
        [width, height, channels] => Ok((width, height, channels)),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flaky {
        calls: u32,
    }

    impl FrameRequester for Flaky {
        fn request(&mut self, _frame: &Frame) -> Option<Reply> {
            self.calls += 1;
            (self.calls % 2 == 0).then(|| Reply::new().with("call", self.calls))
        }
    }

    #[test]
    fn parse_dims_accepts_two_and_three_dims() {
        assert_eq!(parse_dims("4x4x3").unwrap(), (4, 4, 3));
        assert_eq!(parse_dims("640x480").unwrap(), (640, 480, 3));
        assert!(parse_dims("4x4x3x1").is_err());
        assert!(parse_dims("4xAx3").is_err());
    }

    #[test]
    fn repeated_sends_keep_last_reply_and_answered_latencies() {
        let mut requester = Flaky { calls: 0 };
        let frame = Frame::filled(2, 2, 3, 1).unwrap();
        let (last, latencies) =
            send_repeatedly(&mut requester, &frame, 5, &AtomicBool::new(true));
        assert_eq!(requester.calls, 5);
        assert_eq!(latencies.len(), 2);
        assert_eq!(last.and_then(|r| r.get("call").cloned()), Some(serde_json::json!(4)));
    }

    #[test]
    fn cleared_flag_stops_sending() {
        let mut requester = Flaky { calls: 0 };
        let frame = Frame::sentinel();
        let (last, _) = send_repeatedly(&mut requester, &frame, 5, &AtomicBool::new(false));
        assert!(last.is_none());
        assert_eq!(requester.calls, 0);
    }

    #[test]
    fn mean_ms_of_nothing_is_none() {
        assert_eq!(mean_ms(&[]), None);
        assert_eq!(
            mean_ms(&[Duration::from_millis(2), Duration::from_millis(4)]),
            Some(3.0)
        );
    }
}
