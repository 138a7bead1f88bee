use std::time::Instant;

use imgwire_frame::WireCodec;
use imgwire_peer::handshake::handshake_frame;
use imgwire_peer::{FrameRequester, Session, SessionConfig};
use serde::Serialize;

use crate::cmd::{parse_duration, PingArgs};
use crate::exit::{peer_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_json, print_rows, round_ms, OutputFormat};

#[derive(Serialize, Debug, PartialEq)]
struct PingOutput {
    kind: &'static str,
    endpoint: String,
    mode: String,
    reachable: bool,
    attempts: u32,
    latency_ms: Option<f64>,
    error: Option<String>,
}

pub fn run(args: PingArgs, format: OutputFormat) -> CliResult<i32> {
    if args.attempts == 0 {
        return Err(CliError::new(USAGE, "--attempts must be at least 1"));
    }
    let timeout = parse_duration(&args.timeout)?;
    let mut config = SessionConfig::new(args.endpoint.clone(), args.wire.mode, timeout);
    config.codec = WireCodec::new(args.wire.mode).with_quality(args.wire.quality);
    let mut session = Session::unverified(config).map_err(|err| peer_error("ping failed", err))?;

    let mut out = ping(&mut session, args.attempts);
    out.endpoint = args.endpoint.to_string();
    out.mode = args.wire.mode.to_string();
    print_ping(&out, format);

    if out.reachable {
        Ok(SUCCESS)
    } else {
        Err(CliError::new(
            TIMEOUT,
            format!("{} did not acknowledge {} handshake(s)", out.endpoint, out.attempts),
        ))
    }
}

fn ping<R: FrameRequester>(requester: &mut R, attempts: u32) -> PingOutput {
    let frame = handshake_frame();
    let mut out = PingOutput {
        kind: "ping-result",
        endpoint: String::new(),
        mode: String::new(),
        reachable: false,
        attempts: 0,
        latency_ms: None,
        error: None,
    };

    for _ in 0..attempts {
        out.attempts += 1;
        let started = Instant::now();
        match requester.request(&frame) {
            Some(reply) if !reply.is_error() => {
                out.reachable = true;
                out.latency_ms = Some(round_ms(started.elapsed().as_secs_f64() * 1000.0));
                out.error = None;
                break;
            }
            Some(reply) => out.error = reply.error_message(),
            None => out.error = Some("no reply".to_string()),
        }
        requester.reset();
    }
    out
}

fn print_ping(out: &PingOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        _ => print_rows(
            &[
                ("endpoint", out.endpoint.clone()),
                ("mode", out.mode.clone()),
                ("reachable", out.reachable.to_string()),
                ("attempts", out.attempts.to_string()),
                (
                    "latency",
                    out.latency_ms
                        .map_or_else(|| "unavailable".to_string(), |ms| format!("{ms:.2}ms")),
                ),
                ("error", out.error.clone().unwrap_or_else(|| "-".to_string())),
            ],
            format,
        ),
    }
}

#[cfg(test)]
mod tests {
    use imgwire_frame::Frame;
    use imgwire_peer::Reply;

    use super::*;

    struct Script(Vec<Option<Reply>>);

    impl FrameRequester for Script {
        fn request(&mut self, _frame: &Frame) -> Option<Reply> {
            if self.0.is_empty() {
                None
            } else {
                self.0.remove(0)
            }
        }
    }

    #[test]
    fn ping_stops_at_first_ack() {
        let mut script = Script(vec![None, Some(Reply::hello()), Some(Reply::hello())]);
        let out = ping(&mut script, 5);
        assert!(out.reachable);
        assert_eq!(out.attempts, 2);
        assert!(out.latency_ms.is_some());
        assert_eq!(script.0.len(), 1);
    }

    #[test]
    fn ping_reports_last_error() {
        let mut script = Script(vec![Some(Reply::error("warming up"))]);
        let out = ping(&mut script, 1);
        assert!(!out.reachable);
        assert_eq!(out.error.as_deref(), Some("warming up"));
    }
}
