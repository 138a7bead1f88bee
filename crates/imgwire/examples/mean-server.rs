//! Minimal inference server: replies with the mean pixel value of each frame.
//!
//! Run with:
//!   cargo run --example mean-server --features peer
//!
//! In another terminal:
//!   cargo run --features cli -- send tcp://127.0.0.1:5557 \
//!     --mode header-raw --fill 64x48x3:120

use std::sync::atomic::AtomicBool;

use imgwire::frame::{Frame, WireMode};
use imgwire::peer::{Diagnostic, Reply, Server};
use imgwire::transport::Endpoint;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::bind(&Endpoint::any(5557), WireMode::HeaderRaw)?;
    eprintln!("Listening on {}", server.endpoint());

    // Runs until the process is killed.
    let running = AtomicBool::new(true);
    let stats = server.serve(
        |frame: &Frame| -> Result<Reply, Diagnostic> {
            if frame.channels() != 3 {
                return Err(Diagnostic::new("expected a BGR frame"));
            }
            eprintln!("Classifying {:?}", frame.shape());
            Ok(Reply::new().with("mean", frame.mean()))
        },
        &running,
    )?;

    eprintln!("Served {} request(s)", stats.requests);
    Ok(())
}
