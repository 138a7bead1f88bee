#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use imgwire::transport::{Endpoint, ReplySocket};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "imgwire-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn free_port() -> u16 {
    let socket = ReplySocket::bind(&Endpoint::localhost(0)).expect("ephemeral bind");
    socket.endpoint().port()
}

fn imgwire() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_imgwire"));
    command.env_remove("IMGWIRE_ENDPOINT");
    command.env_remove("IMGWIRE_MODE");
    command.env_remove("IMGWIRE_TIMEOUT");
    command.env_remove("IMGWIRE_QUALITY");
    command.arg("--log-level").arg("error");
    command
}

fn spawn_server(port: u16, mode: &str) -> Child {
    imgwire()
        .arg("serve")
        .arg(format!("tcp://127.0.0.1:{port}"))
        .arg("--mode")
        .arg(mode)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("serve command should start")
}

#[test]
fn send_against_serve_returns_mean() {
    let port = free_port();
    let mut server = spawn_server(port, "header-raw");

    let output = imgwire()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg(format!("tcp://127.0.0.1:{port}"))
        .arg("--mode")
        .arg("header-raw")
        .arg("--fill")
        .arg("4x4x3:10")
        .arg("--count")
        .arg("3")
        .arg("--handshake-attempts")
        .arg("10")
        .output()
        .expect("send should run");

    let _ = server.kill();
    let _ = server.wait();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("send should emit json");
    assert_eq!(payload["kind"], "send-result");
    assert_eq!(payload["replies"], 3);
    assert_eq!(payload["reply"]["mean"], 10.0);
    assert_eq!(payload["reply"]["shape"], serde_json::json!([4, 4, 3]));
}

#[test]
fn ping_without_server_returns_124() {
    let output = imgwire()
        .arg("ping")
        .arg(format!("tcp://127.0.0.1:{}", free_port()))
        .arg("--timeout")
        .arg("100ms")
        .arg("--attempts")
        .arg("2")
        .output()
        .expect("ping should run");

    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn ping_against_serve_is_reachable() {
    let port = free_port();
    let mut server = spawn_server(port, "multipart-raw");

    let output = imgwire()
        .arg("--format")
        .arg("json")
        .arg("ping")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--mode")
        .arg("multipart-raw")
        .arg("--attempts")
        .arg("10")
        .output()
        .expect("ping should run");

    let _ = server.kill();
    let _ = server.wait();

    assert!(output.status.success());
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("ping should emit json");
    assert_eq!(payload["reachable"], true);
}

#[test]
fn send_without_frame_is_usage_error() {
    let output = imgwire()
        .arg("send")
        .arg("tcp://127.0.0.1:5556")
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn feed_capture_only_replays_directory() {
    let dir = unique_temp_dir("feed");
    for (index, value) in [10u8, 20, 30].into_iter().enumerate() {
        image::RgbImage::from_pixel(4, 4, image::Rgb([value, value, value]))
            .save(dir.join(format!("{index}.png")))
            .expect("png should save");
    }

    let output = imgwire()
        .arg("--format")
        .arg("json")
        .arg("feed")
        .arg("tcp://127.0.0.1:5556")
        .arg("--dir")
        .arg(&dir)
        .arg("--capture-only")
        .output()
        .expect("feed should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let items: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect();
    assert!(!items.is_empty());
    assert!(items.iter().all(|item| item["reply"].is_null()));
    assert_eq!(items.last().map(|item| item["mean"].clone()), Some(serde_json::json!(30.0)));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_reports_package_version() {
    let output = imgwire()
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("imgwire {}", env!("CARGO_PKG_VERSION")));
}
