//! Integration tests for `timeline serve` and `timeline decode`.
//!
//! Each server test starts the binary as a child process on a unique port
//! with the in-memory store and a local key set, signs identity tokens with
//! the matching test key, and talks raw HTTP/1.1 to it.

use std::io::Read;
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

const PRIVATE_KEY: &str = include_str!("../../core/tests/fixtures/test_rsa_private.pem");
const KID: &str = "test-key-1";
const ADMIN: &str = "112233445566778899000";

/// Base port is derived from the process ID so separate test binaries
/// running in parallel don't collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

fn jwks_fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../core/tests/fixtures/jwks.json")
}

fn timeline() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_timeline"));
    for key in [
        "PORT",
        "PROJECT_ID",
        "TOKEN_AUDIENCE",
        "TIMELINE_JWKS_URL",
        "FIRESTORE_EMULATOR_HOST",
        "FIRESTORE_ACCESS_TOKEN",
        "LOG_FORMAT",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

/// Start `timeline serve` on the given port and wait until it accepts
/// connections.
fn start_server(port: u16) -> Child {
    let mut cmd = timeline();
    cmd.arg("serve").arg("--port").arg(port.to_string());
    cmd.env("TIMELINE_STORE", "memory")
        .env("ADMIN_UID", ADMIN)
        .env("TIMELINE_JWKS_FILE", jwks_fixture())
        .env("RUST_LOG", "warn");
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let child = cmd.spawn().expect("failed to start timeline serve");
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            return child;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    child
}

fn stop(mut child: Child) {
    child.kill().ok();
    child.wait().ok();
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs()
}

fn token(issuer: &str, subject: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KID.to_string());
    let claims = json!({
        "iss": issuer,
        "sub": subject,
        "aud": "example.com",
        "exp": now() + 600,
        "iat": now(),
    });
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).expect("test key parses");
    encode(&header, &claims, &key).expect("token signs")
}

fn delivery(payload: &str, uid: &str) -> String {
    json!({
        "message": {
            "data": BASE64.encode(payload),
            "attributes": {"uid": uid},
            "messageId": "4242"
        },
        "subscription": "projects/demo/subscriptions/timeline-writer"
    })
    .to_string()
}

fn request(port: u16, raw: String) -> (u16, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    std::io::Write::write_all(&mut stream, raw.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    parse_http_response(&response)
}

fn http_get(port: u16, path: &str) -> (u16, String) {
    request(
        port,
        format!(
            "GET {} HTTP/1.1\r\nHost: localhost:{}\r\nConnection: close\r\n\r\n",
            path, port
        ),
    )
}

fn http_post(port: u16, path: &str, authorization: Option<&str>, body: &str) -> (u16, String) {
    let auth_line = authorization
        .map(|v| format!("Authorization: {}\r\n", v))
        .unwrap_or_default();
    request(
        port,
        format!(
            "POST {} HTTP/1.1\r\nHost: localhost:{}\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            path, port, auth_line, body.len(), body
        ),
    )
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let (head, body) = response.split_once("\r\n\r\n").unwrap_or((response, ""));
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);
    (status, body.to_string())
}

#[test]
fn health_returns_ok() {
    let port = next_port();
    let child = start_server(port);

    let (status, body) = http_get(port, "/");
    stop(child);

    assert_eq!(status, 200);
    assert_eq!(body, "OK!");
}

#[test]
fn unknown_route_returns_404() {
    let port = next_port();
    let child = start_server(port);

    let (status, _) = http_get(port, "/nonexistent");
    stop(child);

    assert_eq!(status, 404);
}

#[test]
fn signed_admin_delivery_is_acknowledged() {
    let port = next_port();
    let child = start_server(port);

    let auth = format!("Bearer {}", token("https://accounts.google.com", ADMIN));
    let body = delivery(r#"{"ID":"a1","text":"hi"}"#, "u42");
    let first = http_post(port, "/writer", Some(&auth), &body);
    let redelivered = http_post(port, "/writer", Some(&auth), &body);
    stop(child);

    assert_eq!(first, (200, "OK".to_string()));
    assert_eq!(redelivered, (200, "OK".to_string()));
}

#[test]
fn missing_authorization_is_400() {
    let port = next_port();
    let child = start_server(port);

    let (status, body) = http_post(port, "/writer", None, &delivery(r#"{"ID":"a1"}"#, "u42"));
    stop(child);

    assert_eq!(status, 400);
    assert!(body.starts_with("Invalid token: "), "{body}");
}

#[test]
fn foreign_issuer_is_400() {
    let port = next_port();
    let child = start_server(port);

    let auth = format!("Bearer {}", token("https://issuer.example", ADMIN));
    let (status, body) = http_post(
        port,
        "/writer",
        Some(&auth),
        &delivery(r#"{"ID":"a1"}"#, "u42"),
    );
    stop(child);

    assert_eq!(status, 400);
    assert_eq!(body, "Invalid token: Wrong issuer: https://issuer.example");
}

#[test]
fn non_admin_subject_is_400() {
    let port = next_port();
    let child = start_server(port);

    let auth = format!("Bearer {}", token("accounts.google.com", "999"));
    let (status, body) = http_post(
        port,
        "/writer",
        Some(&auth),
        &delivery(r#"{"ID":"a1"}"#, "u42"),
    );
    stop(child);

    assert_eq!(status, 400);
    assert!(body.contains("administrator"), "{body}");
}

#[test]
fn malformed_envelope_with_valid_token_is_400() {
    let port = next_port();
    let child = start_server(port);

    let auth = format!("Bearer {}", token("accounts.google.com", ADMIN));
    let (status, body) = http_post(port, "/writer", Some(&auth), "{\"message\": 7}");
    stop(child);

    assert_eq!(status, 400);
    assert!(body.starts_with("Invalid token: malformed envelope"), "{body}");
}

#[test]
fn serve_without_admin_uid_exits_nonzero() {
    let output = timeline()
        .arg("serve")
        .env("TIMELINE_STORE", "memory")
        .env_remove("ADMIN_UID")
        .output()
        .expect("failed to run timeline serve");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ADMIN_UID must be set"), "{stderr}");
}

#[test]
fn decode_prints_target_path() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("envelope.json");
    std::fs::write(&file, delivery(r#"{"ID":"a1","text":"hi"}"#, "u42")).unwrap();

    let output = timeline()
        .args(["--output", "json", "decode"])
        .arg(&file)
        .output()
        .expect("failed to run timeline decode");

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["path"], "users/u42/timeline/a1");
    assert_eq!(json["record"], json!({"text": "hi"}));
}

#[test]
fn decode_rejects_payload_without_id() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("envelope.json");
    std::fs::write(&file, delivery(r#"{"text":"hi"}"#, "u42")).unwrap();

    let output = timeline()
        .arg("decode")
        .arg(&file)
        .output()
        .expect("failed to run timeline decode");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing_activity_id"), "{stderr}");
}
