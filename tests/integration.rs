//! End-to-end tests against a live server.
//!
//! Each test runs a real server on its own socket in a temp directory and
//! talks to it the way a client would: one JSON request per connection,
//! one JSON response back. Polling helpers replace fixed sleeps where a
//! condition can be observed, so the tests stay robust on slow machines.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use specter::protocol::{Op, Request, Response};
use specter::server;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

struct TestServer {
    /// Keeps the socket directory alive for the duration of the test.
    _dir: TempDir,
    socket: PathBuf,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    /// Start a server for `argv` and wait for its socket to appear.
    async fn start(argv: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join(".specter.sock");
        let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        let handle = tokio::spawn(server::run(socket.clone(), argv));

        assert!(
            wait_for(|| socket.exists(), Duration::from_secs(2)).await,
            "timed out waiting for server socket"
        );
        Self {
            _dir: dir,
            socket,
            handle,
        }
    }

    async fn send(&self, req: Request) -> Response {
        let body = serde_json::to_vec(&req).unwrap();
        let raw = self.send_raw(&body).await;
        serde_json::from_slice(&raw).unwrap()
    }

    /// Send arbitrary bytes as the request and return the raw response.
    async fn send_raw(&self, body: &[u8]) -> Vec<u8> {
        let fut = async {
            let mut stream = UnixStream::connect(&self.socket).await.unwrap();
            stream.write_all(body).await.unwrap();
            let mut resp = Vec::new();
            stream.read_to_end(&mut resp).await.unwrap();
            resp
        };
        tokio::time::timeout(Duration::from_secs(5), fut)
            .await
            .expect("timed out waiting for response")
    }

    /// Capture text repeatedly until it contains `needle`.
    async fn capture_until(&self, needle: &str, timeout: Duration) -> String {
        let deadline = Instant::now() + timeout;
        loop {
            let resp = self.send(Request::new(Op::Capture)).await;
            assert!(resp.is_ok(), "capture failed: {:?}", resp.message);
            let text = resp.data.unwrap_or_default();
            if text.contains(needle) || Instant::now() >= deadline {
                return text;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Kill the session and wait for the server task to finish cleanly.
    async fn kill_and_join(self) {
        let resp = self.send(Request::new(Op::Kill)).await;
        assert!(resp.is_ok(), "kill failed: {:?}", resp.message);
        assert_eq!(resp.message.as_deref(), Some("Server shutting down"));

        let result = tokio::time::timeout(Duration::from_secs(2), self.handle)
            .await
            .expect("server did not shut down after kill")
            .unwrap();
        result.expect("server returned an error");
        assert!(!self.socket.exists(), "socket file survived shutdown");
    }
}

async fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_capture_sees_child_output() {
    let server = TestServer::start(&["/bin/sh", "-c", "echo hello world; sleep 2"]).await;

    let text = server
        .capture_until("hello world", Duration::from_secs(3))
        .await;
    assert!(text.contains("hello world"), "capture was:\n{text}");

    server.kill_and_join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_capture_has_grid_geometry() {
    let server = TestServer::start(&["/bin/cat"]).await;

    let resp = server.send(Request::new(Op::Capture)).await;
    let text = resp.data.unwrap();
    assert_eq!(text.matches('\n').count(), 30);
    for line in text.lines() {
        assert_eq!(line.chars().count(), 100);
    }

    server.kill_and_join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_interactive_type_capture_and_png() {
    let server = TestServer::start(&["/bin/cat"]).await;

    let resp = server
        .send(Request::new(Op::Type).with_payload(vec!["foo bar\n".into()]))
        .await;
    assert!(resp.is_ok(), "type failed: {:?}", resp.message);

    let text = server.capture_until("foo bar", Duration::from_secs(3)).await;
    assert!(text.contains("foo bar"), "capture was:\n{text}");

    let resp = server
        .send(Request::new(Op::Capture).with_option("format", "png"))
        .await;
    assert!(resp.is_ok(), "png capture failed: {:?}", resp.message);
    let png = BASE64.decode(resp.data.unwrap()).unwrap();
    assert!(png.len() > 8);
    assert_eq!(&png[..8], &PNG_MAGIC);

    let resp = server.send(Request::new(Op::History)).await;
    let history: Vec<String> = serde_json::from_str(&resp.data.unwrap()).unwrap();
    assert_eq!(history, vec!["foo bar\n".to_string()]);

    server.kill_and_join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_format_falls_back_to_text() {
    let server = TestServer::start(&["/bin/cat"]).await;

    let resp = server
        .send(Request::new(Op::Capture).with_option("format", "jpeg"))
        .await;
    assert!(resp.is_ok());
    // Text grid, not base64
    assert_eq!(resp.data.unwrap().matches('\n').count(), 30);

    server.kill_and_join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wait_returns_exit_code() {
    let server = TestServer::start(&["/bin/sh", "-c", "exit 7"]).await;

    let resp = server.send(Request::new(Op::Wait)).await;
    assert!(resp.is_ok(), "wait failed: {:?}", resp.message);
    assert_eq!(resp.data.as_deref(), Some("7"));

    server.kill_and_join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_waits_agree() {
    let server = TestServer::start(&["/bin/sh", "-c", "sleep 0.3; exit 5"]).await;

    let (a, b) = tokio::join!(
        server.send(Request::new(Op::Wait)),
        server.send(Request::new(Op::Wait)),
    );
    assert_eq!(a.data.as_deref(), Some("5"));
    assert_eq!(b.data.as_deref(), Some("5"));

    server.kill_and_join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_history_preserves_order() {
    let server = TestServer::start(&["/bin/cat"]).await;

    for text in ["a", "b"] {
        let resp = server
            .send(Request::new(Op::Type).with_payload(vec![text.into()]))
            .await;
        assert!(resp.is_ok());
    }

    let resp = server.send(Request::new(Op::History)).await;
    let history: Vec<String> = serde_json::from_str(&resp.data.unwrap()).unwrap();
    assert_eq!(history, vec!["a".to_string(), "b".to_string()]);

    server.kill_and_join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_type_with_empty_payload_is_ok_and_unrecorded() {
    let server = TestServer::start(&["/bin/cat"]).await;

    let before = server.send(Request::new(Op::Capture)).await.data.unwrap();

    let resp = server.send(Request::new(Op::Type)).await;
    assert!(resp.is_ok());

    let resp = server.send(Request::new(Op::History)).await;
    assert_eq!(resp.data.as_deref(), Some("[]"));

    // A no-op type changes nothing on screen either
    let after = server.send(Request::new(Op::Capture)).await.data.unwrap();
    assert_eq!(before, after);

    server.kill_and_join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_type_after_exit_fails() {
    let server = TestServer::start(&["/bin/sh", "-c", "exit 0"]).await;

    // Ensure the child has been reaped before typing
    let resp = server.send(Request::new(Op::Wait)).await;
    assert!(resp.is_ok());

    let resp = server
        .send(Request::new(Op::Type).with_payload(vec!["x".into()]))
        .await;
    assert!(!resp.is_ok());
    assert_eq!(resp.message.as_deref(), Some("Process has exited"));

    server.kill_and_join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_ops_are_rejected() {
    let server = TestServer::start(&["/bin/cat"]).await;

    let raw = server.send_raw(br#"{"op":"frobnicate"}"#).await;
    let resp: Response = serde_json::from_slice(&raw).unwrap();
    assert!(!resp.is_ok());
    assert_eq!(resp.message.as_deref(), Some("Unknown operation"));

    // spawn is client-side in this surface; over the wire it is unknown too
    let resp = server.send(Request::new(Op::Spawn)).await;
    assert_eq!(resp.message.as_deref(), Some("Unknown operation"));

    server.kill_and_join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_request_closes_silently() {
    let server = TestServer::start(&["/bin/cat"]).await;

    let raw = server.send_raw(b"this is not json").await;
    assert!(raw.is_empty(), "expected silent close, got: {raw:?}");

    // Server must still be serving
    let resp = server.send(Request::new(Op::Capture)).await;
    assert!(resp.is_ok());

    server.kill_and_join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_captures_see_consistent_grids() {
    let server = TestServer::start(&["/bin/cat"]).await;

    // Keep output flowing while captures run
    let typer = {
        let socket = server.socket.clone();
        tokio::spawn(async move {
            for i in 0..20 {
                let req = Request::new(Op::Type).with_payload(vec![format!("line {i}\n")]);
                let mut stream = UnixStream::connect(&socket).await.unwrap();
                stream
                    .write_all(&serde_json::to_vec(&req).unwrap())
                    .await
                    .unwrap();
                let mut resp = Vec::new();
                stream.read_to_end(&mut resp).await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
    };

    for _ in 0..5 {
        let (a, b) = tokio::join!(
            server.send(Request::new(Op::Capture)),
            server.send(Request::new(Op::Capture)),
        );
        for resp in [a, b] {
            assert!(resp.is_ok());
            let text = resp.data.unwrap();
            assert_eq!(text.matches('\n').count(), 30);
            for line in text.lines() {
                assert_eq!(line.chars().count(), 100);
            }
        }
    }

    typer.await.unwrap();
    server.kill_and_join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_kill_after_child_already_exited() {
    let server = TestServer::start(&["/bin/sh", "-c", "exit 0"]).await;

    let resp = server.send(Request::new(Op::Wait)).await;
    assert!(resp.is_ok());

    // Nothing left to kill; shutdown must still be orderly
    server.kill_and_join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_replaces_stale_socket() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join(".specter.sock");
    std::fs::write(&socket, b"stale").unwrap();

    let handle = tokio::spawn(server::run(
        socket.clone(),
        vec!["/bin/cat".to_string()],
    ));
    assert!(wait_for(|| socket.metadata().map(|m| m.len() == 0).unwrap_or(false), Duration::from_secs(2)).await);

    let mut stream = UnixStream::connect(&socket).await.unwrap();
    let req = Request::new(Op::Kill);
    stream
        .write_all(&serde_json::to_vec(&req).unwrap())
        .await
        .unwrap();
    let mut resp = Vec::new();
    stream.read_to_end(&mut resp).await.unwrap();
    let resp: Response = serde_json::from_slice(&resp).unwrap();
    assert!(resp.is_ok());

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_spawn_failure_cleans_up_socket() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join(".specter.sock");

    let result = server::run(socket.clone(), Vec::new()).await;
    assert!(result.is_err());
    assert!(!socket.exists(), "socket left behind after spawn failure");
}
