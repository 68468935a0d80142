//! Serve-loop behavior over a real Unix socket, with the fake facade in
//! place of a browser. Env-dependent paths are serialised across tests.

use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use spel::daemon::serve;
use spel::facade::fake::FakeEngine;
use spel::protocol::Response;
use spel::session;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

struct SocketDirGuard {
    _lock: std::sync::MutexGuard<'static, ()>,
    _dir: tempfile::TempDir,
}

fn use_temp_socket_dir() -> SocketDirGuard {
    let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("SPEL_SOCKET_DIR", dir.path());
    SocketDirGuard { _lock: lock, _dir: dir }
}

async fn wait_for_socket(session: &str) {
    let path = session::socket_path(session);
    for _ in 0..100 {
        if UnixStream::connect(&path).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("daemon socket never became connectable: {}", path.display());
}

async fn round_trip(stream: &mut UnixStream, line: &str) -> Response {
    stream.write_all(line.as_bytes()).await.unwrap();
    stream.write_all(b"\n").await.unwrap();
    stream.flush().await.unwrap();
    let (reader, _) = stream.split();
    let mut lines = BufReader::new(reader).lines();
    let response_line = lines
        .next_line()
        .await
        .unwrap()
        .expect("daemon closed without responding");
    assert!(
        !response_line.contains('\n'),
        "response must be a single line"
    );
    serde_json::from_str(&response_line).expect("response must be valid JSON")
}

#[tokio::test]
async fn test_socket_round_trip_parse_error_and_shutdown() {
    let _guard = use_temp_socket_dir();
    let session = "sock-rt";

    let server = tokio::spawn(serve(session, true, FakeEngine::new()));
    wait_for_socket(session).await;
    assert!(session::pid_file_path(session).exists());

    // One command per connection round.
    let mut conn = UnixStream::connect(session::socket_path(session)).await.unwrap();
    let nav = round_trip(
        &mut conn,
        r#"{"action":"navigate","url":"https://example.com"}"#,
    )
    .await;
    assert!(nav.success);
    assert_eq!(nav.data.unwrap()["url"], "https://example.com/");

    // Malformed JSON produces a parse error, not a dropped connection.
    let garbage = round_trip(&mut conn, "this is not json").await;
    assert!(!garbage.success);
    assert!(garbage.error.unwrap().starts_with("Parse error"));

    // The same connection still serves further commands.
    let url = round_trip(&mut conn, r#"{"action":"url"}"#).await;
    assert!(url.success);

    let closed = round_trip(&mut conn, r#"{"action":"close"}"#).await;
    assert!(closed.success);
    assert_eq!(closed.data.unwrap()["shutdown"], true);

    tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("daemon did not exit after close")
        .unwrap()
        .unwrap();

    assert!(!session::socket_path(session).exists());
    assert!(!session::pid_file_path(session).exists());
}

#[tokio::test]
async fn test_commands_on_distinct_connections_are_serialised() {
    let _guard = use_temp_socket_dir();
    let session = "sock-multi";

    let server = tokio::spawn(serve(session, true, FakeEngine::new()));
    wait_for_socket(session).await;

    let mut first = UnixStream::connect(session::socket_path(session)).await.unwrap();
    let nav = round_trip(&mut first, r#"{"action":"navigate","url":"https://a.dev"}"#).await;
    assert!(nav.success);

    // A second client observes the effects of the first.
    let mut second = UnixStream::connect(session::socket_path(session)).await.unwrap();
    let url = round_trip(&mut second, r#"{"action":"url"}"#).await;
    assert_eq!(url.data.unwrap()["url"], "https://a.dev/");

    let closed = round_trip(&mut second, r#"{"action":"close"}"#).await;
    assert!(closed.success);
    let _ = tokio::time::timeout(Duration::from_secs(10), server).await;
}

#[tokio::test]
async fn test_second_daemon_for_same_session_loses_cleanly() {
    let _guard = use_temp_socket_dir();
    let session = "sock-unique";

    let server = tokio::spawn(serve(session, true, FakeEngine::new()));
    wait_for_socket(session).await;
    let winner_pid = session::read_pid(session).expect("winner wrote its pid");

    // The loser must error out without touching the winner's files.
    let loser = serve(session, true, FakeEngine::new()).await;
    assert!(loser.is_err());
    assert_eq!(session::read_pid(session), Some(winner_pid));

    let mut conn = UnixStream::connect(session::socket_path(session)).await.unwrap();
    let info = round_trip(&mut conn, r#"{"action":"session_info"}"#).await;
    assert!(info.success);

    let closed = round_trip(&mut conn, r#"{"action":"close"}"#).await;
    assert!(closed.success);
    let _ = tokio::time::timeout(Duration::from_secs(10), server).await;
}

#[tokio::test]
async fn test_stale_socket_file_is_replaced_on_startup() {
    let _guard = use_temp_socket_dir();
    let session = "sock-stale";

    // Leftovers from a crashed daemon: a dead pid and an unconnectable
    // socket file.
    std::fs::create_dir_all(session::socket_dir()).unwrap();
    std::fs::write(session::pid_file_path(session), "999999999").unwrap();
    std::fs::write(session::socket_path(session), "").unwrap();

    let server = tokio::spawn(serve(session, true, FakeEngine::new()));
    wait_for_socket(session).await;

    let mut conn = UnixStream::connect(session::socket_path(session)).await.unwrap();
    let info = round_trip(&mut conn, r#"{"action":"session_info"}"#).await;
    assert!(info.success);
    assert_eq!(info.data.unwrap()["session"], session);

    let closed = round_trip(&mut conn, r#"{"action":"close"}"#).await;
    assert!(closed.success);
    let _ = tokio::time::timeout(Duration::from_secs(10), server).await;
}
