//! Client side of the session socket: locate or spawn the right daemon,
//! ship one JSON line, read one back.

use std::env;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;

use crate::flags::Flags;
use crate::protocol::Response;
use crate::session;

const MAX_RETRIES: u32 = 5;
const RETRY_DELAY_MS: u64 = 200;
const SPAWN_WAIT: Duration = Duration::from_secs(30);
const KILL_WAIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(100);
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Daemon unreachable: {0}")]
    Unreachable(String),
    #[error("Daemon did not respond within {0}ms")]
    Timeout(u64),
    #[error("{0}")]
    Io(String),
}

pub struct DaemonResult {
    pub already_running: bool,
}

/// Wait cap for a graceful restart of a headless daemon into headed mode.
fn restart_timeout() -> Duration {
    let ms = env::var("SPEL_RESTART_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10_000);
    Duration::from_millis(ms)
}

fn daemon_ready(session: &str) -> bool {
    UnixStream::connect(session::socket_path(session)).is_ok()
}

fn wait_for_pid_exit(pid: u32, cap: Duration) -> bool {
    let deadline = Instant::now() + cap;
    while Instant::now() < deadline {
        if !session::pid_alive(pid) {
            return true;
        }
        thread::sleep(POLL);
    }
    !session::pid_alive(pid)
}

/// Force-kill a daemon whose pid is alive but whose socket is dead, then
/// clean the session files.
fn kill_stale(session: &str) {
    if let Some(pid) = session::read_pid(session) {
        if session::pid_alive(pid) {
            eprintln!("warning: killing unresponsive daemon (pid {})", pid);
            session::kill_pid(pid, true);
            wait_for_pid_exit(pid, KILL_WAIT);
        }
    }
    session::cleanup(session);
}

/// Ask the daemon whether it was started headless. Best-effort single shot.
fn daemon_is_headless(session: &str, timeout_ms: u64) -> Option<bool> {
    let request = serde_json::json!({ "action": "session_info" });
    send_once(&request, session, timeout_ms)
        .ok()
        .and_then(|resp| resp.data)
        .and_then(|data| data.get("headless").and_then(|v| v.as_bool()))
}

/// Graceful close, then wait for the old pid to actually exit; escalate to
/// SIGKILL past the cap so at most one daemon serves the session.
fn restart_for_headed(session: &str, timeout_ms: u64) {
    let pid = session::read_pid(session);
    let request = serde_json::json!({ "action": "close" });
    let _ = send_once(&request, session, timeout_ms);
    if let Some(pid) = pid {
        if !wait_for_pid_exit(pid, restart_timeout()) {
            eprintln!(
                "warning: daemon (pid {}) did not exit gracefully, killing",
                pid
            );
            session::kill_pid(pid, true);
            wait_for_pid_exit(pid, KILL_WAIT);
        }
    }
    session::cleanup(session);
}

fn spawn_daemon(flags: &Flags) -> Result<(), ClientError> {
    let session = &flags.session;
    session::cleanup(session);

    let socket_dir = session::socket_dir();
    fs::create_dir_all(&socket_dir)
        .map_err(|e| ClientError::Io(format!("cannot create {}: {}", socket_dir.display(), e)))?;

    // Unix socket paths are capped at ~104 bytes including the terminator.
    let socket_path = session::socket_path(session);
    if socket_path.as_os_str().len() > 103 {
        return Err(ClientError::Io(format!(
            "Session name '{}' makes the socket path too long ({} bytes, max 103). \
             Use a shorter name or set SPEL_SOCKET_DIR.",
            session,
            socket_path.as_os_str().len()
        )));
    }

    let exe = env::current_exe()
        .map_err(|e| ClientError::Io(e.to_string()))?;
    let exe = exe.canonicalize().unwrap_or(exe);

    let log_path = session::log_file_path(session);
    let log = fs::File::create(&log_path)
        .map_err(|e| ClientError::Io(format!("cannot create {}: {}", log_path.display(), e)))?;
    let log_err = log
        .try_clone()
        .map_err(|e| ClientError::Io(e.to_string()))?;

    let mut cmd = Command::new(exe);
    cmd.arg("daemon").arg("--session").arg(session);
    if flags.interactive {
        cmd.arg("--headed");
    }
    if flags.debug {
        cmd.env("SPEL_DEBUG", "1");
    }

    // Detach into its own session so it survives this process and the tty.
    #[cfg(unix)]
    unsafe {
        use std::os::unix::process::CommandExt;
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .spawn()
        .map_err(|e| ClientError::Unreachable(format!("failed to start daemon: {}", e)))?;

    let deadline = Instant::now() + SPAWN_WAIT;
    while Instant::now() < deadline {
        if daemon_ready(session) {
            return Ok(());
        }
        thread::sleep(POLL);
    }
    Err(ClientError::Unreachable(format!(
        "daemon failed to start (socket {}, log {})",
        socket_path.display(),
        log_path.display()
    )))
}

/// Make sure a suitable daemon serves this session before any command goes
/// out: restart headed when `--interactive` meets a headless daemon, kill
/// stale pid/socket combos, spawn fresh otherwise.
pub fn ensure_daemon(flags: &Flags) -> Result<DaemonResult, ClientError> {
    let session = &flags.session;
    let timeout_ms = flags.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);

    if session::daemon_running(session) {
        if daemon_ready(session) {
            if flags.interactive && daemon_is_headless(session, timeout_ms) == Some(true) {
                restart_for_headed(session, timeout_ms);
                spawn_daemon(flags)?;
                return Ok(DaemonResult {
                    already_running: false,
                });
            }
            return Ok(DaemonResult {
                already_running: true,
            });
        }
        // Live pid, dead socket.
        kill_stale(session);
    }

    spawn_daemon(flags)?;
    Ok(DaemonResult {
        already_running: false,
    })
}

/// Errors worth retrying: the daemon is starting, restarting, or dropped the
/// connection between accept and reply.
fn is_transient_error(error: &str) -> bool {
    error.contains("os error 35") // EAGAIN (macOS)
        || error.contains("os error 11") // EAGAIN (Linux)
        || error.contains("WouldBlock")
        || error.contains("Resource temporarily unavailable")
        || error.contains("EOF")
        || error.contains("line 1 column 0") // empty response line
        || error.contains("Connection reset")
        || error.contains("Broken pipe")
        || error.contains("os error 54") // reset by peer (macOS)
        || error.contains("os error 104") // reset by peer (Linux)
        || error.contains("os error 2") // socket file gone
        || error.contains("os error 61") // refused (macOS)
        || error.contains("os error 111") // refused (Linux)
}

fn send_once(cmd: &Value, session: &str, timeout_ms: u64) -> Result<Response, ClientError> {
    let socket_path = session::socket_path(session);
    let stream = UnixStream::connect(&socket_path)
        .map_err(|e| ClientError::Io(format!("Failed to connect: {}", e)))?;
    stream
        .set_read_timeout(Some(Duration::from_millis(timeout_ms)))
        .ok();
    stream
        .set_write_timeout(Some(Duration::from_secs(5)))
        .ok();

    let mut line = serde_json::to_string(cmd).map_err(|e| ClientError::Io(e.to_string()))?;
    line.push('\n');

    let mut writer = &stream;
    writer
        .write_all(line.as_bytes())
        .map_err(|e| ClientError::Io(format!("Failed to send: {}", e)))?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line).map_err(|e| {
        if matches!(
            e.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ) {
            ClientError::Timeout(timeout_ms)
        } else {
            ClientError::Io(format!("Failed to read: {}", e))
        }
    })?;

    serde_json::from_str(&response_line)
        .map_err(|e| ClientError::Io(format!("Invalid response: {}", e)))
}

/// One command, one response. Retries transient failures with backoff,
/// re-ensuring the daemon each time; the second unresponsive round gets a
/// kill-stale first.
pub fn send_command(cmd: &Value, flags: &Flags) -> Result<Response, ClientError> {
    let timeout_ms = flags.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);

    let mut request = cmd.clone();
    let launch_flags = flags.to_launch_flags();
    if !launch_flags.is_empty() {
        request["_flags"] = Value::Object(launch_flags);
    }

    let mut last_error = String::new();
    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
            if attempt >= 2 {
                kill_stale(&flags.session);
            }
            ensure_daemon(flags)?;
        }
        match send_once(&request, &flags.session, timeout_ms) {
            Ok(response) => return Ok(response),
            Err(ClientError::Timeout(ms)) => return Err(ClientError::Timeout(ms)),
            Err(e) => {
                let text = e.to_string();
                if is_transient_error(&text) {
                    last_error = text;
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(ClientError::Unreachable(format!(
        "{} (after {} retries)",
        last_error, MAX_RETRIES
    )))
}

/// Log-file path surfaced in error hints.
pub fn log_path_for(session: &str) -> PathBuf {
    session::log_file_path(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient_error_eagain() {
        assert!(is_transient_error(
            "Failed to read: Resource temporarily unavailable (os error 11)"
        ));
        assert!(is_transient_error(
            "Failed to read: Resource temporarily unavailable (os error 35)"
        ));
    }

    #[test]
    fn test_is_transient_error_eof_and_empty() {
        assert!(is_transient_error(
            "Invalid response: EOF while parsing a value at line 1 column 0"
        ));
        assert!(is_transient_error(
            "Invalid response: expected value at line 1 column 0"
        ));
    }

    #[test]
    fn test_is_transient_error_connection_issues() {
        assert!(is_transient_error("Connection reset by peer (os error 104)"));
        assert!(is_transient_error("Broken pipe"));
        assert!(is_transient_error(
            "Failed to connect: No such file or directory (os error 2)"
        ));
        assert!(is_transient_error(
            "Failed to connect: Connection refused (os error 111)"
        ));
    }

    #[test]
    fn test_is_transient_error_non_transient() {
        assert!(!is_transient_error("Unknown command: foo"));
        assert!(!is_transient_error("Permission denied"));
        assert!(!is_transient_error("Parse error: unknown action 'x'"));
    }

    #[test]
    fn test_restart_timeout_default_and_override() {
        std::env::remove_var("SPEL_RESTART_TIMEOUT_MS");
        assert_eq!(restart_timeout(), Duration::from_millis(10_000));
        std::env::set_var("SPEL_RESTART_TIMEOUT_MS", "2500");
        assert_eq!(restart_timeout(), Duration::from_millis(2500));
        std::env::remove_var("SPEL_RESTART_TIMEOUT_MS");
    }
}
