//! Session filesystem layout.
//!
//! Every named session owns four artifacts under the socket directory: a
//! Unix-domain socket, a pid-file, a log-file, and (optionally) a saved
//! storage-state file. At most one live daemon exists per session name; a
//! pid-file whose process is gone is stale and gets cleaned eagerly.

use std::env;
use std::fs;
use std::path::PathBuf;

/// Base directory for per-session sockets, pid-files, and logs.
/// Priority: SPEL_SOCKET_DIR > XDG_RUNTIME_DIR > tmpdir.
pub fn socket_dir() -> PathBuf {
    if let Ok(dir) = env::var("SPEL_SOCKET_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        if !runtime_dir.is_empty() {
            return PathBuf::from(runtime_dir).join("spel");
        }
    }
    env::temp_dir()
}

pub fn socket_path(session: &str) -> PathBuf {
    socket_dir().join(format!("spel-{}.sock", session))
}

pub fn pid_file_path(session: &str) -> PathBuf {
    socket_dir().join(format!("spel-{}.pid", session))
}

pub fn log_file_path(session: &str) -> PathBuf {
    socket_dir().join(format!("spel-{}.log", session))
}

/// Saved storage-state for a named session (`--session-name`). Lives next to
/// the sockets so `state list` and auto-load agree on the location.
pub fn storage_state_path(name: &str) -> PathBuf {
    socket_dir().join(format!("spel-session-{}.json", name))
}

/// Idempotently delete the socket and pid-file. Log-file and storage-state
/// survive so they can be inspected after the daemon is gone.
pub fn cleanup(session: &str) {
    let _ = fs::remove_file(pid_file_path(session));
    let _ = fs::remove_file(socket_path(session));
}

/// True only if the pid-file exists and names this process.
pub fn owns_pid_file(session: &str) -> bool {
    match fs::read_to_string(pid_file_path(session)) {
        Ok(contents) => contents.trim().parse::<u32>() == Ok(std::process::id()),
        Err(_) => false,
    }
}

/// Write this process's pid. ASCII decimal, no trailing newline.
pub fn write_pid_file(session: &str) -> std::io::Result<()> {
    fs::create_dir_all(socket_dir())?;
    fs::write(pid_file_path(session), std::process::id().to_string())
}

/// Read the pid-file, if present and parseable.
pub fn read_pid(session: &str) -> Option<u32> {
    fs::read_to_string(pid_file_path(session))
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
}

#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(unix)]
pub fn kill_pid(pid: u32, force: bool) {
    let sig = if force { libc::SIGKILL } else { libc::SIGTERM };
    unsafe {
        libc::kill(pid as i32, sig);
    }
}

/// Pid-file exists and its process is alive. A stale pid-file is deleted
/// on the way out and the session reported as not running.
pub fn daemon_running(session: &str) -> bool {
    let pid_path = pid_file_path(session);
    if !pid_path.exists() {
        return false;
    }
    match read_pid(session) {
        Some(pid) if pid_alive(pid) => true,
        _ => {
            let _ = fs::remove_file(&pid_path);
            let _ = fs::remove_file(socket_path(session));
            false
        }
    }
}

/// Scan the socket directory for sessions whose daemon is alive.
pub fn list_live_sessions() -> Vec<String> {
    let mut sessions = Vec::new();
    if let Ok(entries) = fs::read_dir(socket_dir()) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(session) = name
                .strip_prefix("spel-")
                .and_then(|s| s.strip_suffix(".pid"))
            else {
                continue;
            };
            if session.is_empty() || session.starts_with("session-") {
                continue;
            }
            if let Some(pid) = read_pid(session) {
                if pid_alive(pid) {
                    sessions.push(session.to_string());
                }
            }
        }
    }
    sessions.sort();
    sessions
}

/// Session names become filenames, so anything path-ish is rejected before a
/// daemon gets spawned for it.
pub fn is_valid_session_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn session_name_error(name: &str) -> String {
    format!(
        "Invalid session name '{}': use only letters, digits, '-' and '_' (max 64 chars)",
        name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    // Env mutation must not interleave across tests.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvGuard<'a> {
        _lock: MutexGuard<'a, ()>,
        vars: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(var_names: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap();
            let vars = var_names
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { _lock: lock, vars }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_socket_dir_explicit_override() {
        let _guard = EnvGuard::new(&["SPEL_SOCKET_DIR", "XDG_RUNTIME_DIR"]);
        env::set_var("SPEL_SOCKET_DIR", "/custom/socket/path");
        assert_eq!(socket_dir(), PathBuf::from("/custom/socket/path"));
    }

    #[test]
    fn test_socket_dir_ignores_empty_override() {
        let _guard = EnvGuard::new(&["SPEL_SOCKET_DIR", "XDG_RUNTIME_DIR"]);
        env::set_var("SPEL_SOCKET_DIR", "");
        env::set_var("XDG_RUNTIME_DIR", "/run/user/1000");
        assert_eq!(socket_dir(), PathBuf::from("/run/user/1000/spel"));
    }

    #[test]
    fn test_socket_dir_tmp_fallback() {
        let _guard = EnvGuard::new(&["SPEL_SOCKET_DIR", "XDG_RUNTIME_DIR"]);
        env::remove_var("SPEL_SOCKET_DIR");
        env::remove_var("XDG_RUNTIME_DIR");
        assert_eq!(socket_dir(), env::temp_dir());
    }

    #[test]
    fn test_artifact_paths_share_prefix() {
        let _guard = EnvGuard::new(&["SPEL_SOCKET_DIR", "XDG_RUNTIME_DIR"]);
        env::set_var("SPEL_SOCKET_DIR", "/tmp/spel-test");
        assert_eq!(
            socket_path("work"),
            PathBuf::from("/tmp/spel-test/spel-work.sock")
        );
        assert_eq!(
            pid_file_path("work"),
            PathBuf::from("/tmp/spel-test/spel-work.pid")
        );
        assert_eq!(
            log_file_path("work"),
            PathBuf::from("/tmp/spel-test/spel-work.log")
        );
        assert_eq!(
            storage_state_path("work"),
            PathBuf::from("/tmp/spel-test/spel-session-work.json")
        );
    }

    #[test]
    fn test_owns_pid_file() {
        let _guard = EnvGuard::new(&["SPEL_SOCKET_DIR", "XDG_RUNTIME_DIR"]);
        let dir = tempfile::tempdir().unwrap();
        env::set_var("SPEL_SOCKET_DIR", dir.path());

        assert!(!owns_pid_file("mine"));
        write_pid_file("mine").unwrap();
        assert!(owns_pid_file("mine"));

        fs::write(pid_file_path("other"), "999999").unwrap();
        assert!(!owns_pid_file("other"));
    }

    #[test]
    fn test_daemon_running_cleans_stale_pid() {
        let _guard = EnvGuard::new(&["SPEL_SOCKET_DIR", "XDG_RUNTIME_DIR"]);
        let dir = tempfile::tempdir().unwrap();
        env::set_var("SPEL_SOCKET_DIR", dir.path());

        // Very unlikely to be a live pid.
        fs::write(pid_file_path("stale"), "999999999").unwrap();
        fs::write(socket_path("stale"), "").unwrap();
        assert!(!daemon_running("stale"));
        assert!(!pid_file_path("stale").exists());
        assert!(!socket_path("stale").exists());
    }

    #[test]
    fn test_daemon_running_live_pid() {
        let _guard = EnvGuard::new(&["SPEL_SOCKET_DIR", "XDG_RUNTIME_DIR"]);
        let dir = tempfile::tempdir().unwrap();
        env::set_var("SPEL_SOCKET_DIR", dir.path());

        fs::write(pid_file_path("live"), std::process::id().to_string()).unwrap();
        assert!(daemon_running("live"));
        assert!(pid_file_path("live").exists());
    }

    #[test]
    fn test_cleanup_idempotent() {
        let _guard = EnvGuard::new(&["SPEL_SOCKET_DIR", "XDG_RUNTIME_DIR"]);
        let dir = tempfile::tempdir().unwrap();
        env::set_var("SPEL_SOCKET_DIR", dir.path());

        fs::write(pid_file_path("x"), "1").unwrap();
        cleanup("x");
        cleanup("x");
        assert!(!pid_file_path("x").exists());
    }

    #[test]
    fn test_session_name_validation() {
        assert!(is_valid_session_name("default"));
        assert!(is_valid_session_name("ci-run_2"));
        assert!(!is_valid_session_name(""));
        assert!(!is_valid_session_name("a/b"));
        assert!(!is_valid_session_name("a b"));
        assert!(!is_valid_session_name(&"x".repeat(65)));
    }
}
