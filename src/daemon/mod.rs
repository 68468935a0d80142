//! Daemon server: owns the browser, serves one-line JSON commands on the
//! session's Unix socket.

pub mod actions;
pub mod devices;
pub mod dispatch;
pub mod snapshot;
pub mod state;

use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::facade::cdp::CdpEngine;
use crate::facade::BrowserEngine;
use crate::protocol::{Request, Response};
use crate::session;
use self::dispatch::dispatch;
use self::state::DaemonState;

/// Blocking daemon entry point, invoked via the hidden `daemon` subcommand.
/// Stdout/stderr are already redirected into the session log-file by the
/// client that spawned us.
pub fn run(session_name: &str, headless: bool) -> anyhow::Result<()> {
    let default_level = if std::env::var("SPEL_DEBUG").map(|v| v == "1").unwrap_or(false) {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    runtime.block_on(serve(session_name, headless, CdpEngine::new()))
}

/// Bind, accept, dispatch until a `close` response or a signal. Engine is
/// injected so tests can run the whole server against the fake facade.
pub async fn serve(
    session_name: &str,
    headless: bool,
    engine: Arc<dyn BrowserEngine>,
) -> anyhow::Result<()> {
    // Losing a start race must not touch the winner's files: bail before
    // deleting anything if a live daemon holds the session, and only claim
    // the pid-file once the bind succeeded.
    if session::daemon_running(session_name) {
        anyhow::bail!("session '{}' already has a live daemon", session_name);
    }
    let socket_path = session::socket_path(session_name);
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("could not bind {}", socket_path.display()))?;
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600));
    }
    session::write_pid_file(session_name).context("could not write pid-file")?;
    info!(target: "spel.daemon", session = session_name, socket = %socket_path.display(), headless, "daemon listening");

    let state = Arc::new(Mutex::new(DaemonState::new(
        session_name.to_string(),
        headless,
        engine,
    )));
    let shutdown = Arc::new(Notify::new());

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("SIGINT handler")?;

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let state = Arc::clone(&state);
                            let shutdown = Arc::clone(&shutdown);
                            tokio::spawn(async move {
                                handle_connection(stream, state, shutdown).await;
                            });
                        }
                        Err(e) => error!(target: "spel.daemon", "accept error: {}", e),
                    }
                }
                _ = shutdown.notified() => {
                    info!(target: "spel.daemon", "shutdown requested by client");
                    break;
                }
                _ = sigterm.recv() => {
                    info!(target: "spel.daemon", "received SIGTERM, shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    info!(target: "spel.daemon", "received SIGINT, shutting down");
                    break;
                }
            }
        }
    }

    // New clients fail fast from here on.
    drop(listener);
    let _ = std::fs::remove_file(&socket_path);

    // Idempotent when the close handler already tore the browser down; for
    // the signal path this flushes any in-flight trace first.
    state.lock().await.shutdown_browser().await;

    // A slow close can overlap a fresh daemon claiming the session; only
    // remove files that are still ours.
    if session::owns_pid_file(session_name) {
        session::cleanup(session_name);
    } else {
        warn!(target: "spel.daemon", "session files re-claimed by another daemon, leaving them");
    }
    info!(target: "spel.daemon", session = session_name, "daemon exited");
    Ok(())
}

/// One connection, one reader loop: line in, dispatch, line out. The
/// connection's commands are serialised by the state mutex; the daemon-wide
/// lock also serialises across connections in arrival order.
async fn handle_connection(
    stream: UnixStream,
    state: Arc<Mutex<DaemonState>>,
    shutdown: Arc<Notify>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match Request::parse(&line) {
            Ok(request) => {
                let mut state = state.lock().await;
                dispatch(&mut state, &request).await
            }
            Err(message) => Response::err(message),
        };

        let wants_shutdown = response.wants_shutdown();
        if writer.write_all(response.to_line().as_bytes()).await.is_err() {
            break;
        }
        let _ = writer.flush().await;
        if wants_shutdown {
            shutdown.notify_one();
            break;
        }
    }
}
