//! Chromium process launch and devtools endpoint discovery.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::facade::{FacadeError, FacadeResult, LaunchOptions};

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

const CHROMIUM_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

fn find_executable(opts: &LaunchOptions) -> FacadeResult<PathBuf> {
    if let Some(path) = &opts.executable_path {
        if path.exists() {
            return Ok(path.clone());
        }
        return Err(FacadeError::Launch(format!(
            "executable not found: {}",
            path.display()
        )));
    }
    CHROMIUM_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| {
            FacadeError::Launch(
                "no chromium executable found; pass --executable-path or install chromium".into(),
            )
        })
}

pub struct LaunchedBrowser {
    pub child: Child,
    pub ws_url: String,
    /// Throwaway profile dir for non-persistent launches, removed on close.
    pub temp_profile: Option<PathBuf>,
}

pub async fn launch_browser(
    opts: &LaunchOptions,
    profile_dir: Option<&Path>,
) -> FacadeResult<LaunchedBrowser> {
    let executable = find_executable(opts)?;

    let (user_data_dir, temp_profile) = match profile_dir {
        Some(dir) => (dir.to_path_buf(), None),
        None => {
            let dir = std::env::temp_dir().join(format!("spel-profile-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir)?;
            (dir.clone(), Some(dir))
        }
    };

    let mut cmd = Command::new(&executable);
    cmd.arg("--remote-debugging-port=0")
        .arg(format!("--user-data-dir={}", user_data_dir.display()))
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-popup-blocking");
    if opts.headless {
        cmd.arg("--headless=new");
    }
    if let Some(proxy) = &opts.proxy {
        cmd.arg(format!("--proxy-server={}", proxy.server));
        if let Some(bypass) = &proxy.bypass {
            cmd.arg(format!("--proxy-bypass-list={}", bypass));
        }
    }
    for arg in &opts.args {
        cmd.arg(arg);
    }
    cmd.arg("about:blank");
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(false);

    info!(target: "spel.cdp", executable = %executable.display(), headless = opts.headless, "launching browser");
    let mut child = cmd
        .spawn()
        .map_err(|e| FacadeError::Launch(format!("{}: {}", executable.display(), e)))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| FacadeError::Launch("no stderr handle on browser process".into()))?;

    let ws_url = tokio::time::timeout(LAUNCH_TIMEOUT, async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "spel.cdp", "browser: {}", line);
            if let Some(rest) = line.strip_prefix("DevTools listening on ") {
                return Some(rest.trim().to_string());
            }
        }
        None
    })
    .await
    .map_err(|_| FacadeError::Launch("timed out waiting for devtools endpoint".into()))?
    .ok_or_else(|| {
        FacadeError::Launch("browser exited before announcing devtools endpoint".into())
    })?;

    Ok(LaunchedBrowser {
        child,
        ws_url,
        temp_profile,
    })
}

/// Resolve an `http(s)://` devtools address to its websocket debugger URL.
/// `ws(s)://` endpoints pass through untouched.
pub async fn resolve_ws_url(endpoint: &str) -> FacadeResult<String> {
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        return Ok(endpoint.to_string());
    }
    let version_url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    let body: serde_json::Value = reqwest::get(&version_url)
        .await
        .map_err(|e| FacadeError::Connect(format!("{}: {}", version_url, e)))?
        .json()
        .await
        .map_err(|e| FacadeError::Connect(format!("{}: {}", version_url, e)))?;
    body.get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| {
            FacadeError::Connect(format!("{} returned no webSocketDebuggerUrl", version_url))
        })
}
