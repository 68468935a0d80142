use serde_json::json;

use crate::facade::BrowserContext as _;
use super::context;
use crate::daemon::dispatch::{ActionResult, DaemonError};
use crate::daemon::state::DaemonState;
use crate::protocol::Request;

pub async fn trace_start(state: &mut DaemonState) -> ActionResult {
    if state.tracing {
        return Err(DaemonError::bad("tracing is already active"));
    }
    context(state)?.trace_start().await?;
    state.tracing = true;
    Ok(json!({ "started": true }))
}

pub async fn trace_stop(state: &mut DaemonState, req: &Request) -> ActionResult {
    if !state.tracing {
        return Err(DaemonError::bad("tracing is not active"));
    }
    let path = match req.str_param("path") {
        Some(p) => std::path::PathBuf::from(p),
        None => {
            let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
            std::env::temp_dir().join(format!("spel-trace-{}.zip", stamp))
        }
    };
    context(state)?.trace_stop(&path).await?;
    state.tracing = false;
    Ok(json!({ "path": path.display().to_string() }))
}

pub async fn console_get(state: &mut DaemonState) -> ActionResult {
    Ok(json!({
        "messages": state.console.to_vec(),
        "dropped": state.console.dropped(),
    }))
}

pub async fn console_clear(state: &mut DaemonState) -> ActionResult {
    state.console.clear();
    Ok(json!({ "cleared": true }))
}

/// Begin a fresh capture window: clear and confirm.
pub async fn console_start(state: &mut DaemonState) -> ActionResult {
    state.console.clear();
    Ok(json!({ "started": true }))
}

pub async fn errors_get(state: &mut DaemonState) -> ActionResult {
    Ok(json!({
        "errors": state.page_errors.to_vec(),
        "dropped": state.page_errors.dropped(),
    }))
}

pub async fn errors_clear(state: &mut DaemonState) -> ActionResult {
    state.page_errors.clear();
    Ok(json!({ "cleared": true }))
}

pub async fn errors_start(state: &mut DaemonState) -> ActionResult {
    state.page_errors.clear();
    Ok(json!({ "started": true }))
}
