use serde_json::json;

use crate::daemon::dispatch::{ActionResult, DaemonError};
use crate::daemon::state::DaemonState;
use crate::facade::Page as _;
use crate::protocol::Request;
use crate::session;

pub async fn session_list(_state: &mut DaemonState) -> ActionResult {
    Ok(json!({ "sessions": session::list_live_sessions() }))
}

pub async fn session_info(state: &mut DaemonState) -> ActionResult {
    let url = match state.page() {
        Some(page) => page.url().await.ok(),
        None => None,
    };
    Ok(json!({
        "session": state.session,
        "headless": state.headless,
        "browser": state.browser.is_some(),
        "url": url,
        "tabs": state.tabs.len(),
        "refs": state.refs.len(),
        "tracing": state.tracing,
        "timeout": state.default_timeout_ms,
    }))
}

pub async fn connect(state: &mut DaemonState, req: &Request) -> ActionResult {
    let endpoint = req.required_str("endpoint").map_err(DaemonError::bad)?;
    state.connect_over_cdp(endpoint).await?;
    state
        .launch_flags
        .insert("cdp".into(), serde_json::Value::String(endpoint.into()));
    Ok(json!({ "connected": endpoint }))
}

/// The response carries the reserved shutdown flag; the serve loop exits
/// after flushing it.
pub async fn close(state: &mut DaemonState) -> ActionResult {
    state.shutdown_browser().await;
    Ok(json!({ "closed": true, "shutdown": true }))
}
