use serde_json::json;

use super::page;
use crate::daemon::dispatch::{resolve_selector, ActionResult, DaemonError};
use crate::daemon::state::DaemonState;
use crate::facade::{LoadState, Page as _};
use crate::protocol::Request;

/// Dispatched by whichever of text / url / function / selector / state /
/// timeout is present, checked in that order.
pub async fn wait(state: &mut DaemonState, req: &Request) -> ActionResult {
    let timeout_ms = req
        .i64_param("waitTimeout")
        .map(|t| t.max(0) as u64)
        .unwrap_or(state.default_timeout_ms);

    if let Some(text) = req.str_param("text") {
        let needle = serde_json::to_string(text).unwrap_or_default();
        let js = format!(
            "(document.body && (document.body.innerText || '').includes({}))",
            needle
        );
        page(state)?.wait_for_function(&js, timeout_ms).await?;
        return Ok(json!({ "waited": "text", "text": text }));
    }
    if let Some(pattern) = req.str_param("url") {
        let url = page(state)?.wait_for_url(pattern, timeout_ms).await?;
        return Ok(json!({ "waited": "url", "url": url }));
    }
    if let Some(js) = req.str_param("function") {
        page(state)?.wait_for_function(js, timeout_ms).await?;
        return Ok(json!({ "waited": "function" }));
    }
    if let Some(raw) = req.str_param("selector") {
        let selector = resolve_selector(state, raw)?;
        page(state)?.wait_for_selector(&selector, timeout_ms).await?;
        return Ok(json!({ "waited": "selector", "selector": raw }));
    }
    if let Some(name) = req.str_param("state") {
        let load_state = LoadState::parse(name).ok_or_else(|| {
            DaemonError::bad(format!(
                "invalid load state '{}' (load|domcontentloaded|networkidle)",
                name
            ))
        })?;
        page(state)?.wait_for_load_state(load_state, timeout_ms).await?;
        return Ok(json!({ "waited": "state", "state": name }));
    }
    if let Some(ms) = req.i64_param("timeout") {
        let ms = ms.max(0) as u64;
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        return Ok(json!({ "waited": "timeout", "ms": ms }));
    }
    Err(DaemonError::bad(
        "wait needs one of: selector, text, url, function, state, timeout",
    ))
}
