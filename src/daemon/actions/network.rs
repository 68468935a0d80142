use serde_json::json;

use super::{context, page};
use crate::daemon::dispatch::{ActionResult, DaemonError};
use crate::daemon::state::DaemonState;
use crate::facade::{glob_match, BrowserContext as _, Cookie, Page as _, RouteAction};
use crate::protocol::Request;

pub async fn cookies_get(state: &mut DaemonState) -> ActionResult {
    let cookies = context(state)?.cookies().await?;
    Ok(json!({ "cookies": cookies }))
}

pub async fn cookies_set(state: &mut DaemonState, req: &Request) -> ActionResult {
    let raw = req
        .params
        .get("cookies")
        .cloned()
        .ok_or_else(|| DaemonError::bad("Missing required parameter 'cookies'"))?;
    let mut cookies: Vec<Cookie> = serde_json::from_value(raw)
        .map_err(|e| DaemonError::bad(format!("invalid cookies payload: {}", e)))?;

    // Bare name/value pairs inherit the current page's host.
    let current_host = match state.page() {
        Some(page) => page
            .url()
            .await
            .ok()
            .and_then(|u| url::Url::parse(&u).ok())
            .and_then(|u| u.host_str().map(String::from)),
        None => None,
    };
    for cookie in &mut cookies {
        if cookie.domain.is_none() {
            cookie.domain = current_host.clone();
        }
        if cookie.path.is_none() {
            cookie.path = Some("/".to_string());
        }
    }
    let count = cookies.len();
    context(state)?.add_cookies(cookies).await?;
    Ok(json!({ "set": count }))
}

pub async fn cookies_clear(state: &mut DaemonState) -> ActionResult {
    context(state)?.clear_cookies().await?;
    Ok(json!({ "cleared": true }))
}

fn storage_object(req: &Request) -> Result<&'static str, DaemonError> {
    match req.str_param("type") {
        Some("local") | None => Ok("localStorage"),
        Some("session") => Ok("sessionStorage"),
        Some(other) => Err(DaemonError::bad(format!(
            "invalid storage type '{}' (local|session)",
            other
        ))),
    }
}

pub async fn storage_get(state: &mut DaemonState, req: &Request) -> ActionResult {
    let store = storage_object(req)?;
    match req.str_param("key") {
        Some(key) => {
            let js = format!(
                "{}.getItem({})",
                store,
                serde_json::to_string(key).unwrap_or_default()
            );
            let value = page(state)?.evaluate(&js).await?;
            Ok(json!({ "value": value }))
        }
        None => {
            let js = format!(
                "(function () {{ const out = {{}}; \
                 for (let i = 0; i < {store}.length; i++) {{ \
                   const k = {store}.key(i); out[k] = {store}.getItem(k); \
                 }} return out; }})()",
                store = store
            );
            let items = page(state)?.evaluate(&js).await?;
            Ok(json!({ "items": items }))
        }
    }
}

pub async fn storage_set(state: &mut DaemonState, req: &Request) -> ActionResult {
    let store = storage_object(req)?;
    let key = req.required_str("key").map_err(DaemonError::bad)?;
    let value = req.required_str("value").map_err(DaemonError::bad)?;
    let js = format!(
        "{}.setItem({}, {}); true",
        store,
        serde_json::to_string(key).unwrap_or_default(),
        serde_json::to_string(value).unwrap_or_default()
    );
    page(state)?.evaluate(&js).await?;
    Ok(json!({ "set": true }))
}

pub async fn storage_clear(state: &mut DaemonState, req: &Request) -> ActionResult {
    let store = storage_object(req)?;
    let js = format!("{}.clear(); true", store);
    page(state)?.evaluate(&js).await?;
    Ok(json!({ "cleared": true }))
}

pub async fn route(state: &mut DaemonState, req: &Request) -> ActionResult {
    let pattern = req.required_str("url").map_err(DaemonError::bad)?.to_string();
    let action = if req.bool_param("abort") {
        RouteAction::Abort
    } else if let Some(body) = req.str_param("body") {
        RouteAction::Fulfill {
            status: req.i64_param("status").unwrap_or(200) as u16,
            content_type: req.str_param("contentType").map(String::from),
            body: body.to_string(),
        }
    } else {
        RouteAction::Continue
    };
    let kind = match &action {
        RouteAction::Abort => "abort",
        RouteAction::Fulfill { .. } => "fulfill",
        RouteAction::Continue => "continue",
    };

    let page = state
        .page()
        .ok_or_else(|| DaemonError::bad("browser not started"))?;
    page.route(&pattern, action).await?;
    state.routes.retain(|(p, _)| p != &pattern);
    state.routes.push((pattern.clone(), kind.to_string()));
    Ok(json!({ "routed": pattern, "kind": kind }))
}

pub async fn unroute(state: &mut DaemonState, req: &Request) -> ActionResult {
    let pattern = req.str_param("url");
    let page = state
        .page()
        .ok_or_else(|| DaemonError::bad("browser not started"))?;
    page.unroute(pattern).await?;
    let before = state.routes.len();
    match pattern {
        Some(p) => state.routes.retain(|(pat, _)| pat != p),
        None => state.routes.clear(),
    }
    Ok(json!({ "unrouted": before - state.routes.len() }))
}

pub async fn requests(state: &mut DaemonState, req: &Request) -> ActionResult {
    let filter = req.str_param("filter");
    let type_filter = req.str_param("type");
    let method_filter = req.str_param("method").map(|m| m.to_uppercase());
    let status_filter = req.str_param("status");

    let entries: Vec<_> = state
        .requests
        .iter()
        .filter(|r| filter.map(|f| glob_match(f, &r.url)).unwrap_or(true))
        .filter(|r| {
            type_filter
                .map(|t| r.resource_type.eq_ignore_ascii_case(t))
                .unwrap_or(true)
        })
        .filter(|r| {
            method_filter
                .as_deref()
                .map(|m| r.method == m)
                .unwrap_or(true)
        })
        .filter(|r| {
            status_filter
                .map(|s| r.status.to_string().starts_with(s))
                .unwrap_or(true)
        })
        .cloned()
        .collect();

    Ok(json!({
        "requests": entries,
        "count": entries.len(),
        "dropped": state.requests.dropped(),
    }))
}

pub async fn clear(state: &mut DaemonState) -> ActionResult {
    state.requests.clear();
    Ok(json!({ "cleared": true }))
}
