use serde_json::{json, Value};

use crate::facade::Page as _;
use super::page;
use crate::daemon::actions::snap;
use crate::daemon::dispatch::{ActionResult, DaemonError};
use crate::daemon::snapshot::SnapshotFilters;
use crate::daemon::state::DaemonState;
use crate::protocol::Request;

pub async fn navigate(state: &mut DaemonState, req: &Request) -> ActionResult {
    let url = req.required_str("url").map_err(DaemonError::bad)?.to_string();
    let page = page(state)?;
    page.goto(&url).await?;
    state.refs.clear();

    let final_url = page.url().await?;
    let title = page.title().await.unwrap_or_default();
    // A fresh snapshot rides along so agent callers see the page in one trip.
    let snapshot = match snap::capture(state, None, &SnapshotFilters::default()).await {
        Ok((tree, _)) => Value::String(tree),
        Err(_) => Value::Null,
    };
    Ok(json!({ "url": final_url, "title": title, "snapshot": snapshot }))
}

pub async fn back(state: &mut DaemonState) -> ActionResult {
    let page = page(state)?;
    let moved = page.go_back().await?;
    state.refs.clear();
    Ok(json!({
        "url": page.url().await?,
        "title": page.title().await.unwrap_or_default(),
        "moved": moved,
    }))
}

pub async fn forward(state: &mut DaemonState) -> ActionResult {
    let page = page(state)?;
    let moved = page.go_forward().await?;
    state.refs.clear();
    Ok(json!({
        "url": page.url().await?,
        "title": page.title().await.unwrap_or_default(),
        "moved": moved,
    }))
}

pub async fn reload(state: &mut DaemonState) -> ActionResult {
    let page = page(state)?;
    page.reload().await?;
    state.refs.clear();
    Ok(json!({
        "url": page.url().await?,
        "title": page.title().await.unwrap_or_default(),
    }))
}

pub async fn url(state: &mut DaemonState) -> ActionResult {
    let page = page(state)?;
    Ok(json!({ "url": page.url().await? }))
}

pub async fn title(state: &mut DaemonState) -> ActionResult {
    let page = page(state)?;
    Ok(json!({ "title": page.title().await? }))
}

pub async fn content(state: &mut DaemonState) -> ActionResult {
    let page = page(state)?;
    Ok(json!({ "html": page.content().await? }))
}
