use serde_json::json;

use crate::facade::{Locator as _, Page as _};
use super::page;
use crate::daemon::dispatch::{required_selector, ActionResult, DaemonError};
use crate::daemon::state::DaemonState;
use crate::protocol::Request;

pub async fn get_text(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    let text = page(state)?.locator(selector).text().await?;
    Ok(json!({ "text": text }))
}

pub async fn get_html(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    let html = page(state)?.locator(selector).inner_html().await?;
    Ok(json!({ "html": html }))
}

pub async fn get_attribute(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    let name = req.required_str("attribute").map_err(DaemonError::bad)?;
    let value = page(state)?.locator(selector).get_attribute(name).await?;
    Ok(json!({ "value": value }))
}

pub async fn get_value(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    let value = page(state)?.locator(selector).input_value().await?;
    Ok(json!({ "value": value }))
}

pub async fn get_count(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    let count = page(state)?.locator(selector).count().await?;
    Ok(json!({ "count": count }))
}

pub async fn get_box(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    let bounds = page(state)?.locator(selector).bounding_box().await?;
    Ok(json!({ "box": bounds }))
}

pub async fn is_visible(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    let visible = page(state)?.locator(selector).is_visible().await?;
    Ok(json!({ "visible": visible }))
}

pub async fn is_enabled(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    let enabled = page(state)?.locator(selector).is_enabled().await?;
    Ok(json!({ "enabled": enabled }))
}

pub async fn is_checked(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    let checked = page(state)?.locator(selector).is_checked().await?;
    Ok(json!({ "checked": checked }))
}
