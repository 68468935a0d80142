use std::path::PathBuf;

use serde_json::json;

use crate::facade::{Locator as _, Page as _};
use super::page;
use crate::daemon::dispatch::{required_selector, resolve_selector, ActionResult, DaemonError};
use crate::daemon::state::DaemonState;
use crate::protocol::Request;

pub async fn click(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    page(state)?.locator(selector.clone()).click().await?;
    Ok(json!({ "clicked": true, "selector": selector.describe() }))
}

pub async fn dblclick(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    page(state)?.locator(selector.clone()).dblclick().await?;
    Ok(json!({ "clicked": true, "selector": selector.describe() }))
}

pub async fn fill(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    let value = req.required_str("value").map_err(DaemonError::bad)?;
    page(state)?.locator(selector).fill(value).await?;
    Ok(json!({ "filled": true }))
}

pub async fn type_text(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    let text = req.required_str("text").map_err(DaemonError::bad)?;
    page(state)?.locator(selector).type_text(text).await?;
    Ok(json!({ "typed": text.chars().count() }))
}

pub async fn press(state: &mut DaemonState, req: &Request) -> ActionResult {
    let key = req.required_str("key").map_err(DaemonError::bad)?;
    match req.str_param("selector") {
        Some(raw) => {
            let selector = resolve_selector(state, raw)?;
            page(state)?.locator(selector).press(key).await?;
        }
        None => page(state)?.press_key(key).await?,
    }
    Ok(json!({ "pressed": key }))
}

pub async fn keydown(state: &mut DaemonState, req: &Request) -> ActionResult {
    let key = req.required_str("key").map_err(DaemonError::bad)?;
    page(state)?.key_down(key).await?;
    Ok(json!({ "down": key }))
}

pub async fn keyup(state: &mut DaemonState, req: &Request) -> ActionResult {
    let key = req.required_str("key").map_err(DaemonError::bad)?;
    page(state)?.key_up(key).await?;
    Ok(json!({ "up": key }))
}

pub async fn hover(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    page(state)?.locator(selector).hover().await?;
    Ok(json!({ "hovered": true }))
}

pub async fn check(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    page(state)?.locator(selector).check().await?;
    Ok(json!({ "checked": true }))
}

pub async fn uncheck(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    page(state)?.locator(selector).uncheck().await?;
    Ok(json!({ "checked": false }))
}

pub async fn select(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    let value = req.required_str("value").map_err(DaemonError::bad)?;
    page(state)?.locator(selector).select_option(value).await?;
    Ok(json!({ "selected": value }))
}

pub async fn focus(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    page(state)?.locator(selector).focus().await?;
    Ok(json!({ "focused": true }))
}

pub async fn clear(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    page(state)?.locator(selector).clear().await?;
    Ok(json!({ "cleared": true }))
}

pub async fn drag(state: &mut DaemonState, req: &Request) -> ActionResult {
    let source_raw = req.required_str("source").map_err(DaemonError::bad)?;
    let target_raw = req.required_str("target").map_err(DaemonError::bad)?;
    let source = resolve_selector(state, source_raw)?;
    let target = resolve_selector(state, target_raw)?;
    let page = page(state)?;
    let target_locator = page.locator(target);
    page.locator(source).drag_to(&*target_locator).await?;
    Ok(json!({ "dragged": true }))
}

pub async fn upload(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    let files: Vec<PathBuf> = req
        .params
        .get("files")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default();
    if files.is_empty() {
        return Err(DaemonError::bad("Missing required parameter 'files'"));
    }
    for file in &files {
        if !file.exists() {
            return Err(DaemonError::bad(format!(
                "file not found: {}",
                file.display()
            )));
        }
    }
    page(state)?.locator(selector).set_input_files(&files).await?;
    Ok(json!({ "uploaded": files.len() }))
}

pub async fn scroll(state: &mut DaemonState, req: &Request) -> ActionResult {
    let direction = req.str_param("direction").unwrap_or("down");
    let amount = req.i64_param("amount").unwrap_or(300) as f64;
    let (dx, dy) = match direction {
        "up" => (0.0, -amount),
        "down" => (0.0, amount),
        "left" => (-amount, 0.0),
        "right" => (amount, 0.0),
        other => {
            return Err(DaemonError::bad(format!(
                "invalid scroll direction '{}' (up|down|left|right)",
                other
            )))
        }
    };
    match req.str_param("selector") {
        Some(raw) => {
            let selector = resolve_selector(state, raw)?;
            page(state)?.locator(selector).scroll_by(dx, dy).await?;
        }
        None => {
            let js = format!("window.scrollBy({}, {}); true", dx, dy);
            page(state)?.evaluate(&js).await?;
        }
    }
    Ok(json!({ "scrolled": direction, "amount": amount }))
}

pub async fn scroll_into_view(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    page(state)?.locator(selector).scroll_into_view().await?;
    Ok(json!({ "scrolled": true }))
}

pub async fn highlight(state: &mut DaemonState, req: &Request) -> ActionResult {
    let selector = required_selector(state, req)?;
    page(state)?.locator(selector).highlight().await?;
    Ok(json!({ "highlighted": true }))
}

pub async fn mouse_move(state: &mut DaemonState, req: &Request) -> ActionResult {
    let x = req.f64_param("x").ok_or_else(|| DaemonError::bad("Missing required parameter 'x'"))?;
    let y = req.f64_param("y").ok_or_else(|| DaemonError::bad("Missing required parameter 'y'"))?;
    page(state)?.mouse_move(x, y).await?;
    Ok(json!({ "x": x, "y": y }))
}

pub async fn mouse_down(state: &mut DaemonState, req: &Request) -> ActionResult {
    let button = req.str_param("button").unwrap_or("left");
    page(state)?.mouse_down(button).await?;
    Ok(json!({ "button": button, "down": true }))
}

pub async fn mouse_up(state: &mut DaemonState, req: &Request) -> ActionResult {
    let button = req.str_param("button").unwrap_or("left");
    page(state)?.mouse_up(button).await?;
    Ok(json!({ "button": button, "down": false }))
}

pub async fn mouse_wheel(state: &mut DaemonState, req: &Request) -> ActionResult {
    let delta_x = req.f64_param("deltaX").unwrap_or(0.0);
    let delta_y = req.f64_param("deltaY").unwrap_or(100.0);
    page(state)?.mouse_wheel(delta_x, delta_y).await?;
    Ok(json!({ "deltaX": delta_x, "deltaY": delta_y }))
}
