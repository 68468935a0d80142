use serde_json::json;

use crate::facade::{BrowserContext as _, Page as _};
use super::context;
use crate::daemon::dispatch::{ActionResult, DaemonError};
use crate::daemon::state::{DaemonState, Tab};
use crate::protocol::Request;

pub async fn tab_new(state: &mut DaemonState, req: &Request) -> ActionResult {
    let context = context(state)?;
    let page = context.new_page().await?;
    page.set_default_timeout(state.default_timeout_ms);
    if let Some(url) = req.str_param("url") {
        page.goto(url).await?;
    }
    let url = page.url().await.unwrap_or_default();
    state.tabs.push(Tab::new(page));
    state.active_tab = state.tabs.len() - 1;
    state.refs.clear();
    Ok(json!({ "index": state.active_tab, "url": url }))
}

pub async fn tab_list(state: &mut DaemonState) -> ActionResult {
    let mut tabs = Vec::new();
    for (index, tab) in state.tabs.iter().enumerate() {
        tabs.push(json!({
            "index": index,
            "url": tab.page.url().await.unwrap_or_default(),
            "title": tab.page.title().await.unwrap_or_default(),
            "active": index == state.active_tab,
        }));
    }
    Ok(json!({ "tabs": tabs }))
}

pub async fn tab_switch(state: &mut DaemonState, req: &Request) -> ActionResult {
    let index = req
        .i64_param("index")
        .ok_or_else(|| DaemonError::bad("Missing required parameter 'index'"))?;
    if index < 0 || index as usize >= state.tabs.len() {
        return Err(DaemonError::bad(format!(
            "no tab {} (have {})",
            index,
            state.tabs.len()
        )));
    }
    state.active_tab = index as usize;
    state.refs.clear();
    let page = state.tabs[state.active_tab].page.clone();
    page.bring_to_front().await?;
    Ok(json!({
        "index": state.active_tab,
        "url": page.url().await.unwrap_or_default(),
        "title": page.title().await.unwrap_or_default(),
    }))
}

pub async fn tab_close(state: &mut DaemonState, req: &Request) -> ActionResult {
    let index = match req.i64_param("index") {
        Some(i) if i < 0 || i as usize >= state.tabs.len() => {
            return Err(DaemonError::bad(format!(
                "no tab {} (have {})",
                i,
                state.tabs.len()
            )));
        }
        Some(i) => i as usize,
        None => state.active_tab,
    };
    let tab = state.tabs.remove(index);
    let _ = tab.page.close().await;
    if state.tabs.is_empty() {
        // Keep one blank tab so the session stays usable.
        let context = context(state)?;
        let page = context.new_page().await?;
        page.set_default_timeout(state.default_timeout_ms);
        state.tabs.push(Tab::new(page));
    }
    if state.active_tab >= state.tabs.len() {
        state.active_tab = state.tabs.len() - 1;
    }
    state.refs.clear();
    Ok(json!({ "closed_tab": index, "tabs": state.tabs.len() }))
}
