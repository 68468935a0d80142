//! Action dispatch: the closed table mapping action names to handlers, and
//! the frame every invocation passes through (flag merge, lazy browser
//! start, page guard, selector resolution, error conversion).

use serde_json::Value;
use thiserror::Error;

use crate::daemon::actions;
use crate::daemon::snapshot::{self, REF_ATTR};
use crate::daemon::state::DaemonState;
use crate::facade::{FacadeError, Page as _, Selector};
use crate::protocol::{Request, Response};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("No page loaded. Run 'open <url>' first.")]
    NoPage,
    #[error("{0}")]
    UnknownRef(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Facade(#[from] FacadeError),
}

pub type ActionResult = Result<Value, DaemonError>;

impl DaemonError {
    pub fn bad(message: impl Into<String>) -> Self {
        DaemonError::BadRequest(message.into())
    }
}

/// Turn a `@eN` ref or raw selector into a facade selector. Refs must be in
/// the current table; anything else passes through as CSS.
pub fn resolve_selector(state: &DaemonState, raw: &str) -> Result<Selector, DaemonError> {
    if snapshot::looks_like_ref(raw) {
        let id = state.refs.resolve(raw).map_err(DaemonError::UnknownRef)?;
        return Ok(Selector::Css(format!("[{}=\"{}\"]", REF_ATTR, id)));
    }
    Ok(Selector::Css(raw.to_string()))
}

pub fn required_selector(state: &DaemonState, req: &Request) -> Result<Selector, DaemonError> {
    let raw = req.required_str("selector").map_err(DaemonError::bad)?;
    resolve_selector(state, raw)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Needs {
    /// Pure daemon state; never starts a browser.
    Nothing,
    /// Browser must be up, but no navigated page required.
    Browser,
    /// A page must have been navigated past about:blank.
    Page,
}

fn classify(action: &str) -> Option<Needs> {
    let needs = match action {
        "session_info" | "session_list" | "console_get" | "console_clear" | "console_start"
        | "errors_get" | "errors_clear" | "errors_start" | "network_requests"
        | "network_clear" | "state_list" | "state_show" | "state_rename" | "state_clear"
        | "state_clean" | "connect" | "close" => Needs::Nothing,

        "navigate" | "tab_new" | "tab_list" | "tab_switch" | "tab_close" | "set_viewport"
        | "set_device" | "set_geo" | "set_offline" | "set_headers" | "set_media"
        | "set_credentials" | "cookies_get" | "cookies_set" | "cookies_clear"
        | "network_route" | "network_unroute" | "dialog_accept" | "dialog_dismiss"
        | "trace_start" | "trace_stop" | "state_save" | "state_load" => Needs::Browser,

        "back" | "forward" | "reload" | "url" | "title" | "content" | "snapshot" | "annotate"
        | "unannotate" | "clear_refs" | "click" | "dblclick" | "fill" | "type" | "press"
        | "keydown" | "keyup" | "hover" | "check" | "uncheck" | "select" | "focus" | "clear"
        | "drag" | "upload" | "scroll" | "scrollintoview" | "highlight" | "mouse_move"
        | "mouse_down" | "mouse_up" | "mouse_wheel" | "screenshot" | "pdf" | "evaluate"
        | "get_text" | "get_html" | "get_attribute" | "get_value" | "get_count" | "get_box"
        | "bounding_box" | "count" | "is_visible" | "is_enabled" | "is_checked" | "find"
        | "wait" | "storage_get" | "storage_set" | "storage_clear" | "frame_switch"
        | "frame_list" => Needs::Page,

        _ => return None,
    };
    Some(needs)
}

/// The dispatch frame. Every request, whatever happens inside, produces
/// exactly one single-line response and never tears the daemon down.
pub async fn dispatch(state: &mut DaemonState, req: &Request) -> Response {
    if !req.flags.is_empty() {
        state.merge_flags(&req.flags);
        if let Some(timeout) = req
            .flags
            .get("timeout")
            .and_then(|v| v.as_str().map(String::from).or_else(|| v.as_u64().map(|n| n.to_string())))
            .and_then(|s| s.parse::<u64>().ok())
        {
            state.default_timeout_ms = timeout;
            if let Some(page) = state.page() {
                page.set_default_timeout(timeout);
            }
        }
    }
    state.drain_events();

    let Some(needs) = classify(&req.action) else {
        return Response::err(format!("Parse error: unknown action '{}'", req.action));
    };

    if needs != Needs::Nothing {
        if let Err(e) = state.ensure_browser().await {
            return Response::err(e.to_string());
        }
    }
    if needs == Needs::Page {
        match state.page() {
            None => return Response::err(DaemonError::NoPage.to_string()),
            Some(page) => match page.url().await {
                Ok(url) if url == "about:blank" || url.is_empty() => {
                    return Response::err(DaemonError::NoPage.to_string());
                }
                Ok(_) => {}
                Err(e) => return Response::err(e.to_string()),
            },
        }
    }

    let result = route(state, req).await;
    state.drain_events();
    match result {
        Ok(data) => Response::ok(data),
        Err(e) => Response::err(e.to_string()),
    }
}

async fn route(state: &mut DaemonState, req: &Request) -> ActionResult {
    match req.action.as_str() {
        // Navigation
        "navigate" => actions::nav::navigate(state, req).await,
        "back" => actions::nav::back(state).await,
        "forward" => actions::nav::forward(state).await,
        "reload" => actions::nav::reload(state).await,
        "url" => actions::nav::url(state).await,
        "title" => actions::nav::title(state).await,
        "content" => actions::nav::content(state).await,

        // Snapshot / annotate
        "snapshot" => actions::snap::snapshot(state, req).await,
        "annotate" => actions::snap::annotate(state, req).await,
        "unannotate" => actions::snap::unannotate(state).await,
        "clear_refs" => actions::snap::clear_refs(state).await,

        // Interaction
        "click" => actions::interact::click(state, req).await,
        "dblclick" => actions::interact::dblclick(state, req).await,
        "fill" => actions::interact::fill(state, req).await,
        "type" => actions::interact::type_text(state, req).await,
        "press" => actions::interact::press(state, req).await,
        "keydown" => actions::interact::keydown(state, req).await,
        "keyup" => actions::interact::keyup(state, req).await,
        "hover" => actions::interact::hover(state, req).await,
        "check" => actions::interact::check(state, req).await,
        "uncheck" => actions::interact::uncheck(state, req).await,
        "select" => actions::interact::select(state, req).await,
        "focus" => actions::interact::focus(state, req).await,
        "clear" => actions::interact::clear(state, req).await,
        "drag" => actions::interact::drag(state, req).await,
        "upload" => actions::interact::upload(state, req).await,
        "scroll" => actions::interact::scroll(state, req).await,
        "scrollintoview" => actions::interact::scroll_into_view(state, req).await,
        "highlight" => actions::interact::highlight(state, req).await,

        // Mouse
        "mouse_move" => actions::interact::mouse_move(state, req).await,
        "mouse_down" => actions::interact::mouse_down(state, req).await,
        "mouse_up" => actions::interact::mouse_up(state, req).await,
        "mouse_wheel" => actions::interact::mouse_wheel(state, req).await,

        // Capture / JS
        "screenshot" => actions::capture::screenshot(state, req).await,
        "pdf" => actions::capture::pdf(state, req).await,
        "evaluate" => actions::capture::evaluate(state, req).await,

        // Getters / checks
        "get_text" => actions::getters::get_text(state, req).await,
        "get_html" => actions::getters::get_html(state, req).await,
        "get_attribute" => actions::getters::get_attribute(state, req).await,
        "get_value" => actions::getters::get_value(state, req).await,
        "get_count" | "count" => actions::getters::get_count(state, req).await,
        "get_box" | "bounding_box" => actions::getters::get_box(state, req).await,
        "is_visible" => actions::getters::is_visible(state, req).await,
        "is_enabled" => actions::getters::is_enabled(state, req).await,
        "is_checked" => actions::getters::is_checked(state, req).await,

        // Semantic find
        "find" => actions::find::find(state, req).await,

        // Waits
        "wait" => actions::waits::wait(state, req).await,

        // Tabs
        "tab_new" => actions::tabs::tab_new(state, req).await,
        "tab_list" => actions::tabs::tab_list(state).await,
        "tab_switch" => actions::tabs::tab_switch(state, req).await,
        "tab_close" => actions::tabs::tab_close(state, req).await,

        // Settings
        "set_viewport" => actions::settings::set_viewport(state, req).await,
        "set_device" => actions::settings::set_device(state, req).await,
        "set_geo" => actions::settings::set_geo(state, req).await,
        "set_offline" => actions::settings::set_offline(state, req).await,
        "set_headers" => actions::settings::set_headers(state, req).await,
        "set_media" => actions::settings::set_media(state, req).await,
        "set_credentials" => actions::settings::set_credentials(state, req).await,

        // Cookies / storage
        "cookies_get" => actions::network::cookies_get(state).await,
        "cookies_set" => actions::network::cookies_set(state, req).await,
        "cookies_clear" => actions::network::cookies_clear(state).await,
        "storage_get" => actions::network::storage_get(state, req).await,
        "storage_set" => actions::network::storage_set(state, req).await,
        "storage_clear" => actions::network::storage_clear(state, req).await,

        // Network
        "network_route" => actions::network::route(state, req).await,
        "network_unroute" => actions::network::unroute(state, req).await,
        "network_requests" => actions::network::requests(state, req).await,
        "network_clear" => actions::network::clear(state).await,

        // Frames
        "frame_switch" => actions::frames::frame_switch(state, req).await,
        "frame_list" => actions::frames::frame_list(state).await,

        // Dialogs
        "dialog_accept" => actions::dialogs::accept(state, req).await,
        "dialog_dismiss" => actions::dialogs::dismiss(state).await,

        // Trace / logs
        "trace_start" => actions::logs::trace_start(state).await,
        "trace_stop" => actions::logs::trace_stop(state, req).await,
        "console_get" => actions::logs::console_get(state).await,
        "console_clear" => actions::logs::console_clear(state).await,
        "console_start" => actions::logs::console_start(state).await,
        "errors_get" => actions::logs::errors_get(state).await,
        "errors_clear" => actions::logs::errors_clear(state).await,
        "errors_start" => actions::logs::errors_start(state).await,

        // Storage-state files
        "state_save" => actions::state_files::save(state, req).await,
        "state_load" => actions::state_files::load(state, req).await,
        "state_list" => actions::state_files::list(state).await,
        "state_show" => actions::state_files::show(state, req).await,
        "state_rename" => actions::state_files::rename(state, req).await,
        "state_clear" => actions::state_files::clear(state, req).await,
        "state_clean" => actions::state_files::clean(state, req).await,

        // Session / connect / close
        "session_list" => actions::sessions::session_list(state).await,
        "session_info" => actions::sessions::session_info(state).await,
        "connect" => actions::sessions::connect(state, req).await,
        "close" => actions::sessions::close(state).await,

        // classify() already rejected everything else.
        other => Err(DaemonError::bad(format!("unknown action '{}'", other))),
    }
}
