//! Human-facing response rendering: case analysis on the `data` fields,
//! with `--json` printing the response verbatim.

use std::sync::OnceLock;

use serde_json::Value;

use crate::color;
use crate::protocol::Response;

static BOUNDARY_NONCE: OnceLock<String> = OnceLock::new();

/// Per-process nonce for content boundary markers. Uses a CSPRNG so page
/// content cannot predict or spoof the delimiter.
fn get_boundary_nonce() -> &'static str {
    BOUNDARY_NONCE.get_or_init(|| {
        let mut buf = [0u8; 16];
        if getrandom::getrandom(&mut buf).is_err() {
            return format!("{:x}", std::process::id());
        }
        buf.iter().map(|b| format!("{:02x}", b)).collect()
    })
}

#[derive(Default)]
pub struct OutputOptions {
    pub json: bool,
    pub content_boundaries: bool,
    pub max_output: Option<usize>,
}

fn truncate_if_needed(content: &str, max: Option<usize>) -> String {
    let Some(limit) = max else {
        return content.to_string();
    };
    if content.len() <= limit {
        return content.to_string();
    }
    match content.char_indices().nth(limit).map(|(i, _)| i) {
        Some(byte_offset) => {
            let total_chars = content.chars().count();
            format!(
                "{}\n[truncated: showing {} of {} chars. Use --max-output to adjust]",
                &content[..byte_offset],
                limit,
                total_chars
            )
        }
        None => content.to_string(),
    }
}

fn print_with_boundaries(content: &str, opts: &OutputOptions) {
    let content = truncate_if_needed(content, opts.max_output);
    if opts.content_boundaries {
        let nonce = get_boundary_nonce();
        println!("--- SPEL_PAGE_CONTENT nonce={} ---", nonce);
        println!("{}", content);
        println!("--- END_SPEL_PAGE_CONTENT nonce={} ---", nonce);
    } else {
        println!("{}", content);
    }
}

pub fn print_response_with_opts(resp: &Response, action: Option<&str>, opts: &OutputOptions) {
    if opts.json {
        println!("{}", serde_json::to_string(resp).unwrap_or_default());
        return;
    }

    if !resp.success {
        eprintln!(
            "{} {}",
            color::error_indicator(),
            resp.error.as_deref().unwrap_or("Unknown error")
        );
        return;
    }

    let Some(data) = &resp.data else {
        println!("{} ok", color::success_indicator());
        return;
    };

    // Session info first: it carries a url field the bare-url probe would
    // otherwise swallow.
    if let Some(session) = data.get("session").and_then(|v| v.as_str()) {
        println!("Session: {}", session);
        if let Some(headless) = data.get("headless").and_then(|v| v.as_bool()) {
            println!("  headless: {}", headless);
        }
        if let Some(browser) = data.get("browser").and_then(|v| v.as_bool()) {
            println!("  browser started: {}", browser);
        }
        if let Some(url) = data.get("url").and_then(|v| v.as_str()) {
            println!("  url: {}", url);
        }
        if let Some(tabs) = data.get("tabs").and_then(|v| v.as_i64()) {
            println!("  tabs: {}", tabs);
        }
        if let Some(refs) = data.get("refs").and_then(|v| v.as_i64()) {
            println!("  refs: {}", refs);
        }
        return;
    }
    // Navigation: title header, dim url, then the ride-along snapshot.
    if let (Some(url), Some(title)) = (
        data.get("url").and_then(|v| v.as_str()),
        data.get("title").and_then(|v| v.as_str()),
    ) {
        println!("{} {}", color::success_indicator(), color::bold(title));
        println!("  {}", color::dim(url));
        if let Some(snapshot) = data.get("snapshot").and_then(|v| v.as_str()) {
            if !snapshot.is_empty() {
                print_with_boundaries(snapshot, opts);
            }
        }
        return;
    }
    if let Some(url) = data.get("url").and_then(|v| v.as_str()) {
        println!("{}", url);
        return;
    }
    // Snapshot without navigation context.
    if let Some(snapshot) = data.get("snapshot").and_then(|v| v.as_str()) {
        print_with_boundaries(snapshot, opts);
        return;
    }
    if let Some(title) = data.get("title").and_then(|v| v.as_str()) {
        println!("{}", title);
        return;
    }
    if let Some(text) = data.get("text").and_then(|v| v.as_str()) {
        print_with_boundaries(text, opts);
        return;
    }
    if let Some(html) = data.get("html").and_then(|v| v.as_str()) {
        print_with_boundaries(html, opts);
        return;
    }
    if let Some(value) = data.get("value") {
        match value {
            Value::Null => println!("{}", color::dim("null")),
            Value::String(s) => println!("{}", s),
            other => println!("{}", other),
        }
        return;
    }
    if let Some(result_b64) = data.get("result_b64").and_then(|v| v.as_str()) {
        println!("{}", result_b64);
        return;
    }
    if let Some(result) = data.get("result") {
        let formatted = serde_json::to_string_pretty(result).unwrap_or_default();
        print_with_boundaries(&formatted, opts);
        return;
    }
    // Bool checks.
    for key in ["visible", "enabled", "checked", "found", "offline"] {
        if let Some(flag) = data.get(key).and_then(|v| v.as_bool()) {
            println!("{}", flag);
            return;
        }
    }
    // Tabs.
    if let Some(tabs) = data.get("tabs").and_then(|v| v.as_array()) {
        for tab in tabs {
            let index = tab.get("index").and_then(|v| v.as_i64()).unwrap_or(0);
            let title = tab.get("title").and_then(|v| v.as_str()).unwrap_or("Untitled");
            let url = tab.get("url").and_then(|v| v.as_str()).unwrap_or("");
            let active = tab.get("active").and_then(|v| v.as_bool()).unwrap_or(false);
            let marker = if active {
                color::cyan("→")
            } else {
                " ".to_string()
            };
            println!("{} [{}] {} - {}", marker, index, title, url);
        }
        return;
    }
    // Console messages.
    if let Some(messages) = data.get("messages").and_then(|v| v.as_array()) {
        if messages.is_empty() {
            println!("{}", color::dim("No console messages"));
        }
        for message in messages {
            let level = message.get("type").and_then(|v| v.as_str()).unwrap_or("log");
            let text = message.get("text").and_then(|v| v.as_str()).unwrap_or("");
            println!("{} {}", color::console_level_prefix(level), text);
        }
        print_dropped(data);
        return;
    }
    // Page errors.
    if let Some(errors) = data.get("errors").and_then(|v| v.as_array()) {
        if errors.is_empty() {
            println!("{}", color::dim("No page errors"));
        }
        for error in errors {
            let message = error.get("message").and_then(|v| v.as_str()).unwrap_or("");
            println!("{} {}", color::error_indicator(), message);
        }
        print_dropped(data);
        return;
    }
    // Cookies.
    if let Some(cookies) = data.get("cookies").and_then(|v| v.as_array()) {
        if cookies.is_empty() {
            println!("{}", color::dim("No cookies"));
        }
        for cookie in cookies {
            let name = cookie.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let value = cookie.get("value").and_then(|v| v.as_str()).unwrap_or("");
            println!("{}={}", name, value);
        }
        return;
    }
    // Tracked requests.
    if let Some(requests) = data.get("requests").and_then(|v| v.as_array()) {
        if requests.is_empty() {
            println!("No requests captured");
        }
        for request in requests {
            let method = request.get("method").and_then(|v| v.as_str()).unwrap_or("GET");
            let url = request.get("url").and_then(|v| v.as_str()).unwrap_or("");
            let status = request.get("status").and_then(|v| v.as_i64()).unwrap_or(0);
            let resource_type = request
                .get("resourceType")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            println!("{} {} {} ({})", status, method, url, resource_type);
        }
        return;
    }
    // Sessions.
    if let Some(sessions) = data.get("sessions").and_then(|v| v.as_array()) {
        if sessions.is_empty() {
            println!("No active sessions");
        } else {
            println!("Active sessions:");
            for session in sessions {
                println!("  {}", session.as_str().unwrap_or(""));
            }
        }
        return;
    }
    // Frames.
    if let Some(frames) = data.get("frames").and_then(|v| v.as_array()) {
        if frames.is_empty() {
            println!("{}", color::dim("No child frames"));
        }
        for frame in frames {
            let ordinal = frame.get("ordinal").and_then(|v| v.as_i64()).unwrap_or(0);
            let name = frame.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let url = frame.get("url").and_then(|v| v.as_str()).unwrap_or("");
            println!("[{}] {} {}", ordinal, name, color::dim(url));
        }
        return;
    }
    // Saved states.
    if let Some(files) = data.get("files").and_then(|v| v.as_array()) {
        if let Some(dir) = data.get("directory").and_then(|v| v.as_str()) {
            println!("{}", color::bold(&format!("Saved states in {}", dir)));
        }
        if files.is_empty() {
            println!("{}", color::dim("  No state files found"));
        }
        for file in files {
            let filename = file.get("filename").and_then(|v| v.as_str()).unwrap_or("");
            let size = file.get("size").and_then(|v| v.as_i64()).unwrap_or(0);
            let modified = file.get("modified").and_then(|v| v.as_str()).unwrap_or("");
            let size_str = if size > 1024 {
                format!("{:.1}KB", size as f64 / 1024.0)
            } else {
                format!("{}B", size)
            };
            let date_str = modified.split('T').next().unwrap_or(modified);
            println!(
                "  {} {}",
                filename,
                color::dim(&format!("({}, {})", size_str, date_str))
            );
        }
        return;
    }
    // State summary.
    if let Some(summary) = data.get("summary") {
        let cookies = summary.get("cookies").and_then(|v| v.as_i64()).unwrap_or(0);
        let origins = summary.get("origins").and_then(|v| v.as_i64()).unwrap_or(0);
        println!("State file summary:");
        println!("  Cookies: {}", cookies);
        println!("  Origins with localStorage: {}", origins);
        return;
    }
    if data.get("renamed").and_then(|v| v.as_bool()).unwrap_or(false) {
        let old_name = data.get("oldName").and_then(|v| v.as_str()).unwrap_or("");
        let new_name = data.get("newName").and_then(|v| v.as_str()).unwrap_or("");
        println!(
            "{} Renamed {} -> {}",
            color::success_indicator(),
            old_name,
            new_name
        );
        return;
    }
    if let Some(cleaned) = data.get("cleaned").and_then(|v| v.as_i64()) {
        println!(
            "{} Cleaned {} old state file(s)",
            color::success_indicator(),
            cleaned
        );
        return;
    }
    // Counts.
    if let Some(count) = data.get("count").and_then(|v| v.as_i64()) {
        println!("{}", count);
        return;
    }
    // Bounding box.
    if let Some(bounds) = data.get("box") {
        println!("{}", serde_json::to_string_pretty(bounds).unwrap_or_default());
        return;
    }
    // Web storage items.
    if let Some(items) = data.get("items") {
        println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        return;
    }
    // Shutdown.
    if data.get("closed").and_then(|v| v.as_bool()).unwrap_or(false) {
        println!("{} Browser closed", color::success_indicator());
        return;
    }
    // Trace / capture start.
    if data.get("started").and_then(|v| v.as_bool()).unwrap_or(false) {
        println!("{} Recording started", color::success_indicator());
        return;
    }
    // Path-carrying results.
    if let Some(path) = data.get("path").and_then(|v| v.as_str()) {
        match action.unwrap_or("") {
            "screenshot" => {
                let dims = match (
                    data.get("width").and_then(|v| v.as_i64()),
                    data.get("height").and_then(|v| v.as_i64()),
                ) {
                    (Some(w), Some(h)) => format!(" ({}x{})", w, h),
                    _ => String::new(),
                };
                println!(
                    "{} Screenshot saved to {}{}",
                    color::success_indicator(),
                    color::green(path),
                    dims
                );
            }
            "pdf" => println!(
                "{} PDF saved to {}",
                color::success_indicator(),
                color::green(path)
            ),
            "trace_stop" => println!(
                "{} Trace saved to {}",
                color::success_indicator(),
                color::green(path)
            ),
            "state_save" => println!(
                "{} State saved to {}",
                color::success_indicator(),
                color::green(path)
            ),
            "state_load" => {
                if data.get("restored").and_then(|v| v.as_bool()) == Some(false) {
                    println!(
                        "{} prior page could not be restored after state load",
                        color::warning_indicator()
                    );
                }
                println!(
                    "{} State loaded from {}",
                    color::success_indicator(),
                    color::green(path)
                );
            }
            _ => println!(
                "{} Saved to {}",
                color::success_indicator(),
                color::green(path)
            ),
        }
        return;
    }
    // Annotate / generic confirmations.
    if let Some(annotated) = data.get("annotated").and_then(|v| v.as_i64()) {
        println!(
            "{} Annotated {} element(s)",
            color::success_indicator(),
            annotated
        );
        return;
    }
    if let Some(removed) = data.get("removed").and_then(|v| v.as_i64()) {
        println!(
            "{} Removed {} overlay(s)",
            color::success_indicator(),
            removed
        );
        return;
    }
    if let Some(routed) = data.get("routed").and_then(|v| v.as_str()) {
        let kind = data.get("kind").and_then(|v| v.as_str()).unwrap_or("");
        println!("{} Route installed: {} ({})", color::success_indicator(), routed, kind);
        return;
    }
    if let Some(unrouted) = data.get("unrouted").and_then(|v| v.as_i64()) {
        println!("{} Removed {} route(s)", color::success_indicator(), unrouted);
        return;
    }
    if let Some(device) = data.get("device").and_then(|v| v.as_str()) {
        println!("{} Emulating {}", color::success_indicator(), device);
        return;
    }
    if let Some(connected) = data.get("connected").and_then(|v| v.as_str()) {
        println!("{} Connected to {}", color::success_indicator(), connected);
        return;
    }
    if let Some(dialog) = data.get("dialog").and_then(|v| v.as_str()) {
        println!(
            "{} Dialog handler installed: {}",
            color::success_indicator(),
            dialog
        );
        return;
    }
    if let Some(waited) = data.get("waited").and_then(|v| v.as_str()) {
        println!("{} Wait satisfied ({})", color::success_indicator(), waited);
        return;
    }
    match data.get("cleared") {
        Some(Value::Bool(true)) => {
            println!("{} Cleared", color::success_indicator());
            return;
        }
        Some(Value::Number(n)) => {
            println!(
                "{} Cleared {} item(s)",
                color::success_indicator(),
                n.as_i64().unwrap_or(0)
            );
            return;
        }
        _ => {}
    }
    // Simple success confirmations from interaction handlers.
    for key in [
        "clicked",
        "filled",
        "typed",
        "hovered",
        "focused",
        "pressed",
        "scrolled",
        "highlighted",
        "dragged",
        "uploaded",
        "selected",
        "set",
    ] {
        if data.get(key).is_some() {
            println!("{} ok", color::success_indicator());
            return;
        }
    }

    // Anything unmatched prints as JSON rather than disappearing.
    println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
}

fn print_dropped(data: &Value) {
    if let Some(dropped) = data.get("dropped").and_then(|v| v.as_i64()) {
        if dropped > 0 {
            println!("{}", color::dim(&format!("({} older entries dropped)", dropped)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_under_limit() {
        assert_eq!(truncate_if_needed("short", Some(100)), "short");
    }

    #[test]
    fn test_truncate_over_limit() {
        let out = truncate_if_needed("abcdefghij", Some(4));
        assert!(out.starts_with("abcd\n[truncated: showing 4 of 10 chars"));
    }

    #[test]
    fn test_truncate_no_limit() {
        assert_eq!(truncate_if_needed("anything", None), "anything");
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        let out = truncate_if_needed("héllo wörld", Some(3));
        assert!(out.starts_with("hél"));
    }

    #[test]
    fn test_boundary_nonce_is_stable() {
        assert_eq!(get_boundary_nonce(), get_boundary_nonce());
        assert_eq!(get_boundary_nonce().len(), 32);
    }
}
