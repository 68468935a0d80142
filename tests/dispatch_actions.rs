//! Protocol-level dispatch coverage against the in-memory facade: every
//! action family gets a request in and a single well-formed response out.

use std::sync::Arc;

use spel::daemon::dispatch::dispatch;
use spel::daemon::state::DaemonState;
use spel::facade::fake::FakeEngine;
use spel::facade::BrowserEngine;
use spel::protocol::{Request, Response};

fn state_with(engine: &Arc<FakeEngine>) -> DaemonState {
    DaemonState::new(
        "test".to_string(),
        true,
        Arc::clone(engine) as Arc<dyn BrowserEngine>,
    )
}

async fn drive(state: &mut DaemonState, line: &str) -> Response {
    let request = Request::parse(line).expect("test request must parse");
    dispatch(state, &request).await
}

fn data<'a>(resp: &'a Response) -> &'a serde_json::Value {
    assert!(resp.success, "expected success, got {:?}", resp.error);
    resp.data.as_ref().expect("success response carries data")
}

#[tokio::test]
async fn test_navigate_returns_url_title_snapshot() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);

    let resp = drive(&mut state, r#"{"action":"navigate","url":"https://example.com"}"#).await;
    let data = data(&resp);
    assert_eq!(data["url"], "https://example.com/");
    assert_eq!(data["title"], "Title of https://example.com/");
    let snapshot = data["snapshot"].as_str().expect("snapshot string");
    assert!(snapshot.starts_with("- WebArea"));
    assert!(engine.logged("goto https://example.com/"));
    assert!(engine.logged("launch headless=true"));
}

#[tokio::test]
async fn test_page_guard_before_navigation() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);

    let resp = drive(&mut state, r##"{"action":"click","selector":"#x"}"##).await;
    assert!(!resp.success);
    assert!(resp.error.as_deref().unwrap().contains("No page loaded"));
}

#[tokio::test]
async fn test_unknown_action_is_parse_error() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);

    let resp = drive(&mut state, r#"{"action":"teleport"}"#).await;
    assert!(!resp.success);
    assert!(resp.error.as_deref().unwrap().contains("Parse error"));
    // And no browser got started for it.
    assert!(!engine.logged("launch"));
}

#[tokio::test]
async fn test_ref_resolution_and_unknown_ref() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://example.com"}"#).await;
    drive(&mut state, r#"{"action":"snapshot"}"#).await;

    let click = drive(&mut state, r#"{"action":"click","selector":"@e1"}"#).await;
    assert!(click.success);
    assert!(engine.logged(r#"click [data-spel-ref="e1"]"#));

    let bad = drive(&mut state, r#"{"action":"click","selector":"@e9"}"#).await;
    assert!(!bad.success);
    let message = bad.error.as_deref().unwrap();
    assert!(message.contains("e1-e2"));
    assert!(message.contains("snapshot"));
}

#[tokio::test]
async fn test_refs_invalidated_by_navigation() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://a.dev"}"#).await;
    drive(&mut state, r#"{"action":"snapshot"}"#).await;
    drive(&mut state, r#"{"action":"navigate","url":"https://b.dev"}"#).await;
    // `back` clears the table and captures nothing new.
    drive(&mut state, r#"{"action":"back"}"#).await;

    let resp = drive(&mut state, r#"{"action":"click","selector":"e1"}"#).await;
    assert!(!resp.success);
    assert!(resp.error.as_deref().unwrap().contains("no refs captured"));
}

#[tokio::test]
async fn test_interactive_snapshot_lines_all_carry_refs() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://example.com"}"#).await;

    let resp = drive(&mut state, r#"{"action":"snapshot","interactive":true}"#).await;
    let tree = data(&resp)["snapshot"].as_str().unwrap();
    assert!(!tree.is_empty());
    for line in tree.lines() {
        assert!(line.contains("[@"), "line without ref: {}", line);
    }
}

#[tokio::test]
async fn test_request_ring_bounded_to_newest_window() {
    let engine = FakeEngine::with_responses_per_nav(600);
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://big.dev"}"#).await;

    let resp = drive(&mut state, r#"{"action":"network_requests"}"#).await;
    let data = data(&resp);
    let requests = data["requests"].as_array().unwrap();
    assert_eq!(requests.len(), 500);
    assert!(data["dropped"].as_i64().unwrap() >= 100);
    let last_url = requests.last().unwrap()["url"].as_str().unwrap();
    assert!(last_url.contains("asset-599"));
}

#[tokio::test]
async fn test_network_requests_filters() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://site.dev"}"#).await;

    let all = drive(&mut state, r#"{"action":"network_requests"}"#).await;
    assert_eq!(data(&all)["count"].as_i64().unwrap(), 4);

    let docs = drive(
        &mut state,
        r#"{"action":"network_requests","type":"document"}"#,
    )
    .await;
    assert_eq!(data(&docs)["count"].as_i64().unwrap(), 1);

    let none = drive(&mut state, r#"{"action":"network_requests","status":"4"}"#).await;
    assert_eq!(data(&none)["count"].as_i64().unwrap(), 0);
}

#[tokio::test]
async fn test_launch_flags_merge_before_browser_start() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);

    let resp = drive(
        &mut state,
        r#"{"action":"navigate","url":"https://x.dev","_flags":{"user_agent":"SpelBot/1.0","proxy":"http://proxy:1"}}"#,
    )
    .await;
    assert!(resp.success);
    assert!(engine.logged("launch headless=true proxy=http://proxy:1"));
    assert!(engine.logged("new-context ua=SpelBot/1.0"));
}

#[tokio::test]
async fn test_set_device_recreates_context_and_preserves_url() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://example.com"}"#).await;

    let resp = drive(&mut state, r#"{"action":"set_device","device":"iPhone 13"}"#).await;
    let data = data(&resp);
    assert_eq!(data["device"], "iPhone 13");
    assert_eq!(data["restored"], true);
    assert!(engine.logged("new-context ua=Mozilla/5.0 (iPhone"));

    let url = drive(&mut state, r#"{"action":"url"}"#).await;
    assert_eq!(url.data.unwrap()["url"], "https://example.com/");
}

#[tokio::test]
async fn test_set_device_unknown_name_lists_presets() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    let resp = drive(&mut state, r#"{"action":"set_device","device":"Nokia 3310"}"#).await;
    assert!(!resp.success);
    assert!(resp.error.as_deref().unwrap().contains("iPhone 13"));
}

#[tokio::test]
async fn test_console_and_error_rings() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://x.dev"}"#).await;

    let page = engine.last_page().unwrap();
    page.emit_console("error", "boom happened");
    page.emit_page_error("TypeError: x is not a function");

    let console = drive(&mut state, r#"{"action":"console_get"}"#).await;
    let messages = data(&console)["messages"].as_array().unwrap().clone();
    assert!(messages.iter().any(|m| m["text"] == "boom happened"));

    let errors = drive(&mut state, r#"{"action":"errors_get"}"#).await;
    let entries = data(&errors)["errors"].as_array().unwrap().clone();
    assert!(entries.iter().any(|e| e["message"]
        .as_str()
        .unwrap()
        .contains("TypeError")));

    drive(&mut state, r#"{"action":"console_clear"}"#).await;
    let cleared = drive(&mut state, r#"{"action":"console_get"}"#).await;
    assert!(data(&cleared)["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cookies_inherit_page_domain() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://example.com"}"#).await;

    let set = drive(
        &mut state,
        r#"{"action":"cookies_set","cookies":[{"name":"token","value":"abc"}]}"#,
    )
    .await;
    assert_eq!(data(&set)["set"], 1);

    let got = drive(&mut state, r#"{"action":"cookies_get"}"#).await;
    let cookies = data(&got)["cookies"].as_array().unwrap().clone();
    assert_eq!(cookies[0]["name"], "token");
    assert_eq!(cookies[0]["domain"], "example.com");
}

#[tokio::test]
async fn test_route_and_unroute() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://x.dev"}"#).await;

    let routed = drive(
        &mut state,
        r#"{"action":"network_route","url":"**/ads/**","abort":true}"#,
    )
    .await;
    assert_eq!(data(&routed)["kind"], "abort");
    assert!(engine.logged("route **/ads/** abort"));

    let unrouted = drive(&mut state, r#"{"action":"network_unroute"}"#).await;
    assert_eq!(data(&unrouted)["unrouted"], 1);
}

#[tokio::test]
async fn test_find_with_and_without_action() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://x.dev"}"#).await;

    let found = drive(
        &mut state,
        r#"{"action":"find","by":"role","value":"button","name":"Submit","exact":false}"#,
    )
    .await;
    assert_eq!(data(&found)["found"], true);

    let clicked = drive(
        &mut state,
        r#"{"action":"find","by":"text","value":"More information","find_action":"click"}"#,
    )
    .await;
    assert_eq!(data(&clicked)["clicked"], true);
    assert!(engine.logged(r#"click text="More information""#));
}

#[tokio::test]
async fn test_wait_dispatches_by_param() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://example.com"}"#).await;

    let slept = drive(&mut state, r#"{"action":"wait","timeout":5}"#).await;
    assert_eq!(data(&slept)["waited"], "timeout");

    let url_wait = drive(&mut state, r#"{"action":"wait","url":"example.com"}"#).await;
    assert_eq!(data(&url_wait)["waited"], "url");

    let sel_wait = drive(&mut state, r##"{"action":"wait","selector":"#main"}"##).await;
    assert_eq!(data(&sel_wait)["waited"], "selector");

    let nothing = drive(&mut state, r#"{"action":"wait"}"#).await;
    assert!(!nothing.success);
}

#[tokio::test]
async fn test_tab_lifecycle() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://one.dev"}"#).await;

    let new_tab = drive(&mut state, r#"{"action":"tab_new","url":"https://two.dev"}"#).await;
    assert_eq!(data(&new_tab)["index"], 1);

    let list = drive(&mut state, r#"{"action":"tab_list"}"#).await;
    let tabs = data(&list)["tabs"].as_array().unwrap().clone();
    assert_eq!(tabs.len(), 2);
    assert_eq!(tabs[1]["active"], true);

    let switched = drive(&mut state, r#"{"action":"tab_switch","index":0}"#).await;
    assert_eq!(data(&switched)["url"], "https://one.dev/");

    let closed = drive(&mut state, r#"{"action":"tab_close","index":1}"#).await;
    assert_eq!(data(&closed)["tabs"], 1);

    let bad = drive(&mut state, r#"{"action":"tab_switch","index":9}"#).await;
    assert!(!bad.success);
}

#[tokio::test]
async fn test_screenshot_writes_png() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://x.dev"}"#).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shot.png");
    let line = format!(
        r#"{{"action":"screenshot","path":"{}"}}"#,
        path.display()
    );
    let resp = drive(&mut state, &line).await;
    let data = data(&resp);
    assert_eq!(data["path"], path.display().to_string());
    assert!(data["size"].as_u64().unwrap() > 0);

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..8], &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
}

#[tokio::test]
async fn test_state_save_load_and_corrupt_detection() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://example.com"}"#).await;

    let name = format!("itest-{}", std::process::id());
    let saved = drive(
        &mut state,
        &format!(r#"{{"action":"state_save","name":"{}"}}"#, name),
    )
    .await;
    let path = data(&saved)["path"].as_str().unwrap().to_string();
    assert!(std::path::Path::new(&path).exists());

    let loaded = drive(
        &mut state,
        &format!(r#"{{"action":"state_load","name":"{}"}}"#, name),
    )
    .await;
    assert_eq!(data(&loaded)["restored"], true);

    let missing = drive(
        &mut state,
        r#"{"action":"state_load","name":"definitely-not-saved"}"#,
    )
    .await;
    assert!(!missing.success);
    assert!(missing.error.as_deref().unwrap().contains("no such state"));

    let corrupt_name = format!("itest-corrupt-{}", std::process::id());
    let corrupt_path = spel::session::storage_state_path(&corrupt_name);
    std::fs::write(&corrupt_path, "{not json").unwrap();
    let shown = drive(
        &mut state,
        &format!(r#"{{"action":"state_show","name":"{}"}}"#, corrupt_name),
    )
    .await;
    assert!(!shown.success);
    assert!(shown.error.as_deref().unwrap().contains("corrupt"));

    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(&corrupt_path);
}

#[tokio::test]
async fn test_trace_autosave_on_shutdown() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://x.dev"}"#).await;

    let started = drive(&mut state, r#"{"action":"trace_start"}"#).await;
    assert!(started.success);
    assert!(state.tracing);

    state.shutdown_browser().await;
    assert!(!state.tracing);
    assert!(engine.logged("trace-stop"));
    assert!(engine.logged("browser closed"));
}

#[tokio::test]
async fn test_close_carries_shutdown_flag() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://x.dev"}"#).await;

    let resp = drive(&mut state, r#"{"action":"close"}"#).await;
    assert!(resp.success);
    assert!(resp.wants_shutdown());
    assert_eq!(resp.data.unwrap()["closed"], true);
    assert!(engine.logged("browser closed"));
}

#[tokio::test]
async fn test_session_info_without_browser() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);

    let resp = drive(&mut state, r#"{"action":"session_info"}"#).await;
    let data = data(&resp);
    assert_eq!(data["session"], "test");
    assert_eq!(data["headless"], true);
    assert_eq!(data["browser"], false);
    // Pure-state action must not have launched anything.
    assert!(!engine.logged("launch"));
}

#[tokio::test]
async fn test_dialog_install_replaces_previous() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://x.dev"}"#).await;

    drive(
        &mut state,
        r#"{"action":"dialog_accept","promptText":"yes"}"#,
    )
    .await;
    let second = drive(&mut state, r#"{"action":"dialog_dismiss"}"#).await;
    assert_eq!(data(&second)["dialog"], "dismiss");
    assert_eq!(state.dialog.as_ref().unwrap().accept, false);
}

#[tokio::test]
async fn test_interactions_reach_locators() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://x.dev"}"#).await;

    drive(
        &mut state,
        r##"{"action":"fill","selector":"#email","value":"a@b.c"}"##,
    )
    .await;
    drive(&mut state, r##"{"action":"check","selector":"#agree"}"##).await;
    drive(&mut state, r#"{"action":"press","key":"Enter"}"#).await;
    drive(
        &mut state,
        r#"{"action":"scroll","direction":"down","amount":500}"#,
    )
    .await;

    assert!(engine.logged("fill #email = a@b.c"));
    assert!(engine.logged("check #agree"));
    assert!(engine.logged("press Enter"));
    assert!(engine.logged("evaluate window.scrollBy(0, 500)"));
}

#[tokio::test]
async fn test_getters_return_documented_fields() {
    let engine = FakeEngine::new();
    let mut state = state_with(&engine);
    drive(&mut state, r#"{"action":"navigate","url":"https://example.com"}"#).await;
    drive(&mut state, r#"{"action":"snapshot"}"#).await;

    let text = drive(&mut state, r#"{"action":"get_text","selector":"@e1"}"#).await;
    assert!(data(&text)["text"].is_string());

    let count = drive(&mut state, r#"{"action":"get_count","selector":".item"}"#).await;
    assert_eq!(data(&count)["count"], 1);

    let visible = drive(&mut state, r#"{"action":"is_visible","selector":"@e2"}"#).await;
    assert_eq!(data(&visible)["visible"], true);

    let bounds = drive(&mut state, r#"{"action":"get_box","selector":"@e1"}"#).await;
    assert!(data(&bounds)["box"]["width"].as_f64().unwrap() > 0.0);
}
