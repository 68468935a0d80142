//! Page adapter: one attached CDP target.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use super::locator::CdpLocator;
use super::transport::{CdpEvent, CdpTransport};
use super::{js, keys};
use crate::facade::{
    glob_match, ContextOptions, DialogAction, FacadeError, FacadeResult, FrameInfo, LoadState,
    Locator, Page, PageEvent, RouteAction, ScreenshotOptions, Selector, Viewport,
};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct CdpPage {
    transport: Arc<CdpTransport>,
    session_id: String,
    target_id: String,
    self_weak: Weak<CdpPage>,
    default_timeout: AtomicU64,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PageEvent>>>,
    dialog_action: Mutex<Option<DialogAction>>,
    routes: Mutex<Vec<(String, RouteAction)>>,
    fetch_enabled: AtomicBool,
    has_credentials: bool,
    credentials: Option<(String, String)>,
    /// Lifecycle event names seen for the main frame since the last
    /// navigation start.
    lifecycle: Mutex<HashSet<String>>,
    lifecycle_notify: Notify,
    main_frame_id: Mutex<String>,
    /// frame id -> default execution context id, kept fresh by Runtime events.
    frame_contexts: Mutex<HashMap<String, i64>>,
    /// Ordinal -> frame id as of the last `frames()` walk.
    frame_order: Mutex<Vec<String>>,
    active_frame: Mutex<Option<String>>,
    mouse_pos: Mutex<(f64, f64)>,
    request_methods: Mutex<HashMap<String, String>>,
    trace_sink: Arc<Mutex<Vec<Value>>>,
    trace_complete: Notify,
}

impl CdpPage {
    pub(super) async fn attach(
        transport: Arc<CdpTransport>,
        target_id: String,
        opts: &ContextOptions,
        init_script: Option<String>,
        trace_sink: Arc<Mutex<Vec<Value>>>,
    ) -> FacadeResult<Arc<Self>> {
        let attached = transport
            .call(
                None,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = attached
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FacadeError::Protocol("attachToTarget returned no sessionId".into()))?
            .to_string();

        let credentials = opts
            .http_credentials
            .as_ref()
            .map(|c| (c.username.clone(), c.password.clone()));
        let page = Arc::new_cyclic(|weak| CdpPage {
            transport: Arc::clone(&transport),
            session_id,
            target_id,
            self_weak: weak.clone(),
            default_timeout: AtomicU64::new(DEFAULT_TIMEOUT_MS),
            subscribers: Mutex::new(Vec::new()),
            dialog_action: Mutex::new(None),
            routes: Mutex::new(Vec::new()),
            fetch_enabled: AtomicBool::new(false),
            has_credentials: credentials.is_some(),
            credentials,
            lifecycle: Mutex::new(HashSet::new()),
            lifecycle_notify: Notify::new(),
            main_frame_id: Mutex::new(String::new()),
            frame_contexts: Mutex::new(HashMap::new()),
            frame_order: Mutex::new(Vec::new()),
            active_frame: Mutex::new(None),
            mouse_pos: Mutex::new((0.0, 0.0)),
            request_methods: Mutex::new(HashMap::new()),
            trace_sink,
            trace_complete: Notify::new(),
        });

        page.start_event_pump();
        page.init(opts, init_script).await?;
        Ok(page)
    }

    fn start_event_pump(&self) {
        let weak = self.self_weak.clone();
        let mut events = self.transport.subscribe();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(page) = weak.upgrade() else { break };
                if event.session_id.as_deref() != Some(page.session_id.as_str()) {
                    continue;
                }
                page.handle_event(event).await;
            }
        });
    }

    async fn init(&self, opts: &ContextOptions, init_script: Option<String>) -> FacadeResult<()> {
        self.call("Page.enable", json!({})).await?;
        self.call("Runtime.enable", json!({})).await?;
        self.call("Network.enable", json!({})).await?;
        self.call("Page.setLifecycleEventsEnabled", json!({ "enabled": true }))
            .await?;

        let tree = self.call("Page.getFrameTree", json!({})).await?;
        if let Some(id) = tree.pointer("/frameTree/frame/id").and_then(|v| v.as_str()) {
            *self.main_frame_id.lock().unwrap() = id.to_string();
        }

        if opts.ignore_https_errors {
            self.call("Security.setIgnoreCertificateErrors", json!({ "ignore": true }))
                .await?;
        }
        if let Some(ua) = &opts.user_agent {
            self.call("Emulation.setUserAgentOverride", json!({ "userAgent": ua }))
                .await?;
        }
        if !opts.extra_headers.is_empty() {
            self.call(
                "Network.setExtraHTTPHeaders",
                json!({ "headers": opts.extra_headers }),
            )
            .await?;
        }
        if let Some(viewport) = opts.viewport {
            self.call(
                "Emulation.setDeviceMetricsOverride",
                json!({
                    "width": viewport.width,
                    "height": viewport.height,
                    "deviceScaleFactor": opts.device_scale_factor.unwrap_or(0.0),
                    "mobile": opts.is_mobile,
                }),
            )
            .await?;
        }
        if opts.has_touch {
            self.call("Emulation.setTouchEmulationEnabled", json!({ "enabled": true }))
                .await?;
        }
        if let Some(source) = init_script {
            self.call(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": source }),
            )
            .await?;
        }
        if self.has_credentials {
            self.ensure_fetch().await?;
        }
        Ok(())
    }

    async fn call(&self, method: &str, params: Value) -> FacadeResult<Value> {
        self.transport
            .call(Some(&self.session_id), method, params)
            .await
    }

    pub(super) async fn session_call(&self, method: &str, params: Value) -> FacadeResult<Value> {
        self.call(method, params).await
    }

    pub(super) async fn screenshot_with(
        &self,
        opts: &ScreenshotOptions,
    ) -> FacadeResult<Vec<u8>> {
        Page::screenshot(self, opts).await
    }

    pub(super) async fn wait_trace_complete(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.trace_complete.notified()).await;
    }

    fn emit(&self, event: PageEvent) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    async fn handle_event(&self, event: CdpEvent) {
        match event.method.as_str() {
            "Runtime.consoleAPICalled" => {
                let level = event
                    .params
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("log")
                    .to_string();
                let text = event
                    .params
                    .get("args")
                    .and_then(|v| v.as_array())
                    .map(|args| {
                        args.iter()
                            .map(remote_object_preview)
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();
                self.emit(PageEvent::Console { level, text });
            }
            "Runtime.exceptionThrown" => {
                let details = event.params.get("exceptionDetails");
                let message = details
                    .and_then(|d| d.pointer("/exception/description"))
                    .or_else(|| details.and_then(|d| d.get("text")))
                    .and_then(|v| v.as_str())
                    .unwrap_or("uncaught exception")
                    .to_string();
                self.emit(PageEvent::PageError { message });
            }
            "Network.requestWillBeSent" => {
                if let (Some(id), Some(method)) = (
                    event.params.pointer("/requestId").and_then(|v| v.as_str()),
                    event
                        .params
                        .pointer("/request/method")
                        .and_then(|v| v.as_str()),
                ) {
                    self.request_methods
                        .lock()
                        .unwrap()
                        .insert(id.to_string(), method.to_string());
                }
            }
            "Network.responseReceived" => {
                let method = event
                    .params
                    .pointer("/requestId")
                    .and_then(|v| v.as_str())
                    .and_then(|id| self.request_methods.lock().unwrap().remove(id))
                    .unwrap_or_else(|| "GET".to_string());
                let url = event
                    .params
                    .pointer("/response/url")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let status = event
                    .params
                    .pointer("/response/status")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u16;
                let resource_type = event
                    .params
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("other")
                    .to_lowercase();
                self.emit(PageEvent::Response {
                    url,
                    method,
                    status,
                    resource_type,
                });
            }
            "Page.lifecycleEvent" => {
                let frame_id = event
                    .params
                    .get("frameId")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let name = event
                    .params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                if frame_id == self.main_frame_id.lock().unwrap().as_str() {
                    if name == "init" {
                        self.lifecycle.lock().unwrap().clear();
                    } else {
                        self.lifecycle.lock().unwrap().insert(name.to_string());
                        self.lifecycle_notify.notify_waiters();
                    }
                }
            }
            "Page.frameNavigated" => {
                // Top-level navigation without a parent means a fresh document.
                let is_main = event.params.pointer("/frame/parentId").is_none();
                if is_main {
                    if let Some(id) = event.params.pointer("/frame/id").and_then(|v| v.as_str()) {
                        *self.main_frame_id.lock().unwrap() = id.to_string();
                    }
                    *self.active_frame.lock().unwrap() = None;
                }
            }
            "Runtime.executionContextCreated" => {
                let ctx = event.params.get("context");
                let id = ctx.and_then(|c| c.get("id")).and_then(|v| v.as_i64());
                let frame_id = ctx
                    .and_then(|c| c.pointer("/auxData/frameId"))
                    .and_then(|v| v.as_str());
                let is_default = ctx
                    .and_then(|c| c.pointer("/auxData/isDefault"))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if let (Some(id), Some(frame_id)) = (id, frame_id) {
                    if is_default {
                        self.frame_contexts
                            .lock()
                            .unwrap()
                            .insert(frame_id.to_string(), id);
                    }
                }
            }
            "Runtime.executionContextsCleared" => {
                self.frame_contexts.lock().unwrap().clear();
            }
            "Page.javascriptDialogOpening" => {
                let kind = event
                    .params
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("alert")
                    .to_string();
                let message = event
                    .params
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let action = self.dialog_action.lock().unwrap().clone();
                let mut params = json!({ "accept": false });
                if let Some(action) = action {
                    params = json!({ "accept": action.accept });
                    if let Some(text) = action.prompt_text {
                        params["promptText"] = json!(text);
                    }
                }
                if let Err(e) = self.call("Page.handleJavaScriptDialog", params).await {
                    warn!(target: "spel.cdp", "dialog reply failed: {}", e);
                }
                self.emit(PageEvent::Dialog { kind, message });
            }
            "Page.windowOpen" => {
                let url = event
                    .params
                    .get("url")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.emit(PageEvent::Popup { url });
            }
            "Page.downloadWillBegin" => {
                let url = event
                    .params
                    .get("url")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let suggested_filename = event
                    .params
                    .get("suggestedFilename")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.emit(PageEvent::Download {
                    url,
                    suggested_filename,
                });
            }
            "Fetch.requestPaused" => {
                self.handle_request_paused(&event.params).await;
            }
            "Fetch.authRequired" => {
                let request_id = event
                    .params
                    .get("requestId")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let response = match &self.credentials {
                    Some((username, password)) => json!({
                        "response": "ProvideCredentials",
                        "username": username,
                        "password": password,
                    }),
                    None => json!({ "response": "Default" }),
                };
                if let Err(e) = self
                    .call(
                        "Fetch.continueWithAuth",
                        json!({ "requestId": request_id, "authChallengeResponse": response }),
                    )
                    .await
                {
                    warn!(target: "spel.cdp", "auth reply failed: {}", e);
                }
            }
            "Tracing.dataCollected" => {
                if let Some(chunk) = event.params.get("value").and_then(|v| v.as_array()) {
                    self.trace_sink.lock().unwrap().extend(chunk.iter().cloned());
                }
            }
            "Tracing.tracingComplete" => {
                self.trace_complete.notify_waiters();
            }
            "Inspector.targetCrashed" => {
                self.emit(PageEvent::PageError {
                    message: "page crashed".to_string(),
                });
            }
            _ => {}
        }
    }

    async fn handle_request_paused(&self, params: &Value) {
        let request_id = params
            .get("requestId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let url = params
            .pointer("/request/url")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let action = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| glob_match(pattern, url))
            .map(|(_, action)| action.clone());

        let outcome = match action {
            Some(RouteAction::Abort) => {
                self.call(
                    "Fetch.failRequest",
                    json!({ "requestId": request_id, "errorReason": "Aborted" }),
                )
                .await
            }
            Some(RouteAction::Fulfill {
                status,
                content_type,
                body,
            }) => {
                let mut headers = vec![];
                if let Some(ct) = content_type {
                    headers.push(json!({ "name": "Content-Type", "value": ct }));
                }
                self.call(
                    "Fetch.fulfillRequest",
                    json!({
                        "requestId": request_id,
                        "responseCode": status,
                        "responseHeaders": headers,
                        "body": base64::engine::general_purpose::STANDARD.encode(body),
                    }),
                )
                .await
            }
            Some(RouteAction::Continue) | None => {
                self.call("Fetch.continueRequest", json!({ "requestId": request_id }))
                    .await
            }
        };
        if let Err(e) = outcome {
            debug!(target: "spel.cdp", "route reply failed: {}", e);
        }
    }

    async fn ensure_fetch(&self) -> FacadeResult<()> {
        if self.fetch_enabled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.call(
            "Fetch.enable",
            json!({
                "patterns": [{ "urlPattern": "*" }],
                "handleAuthRequests": self.has_credentials,
            }),
        )
        .await
        .map(|_| ())
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout.load(Ordering::Relaxed))
    }

    /// Execution context id for the active frame, `None` for the main frame.
    fn active_context_id(&self) -> FacadeResult<Option<i64>> {
        let active = self.active_frame.lock().unwrap().clone();
        match active {
            None => Ok(None),
            Some(frame_id) => self
                .frame_contexts
                .lock()
                .unwrap()
                .get(&frame_id)
                .copied()
                .map(Some)
                .ok_or_else(|| {
                    FacadeError::Protocol(
                        "frame has no script context yet; retry after it loads".into(),
                    )
                }),
        }
    }

    pub(super) async fn eval_in_context(
        &self,
        context_id: Option<i64>,
        js: &str,
    ) -> FacadeResult<Value> {
        let mut params = json!({
            "expression": js,
            "returnByValue": true,
            "awaitPromise": true,
        });
        if let Some(id) = context_id {
            params["contextId"] = json!(id);
        }
        let result = self.call("Runtime.evaluate", params).await?;
        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("evaluation failed");
            return Err(FacadeError::Protocol(message.to_string()));
        }
        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Evaluate in the active frame.
    pub(super) async fn eval(&self, js: &str) -> FacadeResult<Value> {
        let context_id = self.active_context_id()?;
        self.eval_in_context(context_id, js).await
    }

    /// Evaluate and hand back a remote object id instead of a value.
    pub(super) async fn eval_object_id(&self, js: &str) -> FacadeResult<String> {
        let mut params = json!({ "expression": js, "returnByValue": false });
        if let Some(id) = self.active_context_id()? {
            params["contextId"] = json!(id);
        }
        let result = self.call("Runtime.evaluate", params).await?;
        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("evaluation failed");
            return Err(FacadeError::Protocol(message.to_string()));
        }
        result
            .pointer("/result/objectId")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| FacadeError::Protocol("expression produced no object".into()))
    }

    pub(super) async fn dispatch_mouse(
        &self,
        kind: &str,
        x: f64,
        y: f64,
        button: &str,
        click_count: i64,
    ) -> FacadeResult<()> {
        *self.mouse_pos.lock().unwrap() = (x, y);
        self.call(
            "Input.dispatchMouseEvent",
            json!({
                "type": kind,
                "x": x,
                "y": y,
                "button": button,
                "clickCount": click_count,
            }),
        )
        .await?;
        Ok(())
    }

    pub(super) async fn click_at(&self, x: f64, y: f64, click_count: i64) -> FacadeResult<()> {
        self.dispatch_mouse("mouseMoved", x, y, "none", 0).await?;
        self.dispatch_mouse("mousePressed", x, y, "left", click_count)
            .await?;
        self.dispatch_mouse("mouseReleased", x, y, "left", click_count)
            .await?;
        Ok(())
    }

    pub(super) async fn insert_text(&self, text: &str) -> FacadeResult<()> {
        self.call("Input.insertText", json!({ "text": text })).await?;
        Ok(())
    }

    async fn dispatch_key(&self, kind: &str, combo: &str) -> FacadeResult<()> {
        let (modifiers, key) = keys::split_combo(combo);
        let desc = keys::describe(&key);
        let mut params = json!({
            "type": kind,
            "modifiers": modifiers,
            "key": desc.key,
            "code": desc.code,
            "windowsVirtualKeyCode": desc.key_code,
            "nativeVirtualKeyCode": desc.key_code,
        });
        if kind == "keyDown" {
            if let Some(text) = &desc.text {
                params["text"] = json!(text);
                params["type"] = json!("keyDown");
            } else {
                params["type"] = json!("rawKeyDown");
            }
        }
        self.call("Input.dispatchKeyEvent", params).await?;
        Ok(())
    }

    fn timeout_error(timeout: Duration, what: &str) -> FacadeError {
        FacadeError::Timeout(format!(
            "timed out after {}ms waiting for {}",
            timeout.as_millis(),
            what
        ))
    }

    fn flatten_frames(node: &Value, out: &mut Vec<FrameInfo>, ids: &mut Vec<String>) {
        if let Some(children) = node.get("childFrames").and_then(|v| v.as_array()) {
            for child in children {
                let frame = child.get("frame").cloned().unwrap_or(Value::Null);
                let id = frame
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                out.push(FrameInfo {
                    ordinal: out.len(),
                    name: frame
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    url: frame
                        .get("url")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                });
                ids.push(id);
                Self::flatten_frames(child, out, ids);
            }
        }
    }

    async fn frame_list(&self) -> FacadeResult<Vec<FrameInfo>> {
        let tree = self.call("Page.getFrameTree", json!({})).await?;
        let mut frames = Vec::new();
        let mut ids = Vec::new();
        if let Some(root) = tree.get("frameTree") {
            Self::flatten_frames(root, &mut frames, &mut ids);
        }
        *self.frame_order.lock().unwrap() = ids;
        Ok(frames)
    }
}

#[async_trait]
impl Page for CdpPage {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<PageEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    async fn goto(&self, url: &str) -> FacadeResult<()> {
        self.lifecycle.lock().unwrap().clear();
        let result = self.call("Page.navigate", json!({ "url": url })).await?;
        if let Some(err) = result.get("errorText").and_then(|v| v.as_str()) {
            if !err.is_empty() {
                return Err(FacadeError::Protocol(format!("navigation failed: {}", err)));
            }
        }
        self.wait_for_load_state(LoadState::Load, self.timeout().as_millis() as u64)
            .await
    }

    async fn reload(&self) -> FacadeResult<()> {
        self.lifecycle.lock().unwrap().clear();
        self.call("Page.reload", json!({})).await?;
        self.wait_for_load_state(LoadState::Load, self.timeout().as_millis() as u64)
            .await
    }

    async fn go_back(&self) -> FacadeResult<bool> {
        let history = self.call("Page.getNavigationHistory", json!({})).await?;
        let index = history
            .get("currentIndex")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let entries = history
            .get("entries")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        if index <= 0 {
            return Ok(false);
        }
        let Some(entry_id) = entries
            .get((index - 1) as usize)
            .and_then(|e| e.get("id"))
            .and_then(|v| v.as_i64())
        else {
            return Ok(false);
        };
        self.lifecycle.lock().unwrap().clear();
        self.call("Page.navigateToHistoryEntry", json!({ "entryId": entry_id }))
            .await?;
        self.wait_for_load_state(LoadState::Load, self.timeout().as_millis() as u64)
            .await?;
        Ok(true)
    }

    async fn go_forward(&self) -> FacadeResult<bool> {
        let history = self.call("Page.getNavigationHistory", json!({})).await?;
        let index = history
            .get("currentIndex")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let entries = history
            .get("entries")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let Some(entry_id) = entries
            .get((index + 1) as usize)
            .and_then(|e| e.get("id"))
            .and_then(|v| v.as_i64())
        else {
            return Ok(false);
        };
        self.lifecycle.lock().unwrap().clear();
        self.call("Page.navigateToHistoryEntry", json!({ "entryId": entry_id }))
            .await?;
        self.wait_for_load_state(LoadState::Load, self.timeout().as_millis() as u64)
            .await?;
        Ok(true)
    }

    async fn url(&self) -> FacadeResult<String> {
        let info = self
            .transport
            .call(
                None,
                "Target.getTargetInfo",
                json!({ "targetId": self.target_id }),
            )
            .await?;
        Ok(info
            .pointer("/targetInfo/url")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn title(&self) -> FacadeResult<String> {
        let value = self.eval_in_context(None, "document.title").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn content(&self) -> FacadeResult<String> {
        let value = self
            .eval_in_context(None, "document.documentElement.outerHTML")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn set_default_timeout(&self, ms: u64) {
        self.default_timeout.store(ms, Ordering::Relaxed);
    }

    async fn viewport(&self) -> FacadeResult<Option<Viewport>> {
        let metrics = self.call("Page.getLayoutMetrics", json!({})).await?;
        let width = metrics
            .pointer("/cssLayoutViewport/clientWidth")
            .and_then(|v| v.as_u64());
        let height = metrics
            .pointer("/cssLayoutViewport/clientHeight")
            .and_then(|v| v.as_u64());
        Ok(match (width, height) {
            (Some(w), Some(h)) => Some(Viewport {
                width: w as u32,
                height: h as u32,
            }),
            _ => None,
        })
    }

    async fn set_viewport(&self, viewport: Viewport) -> FacadeResult<()> {
        self.call(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": viewport.width,
                "height": viewport.height,
                "deviceScaleFactor": 0,
                "mobile": false,
            }),
        )
        .await?;
        Ok(())
    }

    async fn emulate_media(
        &self,
        color_scheme: Option<&str>,
        reduced_motion: Option<&str>,
    ) -> FacadeResult<()> {
        let mut features = Vec::new();
        if let Some(scheme) = color_scheme {
            features.push(json!({ "name": "prefers-color-scheme", "value": scheme }));
        }
        if let Some(motion) = reduced_motion {
            features.push(json!({ "name": "prefers-reduced-motion", "value": motion }));
        }
        self.call("Emulation.setEmulatedMedia", json!({ "features": features }))
            .await?;
        Ok(())
    }

    async fn add_script_tag(&self, content: &str) -> FacadeResult<()> {
        let js = format!(
            "(function () {{ const s = document.createElement('script'); \
             s.textContent = {}; document.head.appendChild(s); return true; }})()",
            serde_json::to_string(content).unwrap_or_default()
        );
        self.eval(&js).await?;
        Ok(())
    }

    async fn add_style_tag(&self, content: &str) -> FacadeResult<()> {
        let js = format!(
            "(function () {{ const s = document.createElement('style'); \
             s.textContent = {}; document.head.appendChild(s); return true; }})()",
            serde_json::to_string(content).unwrap_or_default()
        );
        self.eval(&js).await?;
        Ok(())
    }

    async fn evaluate(&self, js: &str) -> FacadeResult<Value> {
        self.eval(js).await
    }

    async fn evaluate_in_frame(&self, ordinal: usize, js: &str) -> FacadeResult<Value> {
        self.frame_list().await?;
        let frame_id = self
            .frame_order
            .lock()
            .unwrap()
            .get(ordinal)
            .cloned()
            .ok_or_else(|| FacadeError::NotFound(format!("frame #{}", ordinal)))?;
        let context_id = self
            .frame_contexts
            .lock()
            .unwrap()
            .get(&frame_id)
            .copied()
            .ok_or_else(|| {
                FacadeError::Protocol(format!("frame #{} has no script context yet", ordinal))
            })?;
        self.eval_in_context(Some(context_id), js).await
    }

    async fn screenshot(&self, opts: &ScreenshotOptions) -> FacadeResult<Vec<u8>> {
        let mut params = json!({ "format": "png" });
        if opts.full_page {
            let metrics = self.call("Page.getLayoutMetrics", json!({})).await?;
            let width = metrics
                .pointer("/cssContentSize/width")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            let height = metrics
                .pointer("/cssContentSize/height")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            if width > 0.0 && height > 0.0 {
                params["clip"] =
                    json!({ "x": 0, "y": 0, "width": width, "height": height, "scale": 1 });
                params["captureBeyondViewport"] = json!(true);
            }
        } else if let Some(clip) = &opts.clip {
            params["clip"] = json!({
                "x": clip.x, "y": clip.y,
                "width": clip.width, "height": clip.height,
                "scale": 1,
            });
            params["captureBeyondViewport"] = json!(true);
        }
        let result = self.call("Page.captureScreenshot", params).await?;
        let data = result
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FacadeError::Protocol("screenshot returned no data".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| FacadeError::Protocol(format!("bad screenshot payload: {}", e)))
    }

    async fn pdf(&self) -> FacadeResult<Vec<u8>> {
        let result = self.call("Page.printToPDF", json!({})).await?;
        let data = result
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FacadeError::Protocol("printToPDF returned no data".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| FacadeError::Protocol(format!("bad pdf payload: {}", e)))
    }

    fn locator(&self, selector: Selector) -> Arc<dyn Locator> {
        Arc::new(CdpLocator::new(self.self_weak.clone(), selector))
    }

    async fn key_down(&self, key: &str) -> FacadeResult<()> {
        self.dispatch_key("keyDown", key).await
    }

    async fn key_up(&self, key: &str) -> FacadeResult<()> {
        self.dispatch_key("keyUp", key).await
    }

    async fn press_key(&self, key: &str) -> FacadeResult<()> {
        self.dispatch_key("keyDown", key).await?;
        self.dispatch_key("keyUp", key).await
    }

    async fn mouse_move(&self, x: f64, y: f64) -> FacadeResult<()> {
        self.dispatch_mouse("mouseMoved", x, y, "none", 0).await
    }

    async fn mouse_down(&self, button: &str) -> FacadeResult<()> {
        let (x, y) = *self.mouse_pos.lock().unwrap();
        self.dispatch_mouse("mousePressed", x, y, button, 1).await
    }

    async fn mouse_up(&self, button: &str) -> FacadeResult<()> {
        let (x, y) = *self.mouse_pos.lock().unwrap();
        self.dispatch_mouse("mouseReleased", x, y, button, 1).await
    }

    async fn mouse_wheel(&self, delta_x: f64, delta_y: f64) -> FacadeResult<()> {
        let (x, y) = *self.mouse_pos.lock().unwrap();
        self.call(
            "Input.dispatchMouseEvent",
            json!({
                "type": "mouseWheel",
                "x": x,
                "y": y,
                "deltaX": delta_x,
                "deltaY": delta_y,
            }),
        )
        .await?;
        Ok(())
    }

    async fn touch_tap(&self, x: f64, y: f64) -> FacadeResult<()> {
        self.call(
            "Input.dispatchTouchEvent",
            json!({ "type": "touchStart", "touchPoints": [{ "x": x, "y": y }] }),
        )
        .await?;
        self.call(
            "Input.dispatchTouchEvent",
            json!({ "type": "touchEnd", "touchPoints": [] }),
        )
        .await?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &Selector, timeout_ms: u64) -> FacadeResult<()> {
        let timeout = Duration::from_millis(timeout_ms);
        let deadline = Instant::now() + timeout;
        let js = js::with_elements(selector, "return els.length > 0;");
        loop {
            if let Ok(Value::Bool(true)) = self.eval(&js).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Self::timeout_error(timeout, &js::describe(selector)));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_url(&self, pattern: &str, timeout_ms: u64) -> FacadeResult<String> {
        let timeout = Duration::from_millis(timeout_ms);
        let deadline = Instant::now() + timeout;
        loop {
            let url = self.url().await?;
            if glob_match(pattern, &url) {
                return Ok(url);
            }
            if Instant::now() >= deadline {
                return Err(Self::timeout_error(timeout, &format!("url {}", pattern)));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_function(&self, js: &str, timeout_ms: u64) -> FacadeResult<()> {
        let timeout = Duration::from_millis(timeout_ms);
        let deadline = Instant::now() + timeout;
        loop {
            match self.eval(js).await {
                Ok(value) if is_truthy(&value) => return Ok(()),
                _ => {}
            }
            if Instant::now() >= deadline {
                return Err(Self::timeout_error(timeout, "function to become truthy"));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout_ms: u64) -> FacadeResult<()> {
        let name = match state {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "DOMContentLoaded",
            LoadState::NetworkIdle => "networkIdle",
        };
        let timeout = Duration::from_millis(timeout_ms);
        let deadline = Instant::now() + timeout;
        loop {
            if self.lifecycle.lock().unwrap().contains(name) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Self::timeout_error(timeout, name));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let _ = tokio::time::timeout(
                remaining.min(POLL_INTERVAL),
                self.lifecycle_notify.notified(),
            )
            .await;
        }
    }

    async fn route(&self, pattern: &str, action: RouteAction) -> FacadeResult<()> {
        // Newest pattern wins on overlap.
        self.routes
            .lock()
            .unwrap()
            .insert(0, (pattern.to_string(), action));
        self.ensure_fetch().await
    }

    async fn unroute(&self, pattern: Option<&str>) -> FacadeResult<()> {
        {
            let mut routes = self.routes.lock().unwrap();
            match pattern {
                Some(p) => routes.retain(|(pat, _)| pat != p),
                None => routes.clear(),
            }
        }
        let empty = self.routes.lock().unwrap().is_empty();
        if empty && !self.has_credentials && self.fetch_enabled.swap(false, Ordering::SeqCst) {
            self.call("Fetch.disable", json!({})).await?;
        }
        Ok(())
    }

    async fn set_dialog_action(&self, action: Option<DialogAction>) -> FacadeResult<()> {
        *self.dialog_action.lock().unwrap() = action;
        Ok(())
    }

    async fn frames(&self) -> FacadeResult<Vec<FrameInfo>> {
        self.frame_list().await
    }

    async fn switch_frame(&self, name_or_url: &str) -> FacadeResult<FrameInfo> {
        let frames = self.frame_list().await?;
        let found = frames
            .into_iter()
            .find(|f| f.name == name_or_url || f.url.contains(name_or_url))
            .ok_or_else(|| FacadeError::NotFound(format!("frame {:?}", name_or_url)))?;
        let frame_id = self
            .frame_order
            .lock()
            .unwrap()
            .get(found.ordinal)
            .cloned()
            .ok_or_else(|| FacadeError::NotFound(format!("frame {:?}", name_or_url)))?;
        *self.active_frame.lock().unwrap() = Some(frame_id);
        Ok(found)
    }

    async fn switch_to_main_frame(&self) -> FacadeResult<()> {
        *self.active_frame.lock().unwrap() = None;
        Ok(())
    }

    async fn bring_to_front(&self) -> FacadeResult<()> {
        self.call("Page.bringToFront", json!({})).await?;
        Ok(())
    }

    async fn close(&self) -> FacadeResult<()> {
        self.transport
            .call(
                None,
                "Target.closeTarget",
                json!({ "targetId": self.target_id }),
            )
            .await?;
        self.emit(PageEvent::Closed);
        Ok(())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn remote_object_preview(obj: &Value) -> String {
    if let Some(value) = obj.get("value") {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    } else if let Some(desc) = obj.get("description").and_then(|v| v.as_str()) {
        desc.to_string()
    } else {
        String::new()
    }
}
