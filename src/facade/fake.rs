//! In-memory facade used by the protocol and dispatch tests.
//!
//! Every operation is appended to a shared action log the tests can assert
//! on; page state (url, history, canned snapshot, element text) is plain
//! data. No browser is involved anywhere.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::{
    BoundingBox, Browser, BrowserContext, BrowserEngine, ContextOptions, Cookie, DialogAction,
    FacadeError, FacadeResult, FrameInfo, LaunchOptions, LoadState, Locator, Page, PageEvent,
    RouteAction, ScreenshotOptions, Selector, Viewport,
};

pub type ActionLog = Arc<Mutex<Vec<String>>>;

/// Valid 1x1 transparent PNG, so size/magic checks on screenshots pass.
pub const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x62, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

fn default_walker_result() -> Value {
    json!({
        "tree": {
            "role": "WebArea",
            "name": "Example Domain",
            "tag": "body",
            "children": [
                {
                    "role": "heading",
                    "name": "Example Domain",
                    "tag": "h1",
                    "ref": "e1",
                    "attrs": { "level": 1 },
                    "children": [],
                },
                {
                    "role": "link",
                    "name": "More information...",
                    "tag": "a",
                    "ref": "e2",
                    "interactive": true,
                    "cursor": true,
                    "children": [],
                },
            ],
        },
        "refs": {
            "e1": { "role": "heading", "name": "Example Domain", "tag": "h1",
                    "box": { "x": 100, "y": 50, "width": 600, "height": 40 }, "mixed": false },
            "e2": { "role": "link", "name": "More information...", "tag": "a",
                    "box": { "x": 100, "y": 200, "width": 150, "height": 20 }, "mixed": false },
        },
        "counter": 2,
    })
}

type PageRegistry = Arc<Mutex<Vec<Arc<FakePage>>>>;

pub struct FakeEngine {
    pub log: ActionLog,
    pub snapshot_value: Arc<Mutex<Value>>,
    pub responses_per_nav: usize,
    pages: PageRegistry,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Self::with_responses_per_nav(3)
    }

    pub fn with_responses_per_nav(responses: usize) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(Mutex::new(Vec::new())),
            snapshot_value: Arc::new(Mutex::new(default_walker_result())),
            responses_per_nav: responses,
            pages: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn logged(&self, needle: &str) -> bool {
        self.log.lock().unwrap().iter().any(|l| l.contains(needle))
    }

    /// Most recently created page; tests use it to emit events.
    pub fn last_page(&self) -> Option<Arc<FakePage>> {
        self.pages.lock().unwrap().last().cloned()
    }

    fn push(&self, line: String) {
        self.log.lock().unwrap().push(line);
    }

    fn make_browser(&self, prebuilt_context: bool) -> Arc<FakeBrowser> {
        Arc::new(FakeBrowser {
            log: Arc::clone(&self.log),
            snapshot_value: Arc::clone(&self.snapshot_value),
            responses_per_nav: self.responses_per_nav,
            registry: Arc::clone(&self.pages),
            prebuilt_context,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    async fn launch(&self, opts: &LaunchOptions) -> FacadeResult<Arc<dyn Browser>> {
        self.push(format!(
            "launch headless={} proxy={}",
            opts.headless,
            opts.proxy.as_ref().map(|p| p.server.as_str()).unwrap_or("-"),
        ));
        Ok(self.make_browser(false))
    }

    async fn launch_persistent(
        &self,
        profile_dir: &Path,
        opts: &LaunchOptions,
    ) -> FacadeResult<Arc<dyn Browser>> {
        self.push(format!(
            "launch-persistent {} headless={}",
            profile_dir.display(),
            opts.headless
        ));
        Ok(self.make_browser(true))
    }

    async fn connect_cdp(&self, endpoint: &str) -> FacadeResult<Arc<dyn Browser>> {
        self.push(format!("connect-cdp {}", endpoint));
        Ok(self.make_browser(true))
    }
}

pub struct FakeBrowser {
    log: ActionLog,
    snapshot_value: Arc<Mutex<Value>>,
    responses_per_nav: usize,
    registry: PageRegistry,
    prebuilt_context: bool,
    closed: AtomicBool,
}

impl FakeBrowser {
    fn make_context(&self, opts: &ContextOptions) -> Arc<FakeContext> {
        Arc::new(FakeContext {
            log: Arc::clone(&self.log),
            snapshot_value: Arc::clone(&self.snapshot_value),
            responses_per_nav: self.responses_per_nav,
            registry: Arc::clone(&self.registry),
            opts: opts.clone(),
            cookies: Mutex::new(Vec::new()),
            pages: Mutex::new(Vec::new()),
            tracing: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_context(&self, opts: &ContextOptions) -> FacadeResult<Arc<dyn BrowserContext>> {
        self.log.lock().unwrap().push(format!(
            "new-context ua={} headers={} tls={} state={}",
            opts.user_agent.as_deref().unwrap_or("-"),
            opts.extra_headers.len(),
            opts.ignore_https_errors,
            opts.storage_state_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".into()),
        ));
        if let Some(path) = &opts.storage_state_path {
            if !path.exists() {
                return Err(FacadeError::NotFound(format!(
                    "no such state file: {}",
                    path.display()
                )));
            }
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<Value>(&raw).map_err(|e| {
                FacadeError::Protocol(format!("state file is corrupt: {}", e))
            })?;
        }
        Ok(self.make_context(opts) as Arc<dyn BrowserContext>)
    }

    async fn contexts(&self) -> FacadeResult<Vec<Arc<dyn BrowserContext>>> {
        if !self.prebuilt_context {
            return Ok(Vec::new());
        }
        let context = self.make_context(&ContextOptions::default());
        let _ = context.new_page().await?;
        Ok(vec![context as Arc<dyn BrowserContext>])
    }

    async fn close(&self) -> FacadeResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.log.lock().unwrap().push("browser closed".into());
        Ok(())
    }
}

pub struct FakeContext {
    log: ActionLog,
    snapshot_value: Arc<Mutex<Value>>,
    responses_per_nav: usize,
    registry: PageRegistry,
    pub opts: ContextOptions,
    pub cookies: Mutex<Vec<Cookie>>,
    pages: Mutex<Vec<Arc<FakePage>>>,
    tracing: AtomicBool,
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn new_page(&self) -> FacadeResult<Arc<dyn Page>> {
        let page = Arc::new(FakePage {
            log: Arc::clone(&self.log),
            snapshot_value: Arc::clone(&self.snapshot_value),
            responses_per_nav: self.responses_per_nav,
            url: Mutex::new("about:blank".to_string()),
            titles: Mutex::new(HashMap::new()),
            history: Mutex::new((vec!["about:blank".to_string()], 0)),
            subscribers: Mutex::new(Vec::new()),
            eval_queue: Mutex::new(VecDeque::new()),
            element_text: Mutex::new(HashMap::new()),
            checked: Mutex::new(HashMap::new()),
            viewport: Mutex::new(Viewport { width: 1280, height: 720 }),
            frames: Mutex::new(Vec::new()),
            routes: Mutex::new(Vec::new()),
        });
        self.pages.lock().unwrap().push(Arc::clone(&page));
        self.registry.lock().unwrap().push(Arc::clone(&page));
        self.log.lock().unwrap().push("new-page".into());
        Ok(page)
    }

    async fn pages(&self) -> FacadeResult<Vec<Arc<dyn Page>>> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn Page>)
            .collect())
    }

    async fn cookies(&self) -> FacadeResult<Vec<Cookie>> {
        Ok(self.cookies.lock().unwrap().clone())
    }

    async fn add_cookies(&self, cookies: Vec<Cookie>) -> FacadeResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("add-cookies {}", cookies.len()));
        self.cookies.lock().unwrap().extend(cookies);
        Ok(())
    }

    async fn clear_cookies(&self) -> FacadeResult<()> {
        self.log.lock().unwrap().push("clear-cookies".into());
        self.cookies.lock().unwrap().clear();
        Ok(())
    }

    async fn save_storage_state(&self, path: &Path) -> FacadeResult<()> {
        let cookies = self.cookies.lock().unwrap().clone();
        let state = json!({ "cookies": cookies, "origins": [] });
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&state).unwrap_or_default())?;
        self.log
            .lock()
            .unwrap()
            .push(format!("save-state {}", path.display()));
        Ok(())
    }

    async fn grant_permissions(&self, permissions: &[String]) -> FacadeResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("grant-permissions {}", permissions.join(",")));
        Ok(())
    }

    async fn clear_permissions(&self) -> FacadeResult<()> {
        self.log.lock().unwrap().push("clear-permissions".into());
        Ok(())
    }

    async fn set_geolocation(&self, latitude: f64, longitude: f64) -> FacadeResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("set-geolocation {} {}", latitude, longitude));
        Ok(())
    }

    async fn set_offline(&self, offline: bool) -> FacadeResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("set-offline {}", offline));
        Ok(())
    }

    async fn set_extra_headers(&self, headers: HashMap<String, String>) -> FacadeResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("set-extra-headers {}", headers.len()));
        Ok(())
    }

    async fn trace_start(&self) -> FacadeResult<()> {
        self.tracing.store(true, Ordering::SeqCst);
        self.log.lock().unwrap().push("trace-start".into());
        Ok(())
    }

    async fn trace_stop(&self, path: &Path) -> FacadeResult<()> {
        self.tracing.store(false, Ordering::SeqCst);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        let mut archive = zip::ZipWriter::new(file);
        archive
            .start_file("trace.json", zip::write::SimpleFileOptions::default())
            .map_err(|e| FacadeError::Protocol(e.to_string()))?;
        use std::io::Write as _;
        archive.write_all(br#"{"traceEvents":[]}"#)?;
        archive
            .finish()
            .map_err(|e| FacadeError::Protocol(e.to_string()))?;
        self.log
            .lock()
            .unwrap()
            .push(format!("trace-stop {}", path.display()));
        Ok(())
    }

    async fn close(&self) -> FacadeResult<()> {
        self.log.lock().unwrap().push("context closed".into());
        self.pages.lock().unwrap().clear();
        Ok(())
    }
}

pub struct FakePage {
    log: ActionLog,
    snapshot_value: Arc<Mutex<Value>>,
    responses_per_nav: usize,
    url: Mutex<String>,
    titles: Mutex<HashMap<String, String>>,
    history: Mutex<(Vec<String>, usize)>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PageEvent>>>,
    pub eval_queue: Mutex<VecDeque<Value>>,
    pub element_text: Mutex<HashMap<String, String>>,
    checked: Mutex<HashMap<String, bool>>,
    viewport: Mutex<Viewport>,
    pub frames: Mutex<Vec<FrameInfo>>,
    pub routes: Mutex<Vec<String>>,
}

impl FakePage {
    fn push(&self, line: String) {
        self.log.lock().unwrap().push(line);
    }

    fn emit(&self, event: PageEvent) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn emit_console(&self, level: &str, text: &str) {
        self.emit(PageEvent::Console {
            level: level.to_string(),
            text: text.to_string(),
        });
    }

    pub fn emit_page_error(&self, message: &str) {
        self.emit(PageEvent::PageError {
            message: message.to_string(),
        });
    }

    pub fn set_element_text(&self, selector_desc: &str, text: &str) {
        self.element_text
            .lock()
            .unwrap()
            .insert(selector_desc.to_string(), text.to_string());
    }

    fn normalize(url: &str) -> String {
        url::Url::parse(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string())
    }
}

#[async_trait]
impl Page for FakePage {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<PageEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    async fn goto(&self, url: &str) -> FacadeResult<()> {
        let normalized = Self::normalize(url);
        self.push(format!("goto {}", normalized));
        *self.url.lock().unwrap() = normalized.clone();
        {
            let mut history = self.history.lock().unwrap();
            let index = history.1;
            history.0.truncate(index + 1);
            history.0.push(normalized.clone());
            history.1 = history.0.len() - 1;
        }
        self.emit(PageEvent::Response {
            url: normalized.clone(),
            method: "GET".into(),
            status: 200,
            resource_type: "document".into(),
        });
        for i in 0..self.responses_per_nav {
            self.emit(PageEvent::Response {
                url: format!("{}asset-{}.js", normalized, i),
                method: "GET".into(),
                status: 200,
                resource_type: "script".into(),
            });
        }
        Ok(())
    }

    async fn reload(&self) -> FacadeResult<()> {
        self.push("reload".into());
        Ok(())
    }

    async fn go_back(&self) -> FacadeResult<bool> {
        let mut history = self.history.lock().unwrap();
        if history.1 == 0 {
            return Ok(false);
        }
        history.1 -= 1;
        let url = history.0[history.1].clone();
        drop(history);
        *self.url.lock().unwrap() = url;
        self.push("back".into());
        Ok(true)
    }

    async fn go_forward(&self) -> FacadeResult<bool> {
        let mut history = self.history.lock().unwrap();
        if history.1 + 1 >= history.0.len() {
            return Ok(false);
        }
        history.1 += 1;
        let url = history.0[history.1].clone();
        drop(history);
        *self.url.lock().unwrap() = url;
        self.push("forward".into());
        Ok(true)
    }

    async fn url(&self) -> FacadeResult<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn title(&self) -> FacadeResult<String> {
        let url = self.url.lock().unwrap().clone();
        Ok(self
            .titles
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .unwrap_or_else(|| format!("Title of {}", url)))
    }

    async fn content(&self) -> FacadeResult<String> {
        Ok("<html><body>fake</body></html>".to_string())
    }

    fn set_default_timeout(&self, ms: u64) {
        self.log
            .lock()
            .unwrap()
            .push(format!("set-default-timeout {}", ms));
    }

    async fn viewport(&self) -> FacadeResult<Option<Viewport>> {
        Ok(Some(*self.viewport.lock().unwrap()))
    }

    async fn set_viewport(&self, viewport: Viewport) -> FacadeResult<()> {
        self.push(format!("set-viewport {}x{}", viewport.width, viewport.height));
        *self.viewport.lock().unwrap() = viewport;
        Ok(())
    }

    async fn emulate_media(
        &self,
        color_scheme: Option<&str>,
        reduced_motion: Option<&str>,
    ) -> FacadeResult<()> {
        self.push(format!(
            "emulate-media scheme={} motion={}",
            color_scheme.unwrap_or("-"),
            reduced_motion.unwrap_or("-"),
        ));
        Ok(())
    }

    async fn add_script_tag(&self, _content: &str) -> FacadeResult<()> {
        self.push("add-script-tag".into());
        Ok(())
    }

    async fn add_style_tag(&self, _content: &str) -> FacadeResult<()> {
        self.push("add-style-tag".into());
        Ok(())
    }

    async fn evaluate(&self, js: &str) -> FacadeResult<Value> {
        if js.contains("__spelWalk") {
            self.push("evaluate walker".into());
            return Ok(self.snapshot_value.lock().unwrap().clone());
        }
        if js.contains("__spelAnnotate") {
            self.push("evaluate annotate".into());
            return Ok(json!(2));
        }
        self.push(format!("evaluate {}", &js[..js.len().min(60)]));
        if let Some(canned) = self.eval_queue.lock().unwrap().pop_front() {
            return Ok(canned);
        }
        Ok(Value::Null)
    }

    async fn evaluate_in_frame(&self, ordinal: usize, _js: &str) -> FacadeResult<Value> {
        self.push(format!("evaluate-in-frame {}", ordinal));
        Ok(json!({ "tree": null, "refs": {}, "counter": 0 }))
    }

    async fn screenshot(&self, opts: &ScreenshotOptions) -> FacadeResult<Vec<u8>> {
        self.push(format!("screenshot full={}", opts.full_page));
        Ok(PNG_1X1.to_vec())
    }

    async fn pdf(&self) -> FacadeResult<Vec<u8>> {
        self.push("pdf".into());
        Ok(b"%PDF-1.4 fake".to_vec())
    }

    fn locator(&self, selector: Selector) -> Arc<dyn Locator> {
        Arc::new(FakeLocator {
            log: Arc::clone(&self.log),
            element_text: {
                let map = self.element_text.lock().unwrap().clone();
                Arc::new(Mutex::new(map))
            },
            checked: Mutex::new(false),
            selector,
        })
    }

    async fn key_down(&self, key: &str) -> FacadeResult<()> {
        self.push(format!("keydown {}", key));
        Ok(())
    }

    async fn key_up(&self, key: &str) -> FacadeResult<()> {
        self.push(format!("keyup {}", key));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> FacadeResult<()> {
        self.push(format!("press {}", key));
        Ok(())
    }

    async fn mouse_move(&self, x: f64, y: f64) -> FacadeResult<()> {
        self.push(format!("mouse-move {} {}", x, y));
        Ok(())
    }

    async fn mouse_down(&self, button: &str) -> FacadeResult<()> {
        self.push(format!("mouse-down {}", button));
        Ok(())
    }

    async fn mouse_up(&self, button: &str) -> FacadeResult<()> {
        self.push(format!("mouse-up {}", button));
        Ok(())
    }

    async fn mouse_wheel(&self, delta_x: f64, delta_y: f64) -> FacadeResult<()> {
        self.push(format!("mouse-wheel {} {}", delta_x, delta_y));
        Ok(())
    }

    async fn touch_tap(&self, x: f64, y: f64) -> FacadeResult<()> {
        self.push(format!("touch-tap {} {}", x, y));
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &Selector, _timeout_ms: u64) -> FacadeResult<()> {
        self.push(format!("wait-selector {}", selector.describe()));
        Ok(())
    }

    async fn wait_for_url(&self, pattern: &str, _timeout_ms: u64) -> FacadeResult<String> {
        let url = self.url.lock().unwrap().clone();
        if super::glob_match(pattern, &url) {
            Ok(url)
        } else {
            Err(FacadeError::Timeout(format!(
                "timed out waiting for url {}",
                pattern
            )))
        }
    }

    async fn wait_for_function(&self, js: &str, _timeout_ms: u64) -> FacadeResult<()> {
        self.push(format!("wait-function {}", &js[..js.len().min(40)]));
        Ok(())
    }

    async fn wait_for_load_state(&self, _state: LoadState, _timeout_ms: u64) -> FacadeResult<()> {
        Ok(())
    }

    async fn route(&self, pattern: &str, action: RouteAction) -> FacadeResult<()> {
        let kind = match action {
            RouteAction::Abort => "abort",
            RouteAction::Fulfill { .. } => "fulfill",
            RouteAction::Continue => "continue",
        };
        self.push(format!("route {} {}", pattern, kind));
        self.routes.lock().unwrap().push(pattern.to_string());
        Ok(())
    }

    async fn unroute(&self, pattern: Option<&str>) -> FacadeResult<()> {
        self.push(format!("unroute {}", pattern.unwrap_or("*all*")));
        match pattern {
            Some(p) => self.routes.lock().unwrap().retain(|r| r != p),
            None => self.routes.lock().unwrap().clear(),
        }
        Ok(())
    }

    async fn set_dialog_action(&self, action: Option<DialogAction>) -> FacadeResult<()> {
        match &action {
            Some(a) => self.push(format!("dialog accept={}", a.accept)),
            None => self.push("dialog cleared".into()),
        }
        Ok(())
    }

    async fn frames(&self) -> FacadeResult<Vec<FrameInfo>> {
        Ok(self.frames.lock().unwrap().clone())
    }

    async fn switch_frame(&self, name_or_url: &str) -> FacadeResult<FrameInfo> {
        let frames = self.frames.lock().unwrap();
        frames
            .iter()
            .find(|f| f.name == name_or_url || f.url.contains(name_or_url))
            .cloned()
            .ok_or_else(|| FacadeError::NotFound(format!("frame {:?}", name_or_url)))
    }

    async fn switch_to_main_frame(&self) -> FacadeResult<()> {
        self.push("main-frame".into());
        Ok(())
    }

    async fn bring_to_front(&self) -> FacadeResult<()> {
        self.push("bring-to-front".into());
        Ok(())
    }

    async fn close(&self) -> FacadeResult<()> {
        self.push("page closed".into());
        self.emit(PageEvent::Closed);
        Ok(())
    }
}

pub struct FakeLocator {
    log: ActionLog,
    element_text: Arc<Mutex<HashMap<String, String>>>,
    checked: Mutex<bool>,
    selector: Selector,
}

impl FakeLocator {
    fn push(&self, op: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} {}", op, self.selector.describe()));
    }
}

#[async_trait]
impl Locator for FakeLocator {
    async fn click(&self) -> FacadeResult<()> {
        self.push("click");
        Ok(())
    }

    async fn dblclick(&self) -> FacadeResult<()> {
        self.push("dblclick");
        Ok(())
    }

    async fn fill(&self, value: &str) -> FacadeResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("fill {} = {}", self.selector.describe(), value));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> FacadeResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("type {} = {}", self.selector.describe(), text));
        Ok(())
    }

    async fn press(&self, key: &str) -> FacadeResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("press {} {}", self.selector.describe(), key));
        Ok(())
    }

    async fn clear(&self) -> FacadeResult<()> {
        self.push("clear");
        Ok(())
    }

    async fn check(&self) -> FacadeResult<()> {
        self.push("check");
        *self.checked.lock().unwrap() = true;
        Ok(())
    }

    async fn uncheck(&self) -> FacadeResult<()> {
        self.push("uncheck");
        *self.checked.lock().unwrap() = false;
        Ok(())
    }

    async fn hover(&self) -> FacadeResult<()> {
        self.push("hover");
        Ok(())
    }

    async fn focus(&self) -> FacadeResult<()> {
        self.push("focus");
        Ok(())
    }

    async fn select_option(&self, value: &str) -> FacadeResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("select {} = {}", self.selector.describe(), value));
        Ok(())
    }

    async fn drag_to(&self, target: &dyn Locator) -> FacadeResult<()> {
        self.log.lock().unwrap().push(format!(
            "drag {} -> {}",
            self.selector.describe(),
            target.selector().describe()
        ));
        Ok(())
    }

    async fn set_input_files(&self, files: &[PathBuf]) -> FacadeResult<()> {
        self.log.lock().unwrap().push(format!(
            "upload {} files={}",
            self.selector.describe(),
            files.len()
        ));
        Ok(())
    }

    async fn scroll_into_view(&self) -> FacadeResult<()> {
        self.push("scroll-into-view");
        Ok(())
    }

    async fn scroll_by(&self, delta_x: f64, delta_y: f64) -> FacadeResult<()> {
        self.log.lock().unwrap().push(format!(
            "scroll-by {} {} {}",
            self.selector.describe(),
            delta_x,
            delta_y
        ));
        Ok(())
    }

    async fn highlight(&self) -> FacadeResult<()> {
        self.push("highlight");
        Ok(())
    }

    async fn text(&self) -> FacadeResult<String> {
        self.push("text");
        Ok(self
            .element_text
            .lock()
            .unwrap()
            .get(&self.selector.describe())
            .cloned()
            .unwrap_or_else(|| "fake text".to_string()))
    }

    async fn inner_html(&self) -> FacadeResult<String> {
        self.push("inner-html");
        Ok("<span>fake</span>".to_string())
    }

    async fn input_value(&self) -> FacadeResult<String> {
        self.push("input-value");
        Ok("fake value".to_string())
    }

    async fn get_attribute(&self, name: &str) -> FacadeResult<Option<String>> {
        self.log
            .lock()
            .unwrap()
            .push(format!("get-attribute {} {}", self.selector.describe(), name));
        Ok(Some(format!("{}-value", name)))
    }

    async fn is_visible(&self) -> FacadeResult<bool> {
        self.push("is-visible");
        Ok(true)
    }

    async fn is_enabled(&self) -> FacadeResult<bool> {
        self.push("is-enabled");
        Ok(true)
    }

    async fn is_checked(&self) -> FacadeResult<bool> {
        self.push("is-checked");
        Ok(*self.checked.lock().unwrap())
    }

    async fn count(&self) -> FacadeResult<usize> {
        self.push("count");
        Ok(1)
    }

    async fn bounding_box(&self) -> FacadeResult<Option<BoundingBox>> {
        self.push("bounding-box");
        Ok(Some(BoundingBox {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 30.0,
        }))
    }

    async fn screenshot(&self) -> FacadeResult<Vec<u8>> {
        self.push("element-screenshot");
        Ok(PNG_1X1.to_vec())
    }

    async fn evaluate(&self, _js_body: &str) -> FacadeResult<Value> {
        self.push("locator-evaluate");
        Ok(Value::Null)
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }
}
