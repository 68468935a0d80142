//! Browser facade port.
//!
//! The daemon drives the browser exclusively through these traits. The CDP
//! adapter under [`cdp`] is the production implementation; [`fake`] is an
//! in-memory one used by the protocol tests. Facade calls return
//! `Result<T, FacadeError>` and never panic into the dispatch frame.

pub mod cdp;
pub mod fake;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub type FacadeResult<T> = Result<T, FacadeError>;

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("CDP connect failed: {0}")]
    Connect(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("{0}")]
    Timeout(String),
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headless: bool,
    pub executable_path: Option<PathBuf>,
    pub args: Vec<String>,
    pub proxy: Option<ProxyConfig>,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub server: String,
    pub bypass: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct HttpCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub user_agent: Option<String>,
    pub extra_headers: HashMap<String, String>,
    pub ignore_https_errors: bool,
    pub storage_state_path: Option<PathBuf>,
    pub viewport: Option<Viewport>,
    pub device_scale_factor: Option<f64>,
    pub is_mobile: bool,
    pub has_touch: bool,
    pub http_credentials: Option<HttpCredentials>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(rename = "httpOnly", skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(rename = "sameSite", skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

/// Events surfaced from the live page. The daemon drains these into its
/// console/error/request rings; dialogs are answered inside the adapter by
/// the installed [`DialogAction`].
#[derive(Debug, Clone)]
pub enum PageEvent {
    Console { level: String, text: String },
    PageError { message: String },
    Response {
        url: String,
        method: String,
        status: u16,
        resource_type: String,
    },
    Dialog { kind: String, message: String },
    Download { url: String, suggested_filename: String },
    Popup { url: String },
    Closed,
}

#[derive(Debug, Clone)]
pub struct DialogAction {
    pub accept: bool,
    pub prompt_text: Option<String>,
}

/// What an installed route does with a matched request.
#[derive(Debug, Clone)]
pub enum RouteAction {
    Abort,
    Fulfill {
        status: u16,
        content_type: Option<String>,
        body: String,
    },
    Continue,
}

/// Element designation, resolved lazily by the adapter on each operation.
#[derive(Debug, Clone)]
pub enum Selector {
    Css(String),
    Role {
        role: String,
        name: Option<String>,
        exact: bool,
    },
    Text { text: String, exact: bool },
    Label { text: String, exact: bool },
    Placeholder { text: String, exact: bool },
    AltText { text: String, exact: bool },
    Title { text: String, exact: bool },
    TestId(String),
    /// 0-based; -1 addresses the last match.
    Nth { base: Box<Selector>, index: i64 },
}

impl Selector {
    /// Human-readable form for error messages and logs.
    pub fn describe(&self) -> String {
        match self {
            Selector::Css(css) => css.clone(),
            Selector::Role { role, name, .. } => match name {
                Some(n) => format!("role={} name={:?}", role, n),
                None => format!("role={}", role),
            },
            Selector::Text { text, .. } => format!("text={:?}", text),
            Selector::Label { text, .. } => format!("label={:?}", text),
            Selector::Placeholder { text, .. } => format!("placeholder={:?}", text),
            Selector::AltText { text, .. } => format!("alt={:?}", text),
            Selector::Title { text, .. } => format!("title={:?}", text),
            Selector::TestId(id) => format!("testid={:?}", id),
            Selector::Nth { base, index } => format!("{} >> nth={}", base.describe(), index),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameInfo {
    pub ordinal: usize,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl LoadState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "load" => Some(LoadState::Load),
            "domcontentloaded" => Some(LoadState::DomContentLoaded),
            "networkidle" => Some(LoadState::NetworkIdle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScreenshotOptions {
    pub full_page: bool,
    pub clip: Option<BoundingBox>,
}

/// Engine lifecycle: the entry point the daemon holds for its whole life.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn launch(&self, opts: &LaunchOptions) -> FacadeResult<Arc<dyn Browser>>;

    /// Launch directly on a user profile directory; browser and context are
    /// inseparable, surfaced via [`Browser::contexts`].
    async fn launch_persistent(
        &self,
        profile_dir: &Path,
        opts: &LaunchOptions,
    ) -> FacadeResult<Arc<dyn Browser>>;

    /// Attach to an already-running browser over CDP. `endpoint` is an
    /// `http(s)://` devtools address or a `ws(s)://` debugger URL.
    async fn connect_cdp(&self, endpoint: &str) -> FacadeResult<Arc<dyn Browser>>;
}

#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_context(&self, opts: &ContextOptions) -> FacadeResult<Arc<dyn BrowserContext>>;

    /// Contexts that already exist (persistent launch, CDP attach). Empty
    /// after a fresh `launch`.
    async fn contexts(&self) -> FacadeResult<Vec<Arc<dyn BrowserContext>>>;

    async fn close(&self) -> FacadeResult<()>;
}

#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> FacadeResult<Arc<dyn Page>>;
    async fn pages(&self) -> FacadeResult<Vec<Arc<dyn Page>>>;

    async fn cookies(&self) -> FacadeResult<Vec<Cookie>>;
    async fn add_cookies(&self, cookies: Vec<Cookie>) -> FacadeResult<()>;
    async fn clear_cookies(&self) -> FacadeResult<()>;

    /// Capture cookies and local storage into the opaque storage-state file.
    async fn save_storage_state(&self, path: &Path) -> FacadeResult<()>;

    async fn grant_permissions(&self, permissions: &[String]) -> FacadeResult<()>;
    async fn clear_permissions(&self) -> FacadeResult<()>;
    async fn set_geolocation(&self, latitude: f64, longitude: f64) -> FacadeResult<()>;
    async fn set_offline(&self, offline: bool) -> FacadeResult<()>;
    async fn set_extra_headers(&self, headers: HashMap<String, String>) -> FacadeResult<()>;

    async fn trace_start(&self) -> FacadeResult<()>;
    async fn trace_stop(&self, path: &Path) -> FacadeResult<()>;

    async fn close(&self) -> FacadeResult<()>;
}

#[async_trait]
pub trait Page: Send + Sync {
    /// New event stream for this page. Each call returns an independent
    /// receiver; the adapter fans events out to all of them.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<PageEvent>;

    async fn goto(&self, url: &str) -> FacadeResult<()>;
    async fn reload(&self) -> FacadeResult<()>;
    async fn go_back(&self) -> FacadeResult<bool>;
    async fn go_forward(&self) -> FacadeResult<bool>;
    async fn url(&self) -> FacadeResult<String>;
    async fn title(&self) -> FacadeResult<String>;
    async fn content(&self) -> FacadeResult<String>;

    fn set_default_timeout(&self, ms: u64);

    async fn viewport(&self) -> FacadeResult<Option<Viewport>>;
    async fn set_viewport(&self, viewport: Viewport) -> FacadeResult<()>;
    async fn emulate_media(
        &self,
        color_scheme: Option<&str>,
        reduced_motion: Option<&str>,
    ) -> FacadeResult<()>;

    async fn add_script_tag(&self, content: &str) -> FacadeResult<()>;
    async fn add_style_tag(&self, content: &str) -> FacadeResult<()>;

    /// Evaluate in the active frame. Expressions and function bodies both
    /// work; promises are awaited.
    async fn evaluate(&self, js: &str) -> FacadeResult<Value>;
    async fn evaluate_in_frame(&self, ordinal: usize, js: &str) -> FacadeResult<Value>;

    async fn screenshot(&self, opts: &ScreenshotOptions) -> FacadeResult<Vec<u8>>;
    async fn pdf(&self) -> FacadeResult<Vec<u8>>;

    fn locator(&self, selector: Selector) -> Arc<dyn Locator>;

    async fn key_down(&self, key: &str) -> FacadeResult<()>;
    async fn key_up(&self, key: &str) -> FacadeResult<()>;
    async fn press_key(&self, key: &str) -> FacadeResult<()>;
    async fn mouse_move(&self, x: f64, y: f64) -> FacadeResult<()>;
    async fn mouse_down(&self, button: &str) -> FacadeResult<()>;
    async fn mouse_up(&self, button: &str) -> FacadeResult<()>;
    async fn mouse_wheel(&self, delta_x: f64, delta_y: f64) -> FacadeResult<()>;
    async fn touch_tap(&self, x: f64, y: f64) -> FacadeResult<()>;

    async fn wait_for_selector(&self, selector: &Selector, timeout_ms: u64) -> FacadeResult<()>;
    async fn wait_for_url(&self, pattern: &str, timeout_ms: u64) -> FacadeResult<String>;
    async fn wait_for_function(&self, js: &str, timeout_ms: u64) -> FacadeResult<()>;
    async fn wait_for_load_state(&self, state: LoadState, timeout_ms: u64) -> FacadeResult<()>;

    async fn route(&self, pattern: &str, action: RouteAction) -> FacadeResult<()>;
    async fn unroute(&self, pattern: Option<&str>) -> FacadeResult<()>;

    async fn set_dialog_action(&self, action: Option<DialogAction>) -> FacadeResult<()>;

    /// Child frames of the main frame, in tree order.
    async fn frames(&self) -> FacadeResult<Vec<FrameInfo>>;
    /// Point locators and `evaluate` at the frame matching a name or URL
    /// substring; `switch_to_main_frame` undoes it.
    async fn switch_frame(&self, name_or_url: &str) -> FacadeResult<FrameInfo>;
    async fn switch_to_main_frame(&self) -> FacadeResult<()>;

    async fn bring_to_front(&self) -> FacadeResult<()>;
    async fn close(&self) -> FacadeResult<()>;
}

#[async_trait]
pub trait Locator: Send + Sync {
    async fn click(&self) -> FacadeResult<()>;
    async fn dblclick(&self) -> FacadeResult<()>;
    async fn fill(&self, value: &str) -> FacadeResult<()>;
    async fn type_text(&self, text: &str) -> FacadeResult<()>;
    async fn press(&self, key: &str) -> FacadeResult<()>;
    async fn clear(&self) -> FacadeResult<()>;
    async fn check(&self) -> FacadeResult<()>;
    async fn uncheck(&self) -> FacadeResult<()>;
    async fn hover(&self) -> FacadeResult<()>;
    async fn focus(&self) -> FacadeResult<()>;
    async fn select_option(&self, value: &str) -> FacadeResult<()>;
    async fn drag_to(&self, target: &dyn Locator) -> FacadeResult<()>;
    async fn set_input_files(&self, files: &[PathBuf]) -> FacadeResult<()>;
    async fn scroll_into_view(&self) -> FacadeResult<()>;
    async fn scroll_by(&self, delta_x: f64, delta_y: f64) -> FacadeResult<()>;
    async fn highlight(&self) -> FacadeResult<()>;

    async fn text(&self) -> FacadeResult<String>;
    async fn inner_html(&self) -> FacadeResult<String>;
    async fn input_value(&self) -> FacadeResult<String>;
    async fn get_attribute(&self, name: &str) -> FacadeResult<Option<String>>;
    async fn is_visible(&self) -> FacadeResult<bool>;
    async fn is_enabled(&self) -> FacadeResult<bool>;
    async fn is_checked(&self) -> FacadeResult<bool>;
    async fn count(&self) -> FacadeResult<usize>;
    async fn bounding_box(&self) -> FacadeResult<Option<BoundingBox>>;
    async fn screenshot(&self) -> FacadeResult<Vec<u8>>;
    /// Run a JS statement body with the element bound as `el`.
    async fn evaluate(&self, js_body: &str) -> FacadeResult<Value>;

    /// The underlying selector, for diagnostics.
    fn selector(&self) -> &Selector;
}

/// Glob match for route patterns and `wait url`: `*` spans within a path
/// segment, `**` spans segments. A pattern with no glob chars matches by
/// substring, which is what shell users reach for first.
pub fn glob_match(pattern: &str, url: &str) -> bool {
    if !pattern.contains('*') {
        return url.contains(pattern);
    }
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    regex.push_str(".*");
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push('.'),
            c if "\\.+()[]{}^$|".contains(c) => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
    }
    regex.push('$');
    // Anchored match fails for prefixed URLs unless the pattern says **, so
    // also accept a match anywhere when the pattern has no anchors.
    simple_regex_match(&regex, url) || simple_regex_match(&regex.replace('^', "").replace('$', ""), url)
}

/// Minimal regex executor for the patterns `glob_match` generates (literals,
/// `.`, `.*`, `[^/]*`, anchors). Avoids pulling a regex crate into the port.
fn simple_regex_match(regex: &str, text: &str) -> bool {
    #[derive(Debug)]
    enum Tok {
        Lit(char),
        AnyOne,
        AnyMany,
        NonSlashMany,
    }
    let mut toks = Vec::new();
    let anchored_start = regex.starts_with('^');
    let anchored_end = regex.ends_with('$');
    let body = regex.trim_start_matches('^').trim_end_matches('$');
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    toks.push(Tok::Lit(escaped));
                }
            }
            '.' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    toks.push(Tok::AnyMany);
                } else {
                    toks.push(Tok::AnyOne);
                }
            }
            '[' => {
                // Only [^/] is ever generated.
                for c2 in chars.by_ref() {
                    if c2 == ']' {
                        break;
                    }
                }
                if chars.peek() == Some(&'*') {
                    chars.next();
                    toks.push(Tok::NonSlashMany);
                }
            }
            c => toks.push(Tok::Lit(c)),
        }
    }

    fn matches(toks: &[Tok], text: &[char], anchored_end: bool) -> bool {
        match toks.first() {
            None => !anchored_end || text.is_empty(),
            Some(Tok::Lit(c)) => {
                text.first() == Some(c) && matches(&toks[1..], &text[1..], anchored_end)
            }
            Some(Tok::AnyOne) => {
                !text.is_empty() && matches(&toks[1..], &text[1..], anchored_end)
            }
            Some(Tok::AnyMany) => (0..=text.len())
                .any(|i| matches(&toks[1..], &text[i..], anchored_end)),
            Some(Tok::NonSlashMany) => {
                let limit = text.iter().position(|&c| c == '/').unwrap_or(text.len());
                (0..=limit).any(|i| matches(&toks[1..], &text[i..], anchored_end))
            }
        }
    }

    let chars: Vec<char> = text.chars().collect();
    if anchored_start {
        matches(&toks, &chars, anchored_end)
    } else {
        (0..=chars.len()).any(|i| matches(&toks, &chars[i..], anchored_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match_double_star() {
        assert!(glob_match("**/ads/**", "https://site.com/ads/banner.js"));
        assert!(!glob_match("**/ads/**", "https://site.com/article"));
    }

    #[test]
    fn test_glob_match_single_star_stays_in_segment() {
        assert!(glob_match("https://x.dev/*.png", "https://x.dev/a.png"));
        assert!(!glob_match("https://x.dev/*.png", "https://x.dev/deep/a.png"));
    }

    #[test]
    fn test_plain_pattern_is_substring() {
        assert!(glob_match("example.com", "https://example.com/path"));
        assert!(!glob_match("other.com", "https://example.com/path"));
    }

    #[test]
    fn test_load_state_parse() {
        assert_eq!(LoadState::parse("load"), Some(LoadState::Load));
        assert_eq!(LoadState::parse("networkidle"), Some(LoadState::NetworkIdle));
        assert_eq!(LoadState::parse("bogus"), None);
    }
}
