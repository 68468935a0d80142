//! Process-local daemon state: browser handles, launch flags, rings, refs.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::daemon::snapshot::RefTable;
use crate::facade::{
    Browser, BrowserContext, BrowserEngine, ContextOptions, DialogAction, FacadeError,
    LaunchOptions, Page, PageEvent, ProxyConfig,
};
use crate::session;

pub const REQUEST_RING_CAP: usize = 500;
pub const CONSOLE_RING_CAP: usize = 1000;
pub const ERROR_RING_CAP: usize = 1000;

/// Bounded drop-oldest buffer.
#[derive(Debug)]
pub struct Ring<T> {
    items: VecDeque<T>,
    cap: usize,
    dropped: u64,
}

impl<T: Clone> Ring<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::new(),
            cap,
            dropped: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.cap {
            self.items.pop_front();
            self.dropped += 1;
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.dropped = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsoleMessage {
    #[serde(rename = "type")]
    pub level: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageErrorEntry {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub url: String,
    pub method: String,
    pub status: u16,
    #[serde(rename = "resourceType")]
    pub resource_type: String,
}

/// One open tab: the page handle plus its event stream. The receiver is
/// drained into the rings before every dispatch, so command responses always
/// observe the events that preceded them.
pub struct Tab {
    pub page: Arc<dyn Page>,
    events: mpsc::UnboundedReceiver<PageEvent>,
}

impl Tab {
    pub fn new(page: Arc<dyn Page>) -> Self {
        let events = page.subscribe();
        Self { page, events }
    }
}

pub struct DaemonState {
    pub session: String,
    pub headless: bool,
    engine: Arc<dyn BrowserEngine>,
    pub browser: Option<Arc<dyn Browser>>,
    pub context: Option<Arc<dyn BrowserContext>>,
    pub tabs: Vec<Tab>,
    pub active_tab: usize,
    /// Launch-time flags, captured from the first client that set them and
    /// extended by later ones.
    pub launch_flags: Map<String, Value>,
    /// Options the current context was built with; context recreation starts
    /// from these.
    pub ctx_opts: ContextOptions,
    pub refs: RefTable,
    pub console: Ring<ConsoleMessage>,
    pub page_errors: Ring<PageErrorEntry>,
    pub requests: Ring<RequestSummary>,
    /// Pattern -> route kind, mirrored for `network_unroute` bookkeeping.
    pub routes: Vec<(String, String)>,
    pub dialog: Option<DialogAction>,
    pub tracing: bool,
    pub default_timeout_ms: u64,
}

impl DaemonState {
    pub fn new(session: String, headless: bool, engine: Arc<dyn BrowserEngine>) -> Self {
        Self {
            session,
            headless,
            engine,
            browser: None,
            context: None,
            tabs: Vec::new(),
            active_tab: 0,
            launch_flags: Map::new(),
            ctx_opts: ContextOptions::default(),
            refs: RefTable::default(),
            console: Ring::new(CONSOLE_RING_CAP),
            page_errors: Ring::new(ERROR_RING_CAP),
            requests: Ring::new(REQUEST_RING_CAP),
            routes: Vec::new(),
            dialog: None,
            tracing: false,
            default_timeout_ms: 30_000,
        }
    }

    pub fn flag(&self, key: &str) -> Option<&str> {
        self.launch_flags.get(key).and_then(|v| v.as_str())
    }

    pub fn merge_flags(&mut self, flags: &Map<String, Value>) {
        for (key, value) in flags {
            self.launch_flags.insert(key.clone(), value.clone());
        }
    }

    pub fn page(&self) -> Option<Arc<dyn Page>> {
        self.tabs.get(self.active_tab).map(|t| Arc::clone(&t.page))
    }

    /// Pull pending page events into the rings. Called at the top of every
    /// dispatch so responses observe everything that already happened.
    pub fn drain_events(&mut self) {
        for tab in &mut self.tabs {
            while let Ok(event) = tab.events.try_recv() {
                match event {
                    PageEvent::Console { level, text } => {
                        self.console.push(ConsoleMessage { level, text });
                    }
                    PageEvent::PageError { message } => {
                        self.page_errors.push(PageErrorEntry { message });
                    }
                    PageEvent::Response {
                        url,
                        method,
                        status,
                        resource_type,
                    } => {
                        self.requests.push(RequestSummary {
                            url,
                            method,
                            status,
                            resource_type,
                        });
                    }
                    PageEvent::Dialog { kind, message } => {
                        info!(target: "spel.daemon", kind, message, "dialog handled");
                    }
                    PageEvent::Download {
                        url,
                        suggested_filename,
                    } => {
                        info!(target: "spel.daemon", url, suggested_filename, "download started");
                    }
                    PageEvent::Popup { url } => {
                        info!(target: "spel.daemon", url, "popup opened");
                    }
                    PageEvent::Closed => {}
                }
            }
        }
    }

    fn launch_options(&self) -> LaunchOptions {
        let proxy = self.flag("proxy").map(|server| ProxyConfig {
            server: server.to_string(),
            bypass: self.flag("proxy_bypass").map(String::from),
        });
        LaunchOptions {
            headless: self.headless,
            executable_path: self.flag("executable_path").map(PathBuf::from),
            args: self
                .flag("args")
                .map(|a| {
                    a.split([',', '\n'])
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            proxy,
        }
    }

    /// Context options derived from launch flags. Device emulation and
    /// credentials are layered on top by their handlers.
    pub fn context_options(&self) -> ContextOptions {
        let mut opts = ContextOptions {
            user_agent: self.flag("user_agent").map(String::from),
            ignore_https_errors: self
                .launch_flags
                .get("ignore_https_errors")
                .map(|v| v.as_bool().unwrap_or(v.as_str() == Some("1")))
                .unwrap_or(false),
            ..ContextOptions::default()
        };
        if let Some(raw) = self.flag("headers") {
            match serde_json::from_str::<std::collections::HashMap<String, String>>(raw) {
                Ok(headers) => opts.extra_headers = headers,
                Err(e) => warn!(target: "spel.daemon", "ignoring bad --headers JSON: {}", e),
            }
        }
        // Named sessions auto-load their saved storage-state when one exists.
        if let Some(name) = self.flag("session_name") {
            let path = session::storage_state_path(name);
            if path.exists() {
                opts.storage_state_path = Some(path);
            }
        }
        opts
    }

    /// Lazy browser start. Persistent-profile and CDP launch flags pick the
    /// launch mode; otherwise a fresh browser plus context.
    pub async fn ensure_browser(&mut self) -> Result<(), FacadeError> {
        if self.browser.is_some() {
            return Ok(());
        }
        let launch_opts = self.launch_options();

        if let Some(profile) = self.flag("profile").map(PathBuf::from) {
            info!(target: "spel.daemon", profile = %profile.display(), "starting persistent browser");
            let browser = self.engine.launch_persistent(&profile, &launch_opts).await?;
            self.adopt_existing(browser).await?;
            return Ok(());
        }

        if let Some(endpoint) = self.flag("cdp").map(String::from) {
            self.connect_over_cdp(&endpoint).await?;
            return Ok(());
        }

        info!(target: "spel.daemon", headless = self.headless, "starting browser");
        let browser = self.engine.launch(&launch_opts).await?;
        let ctx_opts = self.context_options();
        let context = browser.new_context(&ctx_opts).await?;
        let page = context.new_page().await?;
        page.set_default_timeout(self.default_timeout_ms);
        self.browser = Some(browser);
        self.context = Some(context);
        self.ctx_opts = ctx_opts;
        self.tabs = vec![Tab::new(page)];
        self.active_tab = 0;
        Ok(())
    }

    /// Attach over CDP, reusing the first existing context and page.
    pub async fn connect_over_cdp(&mut self, endpoint: &str) -> Result<(), FacadeError> {
        if let Some(browser) = self.browser.take() {
            let _ = browser.close().await;
            self.context = None;
            self.tabs.clear();
        }
        info!(target: "spel.daemon", endpoint, "connecting over CDP");
        let browser = self.engine.connect_cdp(endpoint).await?;
        self.adopt_existing(browser).await
    }

    /// Take ownership of a browser whose context/pages may already exist.
    async fn adopt_existing(&mut self, browser: Arc<dyn Browser>) -> Result<(), FacadeError> {
        let context = match browser.contexts().await?.into_iter().next() {
            Some(existing) => existing,
            None => browser.new_context(&self.context_options()).await?,
        };
        let page = match context.pages().await?.into_iter().next() {
            Some(existing) => existing,
            None => context.new_page().await?,
        };
        page.set_default_timeout(self.default_timeout_ms);
        self.browser = Some(browser);
        self.context = Some(context);
        self.ctx_opts = self.context_options();
        self.tabs = vec![Tab::new(page)];
        self.active_tab = 0;
        Ok(())
    }

    /// Tear down and rebuild the context with new options. Order matters:
    /// save trace, close pages, close context, recreate, re-attach listeners,
    /// reset refs and tracing, best-effort re-navigation to the prior URL.
    pub async fn recreate_context(
        &mut self,
        new_opts: ContextOptions,
    ) -> Result<bool, FacadeError> {
        let prior_url = match self.page() {
            Some(page) => page.url().await.ok().filter(|u| u != "about:blank"),
            None => None,
        };

        if self.tracing {
            self.autosave_trace().await;
        }
        for tab in self.tabs.drain(..) {
            let _ = tab.page.close().await;
        }
        if let Some(context) = self.context.take() {
            let _ = context.close().await;
        }

        let browser = self
            .browser
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| FacadeError::Protocol("browser not started".into()))?;
        let context = browser.new_context(&new_opts).await?;
        let page = context.new_page().await?;
        page.set_default_timeout(self.default_timeout_ms);
        self.context = Some(context);
        self.ctx_opts = new_opts;
        self.tabs = vec![Tab::new(page)];
        self.active_tab = 0;
        self.refs.clear();
        self.tracing = false;

        let mut restored = true;
        if let Some(url) = prior_url {
            if let Some(page) = self.page() {
                if let Err(e) = page.goto(&url).await {
                    warn!(target: "spel.daemon", url, "could not re-navigate after context recreation: {}", e);
                    restored = false;
                }
            }
        }
        Ok(restored)
    }

    /// Flush an in-flight trace to an auto-generated path. Best-effort; the
    /// path is surfaced in the log so the recording is never silently lost.
    pub async fn autosave_trace(&mut self) {
        if !self.tracing {
            return;
        }
        self.tracing = false;
        let Some(context) = self.context.as_ref() else {
            return;
        };
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        let path = std::env::temp_dir().join(format!("trace-autosave-{}.zip", stamp));
        match context.trace_stop(&path).await {
            Ok(()) => {
                warn!(target: "spel.daemon", path = %path.display(), "in-flight trace auto-saved");
                eprintln!("warning: in-flight trace auto-saved to {}", path.display());
            }
            Err(e) => {
                warn!(target: "spel.daemon", "trace auto-save failed: {}", e);
            }
        }
    }

    /// Orderly teardown: trace first, then page, context, browser.
    pub async fn shutdown_browser(&mut self) {
        self.autosave_trace().await;
        if let Some(name) = self.flag("session_name").map(String::from) {
            if let Some(context) = self.context.as_ref() {
                let path = session::storage_state_path(&name);
                match context.save_storage_state(&path).await {
                    Ok(()) => {
                        info!(target: "spel.daemon", path = %path.display(), "storage state auto-saved")
                    }
                    Err(e) => warn!(target: "spel.daemon", "storage state auto-save failed: {}", e),
                }
            }
        }
        for tab in self.tabs.drain(..) {
            let _ = tab.page.close().await;
        }
        if let Some(context) = self.context.take() {
            let _ = context.close().await;
        }
        if let Some(browser) = self.browser.take() {
            let _ = browser.close().await;
        }
        self.refs.clear();
        self.routes.clear();
        self.dialog = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_bound() {
        let mut ring = Ring::new(3);
        for i in 0..10 {
            ring.push(i);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.to_vec(), vec![7, 8, 9]);
        assert_eq!(ring.dropped(), 7);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.dropped(), 0);
    }

    #[test]
    fn test_merge_flags_extends() {
        let engine = crate::facade::fake::FakeEngine::new();
        let mut state = DaemonState::new("t".into(), true, engine);
        let mut first = Map::new();
        first.insert("proxy".into(), Value::String("http://p:1".into()));
        state.merge_flags(&first);
        let mut second = Map::new();
        second.insert("user_agent".into(), Value::String("UA".into()));
        state.merge_flags(&second);
        assert_eq!(state.flag("proxy"), Some("http://p:1"));
        assert_eq!(state.flag("user_agent"), Some("UA"));
    }
}
