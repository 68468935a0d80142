//! Browser context adapter: an isolated cookie/storage universe plus the
//! pages living in it.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::page::CdpPage;
use super::transport::CdpTransport;
use crate::facade::{
    BrowserContext, ContextOptions, Cookie, FacadeError, FacadeResult, Page,
};

pub struct CdpContext {
    transport: Arc<CdpTransport>,
    /// `None` is the browser's default context (persistent launch, CDP attach).
    context_id: Option<String>,
    opts: ContextOptions,
    init_script: Option<String>,
    pages: Mutex<Vec<Arc<CdpPage>>>,
    trace_events: Arc<Mutex<Vec<Value>>>,
    tracing_page: Mutex<Option<Arc<CdpPage>>>,
}

impl CdpContext {
    pub(super) async fn create(
        transport: Arc<CdpTransport>,
        context_id: Option<String>,
        opts: ContextOptions,
    ) -> FacadeResult<Arc<Self>> {
        let mut init_script = None;
        if let Some(path) = opts.storage_state_path.clone() {
            if !path.exists() {
                return Err(FacadeError::NotFound(format!(
                    "no such state file: {}",
                    path.display()
                )));
            }
            let raw = std::fs::read_to_string(&path)?;
            let state: Value = serde_json::from_str(&raw).map_err(|e| {
                FacadeError::Protocol(format!("state file is corrupt: {}", e))
            })?;

            if let Some(cookies) = state.get("cookies").and_then(|v| v.as_array()) {
                if !cookies.is_empty() {
                    let mut params = json!({ "cookies": cookies });
                    if let Some(id) = &context_id {
                        params["browserContextId"] = json!(id);
                    }
                    transport.call(None, "Storage.setCookies", params).await?;
                }
            }
            init_script = build_storage_seed(&state);
        }

        Ok(Arc::new(Self {
            transport,
            context_id,
            opts,
            init_script,
            pages: Mutex::new(Vec::new()),
            trace_events: Arc::new(Mutex::new(Vec::new())),
            tracing_page: Mutex::new(None),
        }))
    }

    /// Wrap a target that already exists (persistent profile, CDP attach).
    pub(super) async fn adopt_page(&self, target_id: String) -> FacadeResult<Arc<dyn Page>> {
        let page = CdpPage::attach(
            Arc::clone(&self.transport),
            target_id,
            &self.opts,
            self.init_script.clone(),
            Arc::clone(&self.trace_events),
        )
        .await?;
        self.pages.lock().unwrap().push(Arc::clone(&page));
        Ok(page)
    }

    fn scoped(&self, mut params: Value) -> Value {
        if let Some(id) = &self.context_id {
            params["browserContextId"] = json!(id);
        }
        params
    }

    fn live_pages(&self) -> Vec<Arc<CdpPage>> {
        self.pages.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserContext for CdpContext {
    async fn new_page(&self) -> FacadeResult<Arc<dyn Page>> {
        let created = self
            .transport
            .call(
                None,
                "Target.createTarget",
                self.scoped(json!({ "url": "about:blank" })),
            )
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FacadeError::Protocol("createTarget returned no targetId".into()))?
            .to_string();
        self.adopt_page(target_id).await
    }

    async fn pages(&self) -> FacadeResult<Vec<Arc<dyn Page>>> {
        Ok(self
            .live_pages()
            .into_iter()
            .map(|p| p as Arc<dyn Page>)
            .collect())
    }

    async fn cookies(&self) -> FacadeResult<Vec<Cookie>> {
        let result = self
            .transport
            .call(None, "Storage.getCookies", self.scoped(json!({})))
            .await?;
        let cookies = result.get("cookies").cloned().unwrap_or(json!([]));
        serde_json::from_value(cookies)
            .map_err(|e| FacadeError::Protocol(format!("bad cookie payload: {}", e)))
    }

    async fn add_cookies(&self, cookies: Vec<Cookie>) -> FacadeResult<()> {
        let payload = serde_json::to_value(&cookies)
            .map_err(|e| FacadeError::Protocol(e.to_string()))?;
        self.transport
            .call(
                None,
                "Storage.setCookies",
                self.scoped(json!({ "cookies": payload })),
            )
            .await?;
        Ok(())
    }

    async fn clear_cookies(&self) -> FacadeResult<()> {
        self.transport
            .call(None, "Storage.clearCookies", self.scoped(json!({})))
            .await?;
        Ok(())
    }

    async fn save_storage_state(&self, path: &Path) -> FacadeResult<()> {
        let cookies = self.cookies().await?;
        let mut origins: Vec<Value> = Vec::new();
        for page in self.live_pages() {
            let collected = page
                .eval(
                    "(function () { const out = []; try { \
                       for (let i = 0; i < localStorage.length; i++) { \
                         const k = localStorage.key(i); \
                         out.push({ name: k, value: localStorage.getItem(k) }); \
                       } \
                     } catch (e) {} \
                     return { origin: location.origin, localStorage: out }; })()",
                )
                .await
                .unwrap_or(Value::Null);
            if let Some(origin) = collected.get("origin").and_then(|v| v.as_str()) {
                if origin != "null" {
                    origins.push(json!({
                        "origin": origin,
                        "localStorage": collected.get("localStorage").cloned().unwrap_or(json!([])),
                    }));
                }
            }
        }
        let state = json!({ "cookies": cookies, "origins": origins });
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&state).unwrap_or_default())?;
        Ok(())
    }

    async fn grant_permissions(&self, permissions: &[String]) -> FacadeResult<()> {
        self.transport
            .call(
                None,
                "Browser.grantPermissions",
                self.scoped(json!({ "permissions": permissions })),
            )
            .await?;
        Ok(())
    }

    async fn clear_permissions(&self) -> FacadeResult<()> {
        self.transport
            .call(None, "Browser.resetPermissions", self.scoped(json!({})))
            .await?;
        Ok(())
    }

    async fn set_geolocation(&self, latitude: f64, longitude: f64) -> FacadeResult<()> {
        self.grant_permissions(&["geolocation".to_string()]).await?;
        for page in self.live_pages() {
            page.session_call(
                "Emulation.setGeolocationOverride",
                json!({ "latitude": latitude, "longitude": longitude, "accuracy": 1 }),
            )
            .await?;
        }
        Ok(())
    }

    async fn set_offline(&self, offline: bool) -> FacadeResult<()> {
        for page in self.live_pages() {
            page.session_call(
                "Network.emulateNetworkConditions",
                json!({
                    "offline": offline,
                    "latency": 0,
                    "downloadThroughput": -1,
                    "uploadThroughput": -1,
                }),
            )
            .await?;
        }
        Ok(())
    }

    async fn set_extra_headers(&self, headers: HashMap<String, String>) -> FacadeResult<()> {
        for page in self.live_pages() {
            page.session_call("Network.setExtraHTTPHeaders", json!({ "headers": headers }))
                .await?;
        }
        Ok(())
    }

    async fn trace_start(&self) -> FacadeResult<()> {
        let page = self
            .live_pages()
            .into_iter()
            .next()
            .ok_or_else(|| FacadeError::Protocol("no page to trace".into()))?;
        self.trace_events.lock().unwrap().clear();
        page.session_call(
            "Tracing.start",
            json!({
                "transferMode": "ReportEvents",
                "traceConfig": {
                    "includedCategories": [
                        "devtools.timeline",
                        "blink.user_timing",
                        "loading",
                    ],
                },
            }),
        )
        .await?;
        *self.tracing_page.lock().unwrap() = Some(page);
        Ok(())
    }

    async fn trace_stop(&self, path: &Path) -> FacadeResult<()> {
        let page = self
            .tracing_page
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| FacadeError::Protocol("tracing is not active".into()))?;
        page.session_call("Tracing.end", json!({})).await?;
        page.wait_trace_complete(Duration::from_secs(10)).await;

        let events = std::mem::take(&mut *self.trace_events.lock().unwrap());
        let body =
            serde_json::to_string(&json!({ "traceEvents": events })).unwrap_or_default();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        let mut archive = zip::ZipWriter::new(file);
        archive
            .start_file(
                "trace.json",
                zip::write::SimpleFileOptions::default()
                    .compression_method(zip::CompressionMethod::Deflated),
            )
            .map_err(|e| FacadeError::Protocol(format!("zip error: {}", e)))?;
        archive.write_all(body.as_bytes())?;
        archive
            .finish()
            .map_err(|e| FacadeError::Protocol(format!("zip error: {}", e)))?;
        debug!(target: "spel.cdp", path = %path.display(), "trace written");
        Ok(())
    }

    async fn close(&self) -> FacadeResult<()> {
        let pages: Vec<_> = self.pages.lock().unwrap().drain(..).collect();
        for page in pages {
            let _ = page.close().await;
        }
        if let Some(id) = &self.context_id {
            self.transport
                .call(
                    None,
                    "Target.disposeBrowserContext",
                    json!({ "browserContextId": id }),
                )
                .await?;
        }
        Ok(())
    }
}

/// Script that replays saved localStorage into matching origins before any
/// page script runs.
fn build_storage_seed(state: &Value) -> Option<String> {
    let origins = state.get("origins")?.as_array()?;
    if origins.is_empty() {
        return None;
    }
    let mut seeds = serde_json::Map::new();
    for origin in origins {
        let key = origin.get("origin")?.as_str()?.to_string();
        let mut entries = serde_json::Map::new();
        if let Some(items) = origin.get("localStorage").and_then(|v| v.as_array()) {
            for item in items {
                if let (Some(name), Some(value)) = (
                    item.get("name").and_then(|v| v.as_str()),
                    item.get("value").and_then(|v| v.as_str()),
                ) {
                    entries.insert(name.to_string(), json!(value));
                }
            }
        }
        seeds.insert(key, Value::Object(entries));
    }
    Some(format!(
        "(function () {{ try {{ \
           const seeds = {}; \
           const entry = seeds[location.origin]; \
           if (entry && !window.__spelStorageSeeded) {{ \
             window.__spelStorageSeeded = true; \
             for (const k in entry) localStorage.setItem(k, entry[k]); \
           }} \
         }} catch (e) {{}} }})();",
        Value::Object(seeds)
    ))
}
