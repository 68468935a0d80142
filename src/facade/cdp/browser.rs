//! Browser adapter and the engine entry point.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Child;
use tracing::{info, warn};

use super::context::CdpContext;
use super::launch::{launch_browser, resolve_ws_url};
use super::transport::CdpTransport;
use crate::facade::{
    Browser, BrowserContext, BrowserEngine, ContextOptions, FacadeError, FacadeResult,
    LaunchOptions,
};

pub struct CdpBrowser {
    transport: Arc<CdpTransport>,
    child: Mutex<Option<Child>>,
    temp_profile: Option<PathBuf>,
    /// Persistent launches and CDP attaches expose the browser's default
    /// context through `contexts()`.
    has_default_context: bool,
    default_context_opts: ContextOptions,
}

#[async_trait]
impl Browser for CdpBrowser {
    async fn new_context(&self, opts: &ContextOptions) -> FacadeResult<Arc<dyn BrowserContext>> {
        let created = self
            .transport
            .call(None, "Target.createBrowserContext", json!({}))
            .await?;
        let context_id = created
            .get("browserContextId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                FacadeError::Protocol("createBrowserContext returned no id".into())
            })?
            .to_string();
        let context =
            CdpContext::create(Arc::clone(&self.transport), Some(context_id), opts.clone())
                .await?;
        Ok(context as Arc<dyn BrowserContext>)
    }

    /// Wrap the default context and its existing page targets. Attaches to
    /// each target, so call this once per browser.
    async fn contexts(&self) -> FacadeResult<Vec<Arc<dyn BrowserContext>>> {
        if !self.has_default_context {
            return Ok(Vec::new());
        }
        let context = CdpContext::create(
            Arc::clone(&self.transport),
            None,
            self.default_context_opts.clone(),
        )
        .await?;

        let targets = self
            .transport
            .call(None, "Target.getTargets", json!({}))
            .await?;
        if let Some(infos) = targets.get("targetInfos").and_then(|v| v.as_array()) {
            for info in infos {
                let kind = info.get("type").and_then(|v| v.as_str()).unwrap_or("");
                let url = info.get("url").and_then(|v| v.as_str()).unwrap_or("");
                if kind != "page" || url.starts_with("devtools://") {
                    continue;
                }
                if let Some(target_id) = info.get("targetId").and_then(|v| v.as_str()) {
                    if let Err(e) = context.adopt_page(target_id.to_string()).await {
                        warn!(target: "spel.cdp", "could not adopt target {}: {}", target_id, e);
                    }
                }
            }
        }
        Ok(vec![context as Arc<dyn BrowserContext>])
    }

    async fn close(&self) -> FacadeResult<()> {
        let _ = self.transport.call(None, "Browser.close", json!({})).await;
        let child = self.child.lock().unwrap().take();
        if let Some(mut child) = child {
            match tokio::time::timeout(Duration::from_secs(3), child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(target: "spel.cdp", "browser did not exit, killing");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }
        if let Some(dir) = &self.temp_profile {
            let _ = std::fs::remove_dir_all(dir);
        }
        Ok(())
    }
}

/// Production engine: spawns chromium and talks CDP over its devtools socket.
pub struct CdpEngine;

impl CdpEngine {
    pub fn new() -> Arc<dyn BrowserEngine> {
        Arc::new(Self)
    }
}

#[async_trait]
impl BrowserEngine for CdpEngine {
    async fn launch(&self, opts: &LaunchOptions) -> FacadeResult<Arc<dyn Browser>> {
        let launched = launch_browser(opts, None).await?;
        let transport = CdpTransport::connect(&launched.ws_url).await?;
        Ok(Arc::new(CdpBrowser {
            transport,
            child: Mutex::new(Some(launched.child)),
            temp_profile: launched.temp_profile,
            has_default_context: false,
            default_context_opts: ContextOptions::default(),
        }))
    }

    async fn launch_persistent(
        &self,
        profile_dir: &Path,
        opts: &LaunchOptions,
    ) -> FacadeResult<Arc<dyn Browser>> {
        std::fs::create_dir_all(profile_dir)?;
        let launched = launch_browser(opts, Some(profile_dir)).await?;
        let transport = CdpTransport::connect(&launched.ws_url).await?;
        info!(target: "spel.cdp", profile = %profile_dir.display(), "persistent context ready");
        Ok(Arc::new(CdpBrowser {
            transport,
            child: Mutex::new(Some(launched.child)),
            temp_profile: None,
            has_default_context: true,
            default_context_opts: ContextOptions::default(),
        }))
    }

    async fn connect_cdp(&self, endpoint: &str) -> FacadeResult<Arc<dyn Browser>> {
        let ws_url = resolve_ws_url(endpoint).await?;
        let transport = CdpTransport::connect(&ws_url).await?;
        info!(target: "spel.cdp", endpoint, "attached over CDP");
        Ok(Arc::new(CdpBrowser {
            transport,
            child: Mutex::new(None),
            temp_profile: None,
            has_default_context: true,
            default_context_opts: ContextOptions::default(),
        }))
    }
}
