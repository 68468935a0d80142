//! Lazy element handle. Every operation re-resolves the selector in the
//! page, so a locator stays valid across DOM churn as long as something
//! still matches.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::js;
use super::page::CdpPage;
use crate::facade::{
    BoundingBox, FacadeError, FacadeResult, Locator, Page, ScreenshotOptions, Selector,
};

pub struct CdpLocator {
    page: Weak<CdpPage>,
    selector: Selector,
}

impl CdpLocator {
    pub(super) fn new(page: Weak<CdpPage>, selector: Selector) -> Self {
        Self { page, selector }
    }

    fn page(&self) -> FacadeResult<Arc<CdpPage>> {
        self.page
            .upgrade()
            .ok_or_else(|| FacadeError::Protocol("page is closed".into()))
    }

    /// Evaluate `body` with the first match bound as `el`; missing elements
    /// surface as `NotFound`.
    async fn eval_el(&self, body: &str) -> FacadeResult<Value> {
        let page = self.page()?;
        let value = page.eval(&js::with_element(&self.selector, body)).await?;
        if let Some(missing) = value.get("__missing").and_then(|v| v.as_str()) {
            return Err(FacadeError::NotFound(missing.to_string()));
        }
        Ok(value)
    }

    /// Viewport center of the element, scrolled into view first.
    async fn center(&self) -> FacadeResult<(f64, f64)> {
        let value = self
            .eval_el(
                "el.scrollIntoView({ block: 'center', inline: 'center' }); \
                 const r = el.getBoundingClientRect(); \
                 return { x: r.x + r.width / 2, y: r.y + r.height / 2 };",
            )
            .await?;
        let x = value.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let y = value.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0);
        Ok((x, y))
    }
}

#[async_trait]
impl Locator for CdpLocator {
    async fn click(&self) -> FacadeResult<()> {
        let (x, y) = self.center().await?;
        self.page()?.click_at(x, y, 1).await
    }

    async fn dblclick(&self) -> FacadeResult<()> {
        let (x, y) = self.center().await?;
        let page = self.page()?;
        page.click_at(x, y, 1).await?;
        page.click_at(x, y, 2).await
    }

    async fn fill(&self, value: &str) -> FacadeResult<()> {
        self.eval_el(
            "el.focus(); if (el.select) el.select(); \
             if ('value' in el) el.value = ''; \
             else if (el.isContentEditable) el.textContent = ''; \
             return true;",
        )
        .await?;
        self.page()?.insert_text(value).await?;
        self.eval_el(
            "el.dispatchEvent(new Event('input', { bubbles: true })); \
             el.dispatchEvent(new Event('change', { bubbles: true })); \
             return true;",
        )
        .await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> FacadeResult<()> {
        self.eval_el("el.focus(); return true;").await?;
        let page = self.page()?;
        for ch in text.chars() {
            page.press_key(&ch.to_string()).await?;
        }
        Ok(())
    }

    async fn press(&self, key: &str) -> FacadeResult<()> {
        self.eval_el("el.focus(); return true;").await?;
        self.page()?.press_key(key).await
    }

    async fn clear(&self) -> FacadeResult<()> {
        self.eval_el(
            "el.focus(); \
             if ('value' in el) { el.value = ''; } \
             else if (el.isContentEditable) { el.textContent = ''; } \
             el.dispatchEvent(new Event('input', { bubbles: true })); \
             el.dispatchEvent(new Event('change', { bubbles: true })); \
             return true;",
        )
        .await?;
        Ok(())
    }

    async fn check(&self) -> FacadeResult<()> {
        if self.is_checked().await? {
            return Ok(());
        }
        self.click().await
    }

    async fn uncheck(&self) -> FacadeResult<()> {
        if !self.is_checked().await? {
            return Ok(());
        }
        self.click().await
    }

    async fn hover(&self) -> FacadeResult<()> {
        let (x, y) = self.center().await?;
        self.page()?.dispatch_mouse("mouseMoved", x, y, "none", 0).await
    }

    async fn focus(&self) -> FacadeResult<()> {
        self.eval_el("el.focus(); return true;").await?;
        Ok(())
    }

    async fn select_option(&self, value: &str) -> FacadeResult<()> {
        let body = format!(
            "const want = {}; \
             const opt = Array.from(el.options || []).find(function (o) {{ \
               return o.value === want || o.label.trim() === want || o.textContent.trim() === want; \
             }}); \
             if (!opt) return {{ __missing: 'option ' + want }}; \
             el.value = opt.value; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return true;",
            serde_json::to_string(value).unwrap_or_default()
        );
        self.eval_el(&body).await?;
        Ok(())
    }

    async fn drag_to(&self, target: &dyn Locator) -> FacadeResult<()> {
        let page = self.page()?;
        let (sx, sy) = self.center().await?;
        let target_rect = page
            .eval(&js::with_element(
                target.selector(),
                "el.scrollIntoView({ block: 'center', inline: 'center' }); \
                 const r = el.getBoundingClientRect(); \
                 return { x: r.x + r.width / 2, y: r.y + r.height / 2 };",
            ))
            .await?;
        if let Some(missing) = target_rect.get("__missing").and_then(|v| v.as_str()) {
            return Err(FacadeError::NotFound(missing.to_string()));
        }
        let tx = target_rect.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let ty = target_rect.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0);

        page.dispatch_mouse("mouseMoved", sx, sy, "none", 0).await?;
        page.dispatch_mouse("mousePressed", sx, sy, "left", 1).await?;
        // Intermediate move so dragover handlers fire.
        page.dispatch_mouse("mouseMoved", (sx + tx) / 2.0, (sy + ty) / 2.0, "none", 0)
            .await?;
        page.dispatch_mouse("mouseMoved", tx, ty, "none", 0).await?;
        page.dispatch_mouse("mouseReleased", tx, ty, "left", 1).await?;
        Ok(())
    }

    async fn set_input_files(&self, files: &[PathBuf]) -> FacadeResult<()> {
        let page = self.page()?;
        let expr = format!(
            "(function () {{ const els = {}; return els[0] || null; }})()",
            js::finder_expr(&self.selector)
        );
        let object_id = page.eval_object_id(&expr).await.map_err(|_| {
            FacadeError::NotFound(js::describe(&self.selector))
        })?;
        page.session_call("DOM.enable", json!({})).await?;
        let file_list: Vec<String> = files
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        page.session_call(
            "DOM.setFileInputFiles",
            json!({ "files": file_list, "objectId": object_id }),
        )
        .await?;
        Ok(())
    }

    async fn scroll_into_view(&self) -> FacadeResult<()> {
        self.eval_el(
            "el.scrollIntoView({ block: 'center', inline: 'center' }); return true;",
        )
        .await?;
        Ok(())
    }

    async fn scroll_by(&self, delta_x: f64, delta_y: f64) -> FacadeResult<()> {
        let body = format!("el.scrollBy({}, {}); return true;", delta_x, delta_y);
        self.eval_el(&body).await?;
        Ok(())
    }

    async fn highlight(&self) -> FacadeResult<()> {
        self.eval_el(
            "el.style.outline = '2px solid #f33'; \
             el.style.outlineOffset = '2px'; \
             return true;",
        )
        .await?;
        Ok(())
    }

    async fn text(&self) -> FacadeResult<String> {
        let value = self
            .eval_el("return (el.innerText || el.textContent || '').trim();")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn inner_html(&self) -> FacadeResult<String> {
        let value = self.eval_el("return el.innerHTML;").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn input_value(&self) -> FacadeResult<String> {
        let value = self
            .eval_el("return ('value' in el) ? String(el.value) : '';")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn get_attribute(&self, name: &str) -> FacadeResult<Option<String>> {
        let body = format!(
            "return el.getAttribute({});",
            serde_json::to_string(name).unwrap_or_default()
        );
        let value = self.eval_el(&body).await?;
        Ok(value.as_str().map(String::from))
    }

    async fn is_visible(&self) -> FacadeResult<bool> {
        let page = self.page()?;
        let js = js::with_element(
            &self.selector,
            "const s = getComputedStyle(el); \
             const r = el.getBoundingClientRect(); \
             return s.display !== 'none' && s.visibility !== 'hidden' \
               && r.width > 0 && r.height > 0;",
        );
        let value = page.eval(&js).await?;
        // A missing element is simply not visible.
        if value.get("__missing").is_some() {
            return Ok(false);
        }
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self) -> FacadeResult<bool> {
        let value = self.eval_el("return !el.disabled;").await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_checked(&self) -> FacadeResult<bool> {
        let value = self
            .eval_el(
                "return !!(el.checked || el.getAttribute('aria-checked') === 'true');",
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn count(&self) -> FacadeResult<usize> {
        let page = self.page()?;
        let js = js::with_elements(&self.selector, "return els.length;");
        let value = page.eval(&js).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn bounding_box(&self) -> FacadeResult<Option<BoundingBox>> {
        let value = self
            .eval_el(
                "const r = el.getBoundingClientRect(); \
                 return { x: r.x, y: r.y, width: r.width, height: r.height };",
            )
            .await?;
        Ok(serde_json::from_value(value).ok())
    }

    async fn screenshot(&self) -> FacadeResult<Vec<u8>> {
        self.scroll_into_view().await?;
        let bounds = self.bounding_box().await?.ok_or_else(|| {
            FacadeError::NotFound(js::describe(&self.selector))
        })?;
        self.page()?
            .screenshot_with(&ScreenshotOptions {
                full_page: false,
                clip: Some(bounds),
            })
            .await
    }

    async fn evaluate(&self, js_body: &str) -> FacadeResult<Value> {
        self.eval_el(js_body).await
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }
}
