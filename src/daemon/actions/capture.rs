use base64::Engine as _;
use serde_json::{json, Value};

use super::page;
use crate::daemon::dispatch::{resolve_selector, ActionResult, DaemonError};
use crate::daemon::state::DaemonState;
use crate::facade::{Locator as _, Page as _, ScreenshotOptions};
use crate::protocol::Request;

fn default_capture_path(kind: &str, ext: &str) -> std::path::PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    std::env::temp_dir().join(format!("spel-{}-{}.{}", kind, stamp, ext))
}

pub async fn screenshot(state: &mut DaemonState, req: &Request) -> ActionResult {
    let bytes = match req.str_param("selector") {
        Some(raw) => {
            let selector = resolve_selector(state, raw)?;
            page(state)?.locator(selector).screenshot().await?
        }
        None => {
            let opts = ScreenshotOptions {
                full_page: req.bool_param("fullPage"),
                clip: None,
            };
            page(state)?.screenshot(&opts).await?
        }
    };

    let path = req
        .str_param("path")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| default_capture_path("screenshot", "png"));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DaemonError::bad(e.to_string()))?;
    }
    std::fs::write(&path, &bytes).map_err(|e| DaemonError::bad(e.to_string()))?;

    let mut data = json!({ "path": path.display().to_string(), "size": bytes.len() });
    if let Ok(img) = image::load_from_memory(&bytes) {
        use image::GenericImageView;
        let (width, height) = img.dimensions();
        data["width"] = json!(width);
        data["height"] = json!(height);
    }
    Ok(data)
}

pub async fn pdf(state: &mut DaemonState, req: &Request) -> ActionResult {
    let bytes = page(state)?.pdf().await?;
    let path = req
        .str_param("path")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| default_capture_path("page", "pdf"));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DaemonError::bad(e.to_string()))?;
    }
    std::fs::write(&path, &bytes).map_err(|e| DaemonError::bad(e.to_string()))?;
    Ok(json!({ "path": path.display().to_string(), "size": bytes.len() }))
}

/// User scripts come in as expressions or statement blocks; wrap so both
/// evaluate, awaiting promises either way.
fn wrap_user_script(script: &str) -> String {
    let trimmed = script.trim();
    if trimmed.contains("return") {
        format!("(async () => {{ {} }})()", trimmed)
    } else {
        format!("(async () => {{ return ({}); }})()", trimmed)
    }
}

pub async fn evaluate(state: &mut DaemonState, req: &Request) -> ActionResult {
    let script = req.required_str("script").map_err(DaemonError::bad)?;
    let result = page(state)?.evaluate(&wrap_user_script(script)).await?;
    if req.bool_param("encode") {
        let text = match &result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(text);
        return Ok(json!({ "result_b64": encoded }));
    }
    Ok(json!({ "result": result }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_expression() {
        assert_eq!(
            wrap_user_script("document.title"),
            "(async () => { return (document.title); })()"
        );
    }

    #[test]
    fn test_wrap_statements_with_return() {
        let wrapped = wrap_user_script("const x = 1; return x + 1;");
        assert!(wrapped.starts_with("(async () => {"));
        assert!(wrapped.contains("return x + 1;"));
        assert!(!wrapped.contains("return ("));
    }
}
