//! Storage-state file management. States live next to the session sockets
//! as `spel-session-<name>.json`; a bare name addresses that directory and
//! anything with a path separator is used as-is.

use std::path::PathBuf;

use serde_json::json;

use crate::facade::BrowserContext as _;
use super::context;
use crate::daemon::dispatch::{ActionResult, DaemonError};
use crate::daemon::state::DaemonState;
use crate::session;

fn resolve_state_path(name_or_path: &str) -> PathBuf {
    if name_or_path.contains('/') || name_or_path.ends_with(".json") {
        PathBuf::from(name_or_path)
    } else {
        session::storage_state_path(name_or_path)
    }
}

fn state_name(req: &crate::protocol::Request, state: &DaemonState) -> String {
    req.str_param("name")
        .or_else(|| req.str_param("path"))
        .map(String::from)
        .or_else(|| state.flag("session_name").map(String::from))
        .unwrap_or_else(|| state.session.clone())
}

pub async fn save(state: &mut DaemonState, req: &crate::protocol::Request) -> ActionResult {
    let name = state_name(req, state);
    let path = resolve_state_path(&name);
    context(state)?.save_storage_state(&path).await?;
    Ok(json!({ "path": path.display().to_string() }))
}

/// Load replaces the context, so the usual recreation discipline applies;
/// re-navigation to the prior URL is best-effort and reported.
pub async fn load(state: &mut DaemonState, req: &crate::protocol::Request) -> ActionResult {
    let name = state_name(req, state);
    let path = resolve_state_path(&name);
    if !path.exists() {
        return Err(DaemonError::bad(format!(
            "no such state '{}' (looked at {})",
            name,
            path.display()
        )));
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| DaemonError::bad(e.to_string()))?;
    if let Err(e) = serde_json::from_str::<serde_json::Value>(&raw) {
        return Err(DaemonError::bad(format!("state file is corrupt: {}", e)));
    }

    let mut opts = state.ctx_opts.clone();
    opts.storage_state_path = Some(path.clone());
    let restored = state.recreate_context(opts).await?;
    Ok(json!({ "path": path.display().to_string(), "restored": restored }))
}

pub async fn list(_state: &mut DaemonState) -> ActionResult {
    let dir = session::socket_dir();
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(&dir) {
        for entry in entries.flatten() {
            let filename = entry.file_name().to_string_lossy().to_string();
            if !filename.starts_with("spel-session-") || !filename.ends_with(".json") {
                continue;
            }
            let meta = entry.metadata().ok();
            let modified = meta
                .as_ref()
                .and_then(|m| m.modified().ok())
                .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339())
                .unwrap_or_default();
            files.push(json!({
                "filename": filename,
                "size": meta.map(|m| m.len()).unwrap_or(0),
                "modified": modified,
            }));
        }
    }
    Ok(json!({ "files": files, "directory": dir.display().to_string() }))
}

pub async fn show(_state: &mut DaemonState, req: &crate::protocol::Request) -> ActionResult {
    let name = req
        .str_param("name")
        .ok_or_else(|| DaemonError::bad("Missing required parameter 'name'"))?;
    let path = resolve_state_path(name);
    if !path.exists() {
        return Err(DaemonError::bad(format!("no such state '{}'", name)));
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| DaemonError::bad(e.to_string()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| DaemonError::bad(format!("state file is corrupt: {}", e)))?;
    let cookies = value
        .get("cookies")
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0);
    let origins = value
        .get("origins")
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0);
    Ok(json!({ "summary": { "cookies": cookies, "origins": origins } }))
}

pub async fn rename(_state: &mut DaemonState, req: &crate::protocol::Request) -> ActionResult {
    let old_name = req.required_str("oldName").map_err(DaemonError::bad)?;
    let new_name = req.required_str("newName").map_err(DaemonError::bad)?;
    let old_path = resolve_state_path(old_name);
    if !old_path.exists() {
        return Err(DaemonError::bad(format!("no such state '{}'", old_name)));
    }
    let new_path = resolve_state_path(new_name);
    std::fs::rename(&old_path, &new_path).map_err(|e| DaemonError::bad(e.to_string()))?;
    Ok(json!({ "renamed": true, "oldName": old_name, "newName": new_name }))
}

pub async fn clear(_state: &mut DaemonState, req: &crate::protocol::Request) -> ActionResult {
    let mut cleared = 0;
    match req.str_param("name") {
        Some(name) => {
            let path = resolve_state_path(name);
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| DaemonError::bad(e.to_string()))?;
                cleared = 1;
            }
        }
        None => {
            if let Ok(entries) = std::fs::read_dir(session::socket_dir()) {
                for entry in entries.flatten() {
                    let filename = entry.file_name().to_string_lossy().to_string();
                    if filename.starts_with("spel-session-") && filename.ends_with(".json") {
                        if std::fs::remove_file(entry.path()).is_ok() {
                            cleared += 1;
                        }
                    }
                }
            }
        }
    }
    Ok(json!({ "cleared": cleared }))
}

/// Delete saved states older than `days` (default 7).
pub async fn clean(_state: &mut DaemonState, req: &crate::protocol::Request) -> ActionResult {
    let days = req.i64_param("days").filter(|d| *d > 0).unwrap_or(7) as u64;
    let cutoff = std::time::SystemTime::now()
        .checked_sub(std::time::Duration::from_secs(days * 24 * 60 * 60));
    let mut cleaned = 0;
    if let (Some(cutoff), Ok(entries)) = (cutoff, std::fs::read_dir(session::socket_dir())) {
        for entry in entries.flatten() {
            let filename = entry.file_name().to_string_lossy().to_string();
            if !filename.starts_with("spel-session-") || !filename.ends_with(".json") {
                continue;
            }
            let old = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(|t| t < cutoff)
                .unwrap_or(false);
            if old && std::fs::remove_file(entry.path()).is_ok() {
                cleaned += 1;
            }
        }
    }
    Ok(json!({ "cleaned": cleaned }))
}
