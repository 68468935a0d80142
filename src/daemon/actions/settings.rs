use serde_json::json;

use super::{context, page};
use crate::daemon::devices;
use crate::daemon::dispatch::{ActionResult, DaemonError};
use crate::daemon::state::DaemonState;
use crate::facade::{BrowserContext as _, HttpCredentials, Page as _, Viewport};
use crate::protocol::Request;

pub async fn set_viewport(state: &mut DaemonState, req: &Request) -> ActionResult {
    let width = req
        .i64_param("width")
        .filter(|w| *w > 0)
        .ok_or_else(|| DaemonError::bad("Missing required parameter 'width'"))? as u32;
    let height = req
        .i64_param("height")
        .filter(|h| *h > 0)
        .ok_or_else(|| DaemonError::bad("Missing required parameter 'height'"))? as u32;
    let viewport = Viewport { width, height };
    page(state)?.set_viewport(viewport).await?;
    state.ctx_opts.viewport = Some(viewport);
    Ok(json!({ "viewport": { "width": width, "height": height } }))
}

/// Device emulation needs a context rebuild: viewport, touch, and UA are
/// context-creation options.
pub async fn set_device(state: &mut DaemonState, req: &Request) -> ActionResult {
    let name = req.required_str("device").map_err(DaemonError::bad)?;
    let preset = devices::find(name).ok_or_else(|| {
        DaemonError::bad(format!(
            "unknown device '{}'. Available: {}",
            name,
            devices::names().join(", ")
        ))
    })?;

    let mut opts = state.ctx_opts.clone();
    opts.viewport = Some(Viewport {
        width: preset.width,
        height: preset.height,
    });
    opts.device_scale_factor = Some(preset.device_scale_factor);
    opts.is_mobile = preset.is_mobile;
    opts.has_touch = preset.has_touch;
    opts.user_agent = Some(preset.user_agent.to_string());

    let restored = state.recreate_context(opts).await?;
    Ok(json!({ "device": preset.name, "restored": restored }))
}

pub async fn set_geo(state: &mut DaemonState, req: &Request) -> ActionResult {
    let latitude = req
        .f64_param("latitude")
        .ok_or_else(|| DaemonError::bad("Missing required parameter 'latitude'"))?;
    let longitude = req
        .f64_param("longitude")
        .ok_or_else(|| DaemonError::bad("Missing required parameter 'longitude'"))?;
    context(state)?.set_geolocation(latitude, longitude).await?;
    Ok(json!({ "geolocation": { "latitude": latitude, "longitude": longitude } }))
}

pub async fn set_offline(state: &mut DaemonState, req: &Request) -> ActionResult {
    let offline = req
        .params
        .get("offline")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    context(state)?.set_offline(offline).await?;
    Ok(json!({ "offline": offline }))
}

pub async fn set_headers(state: &mut DaemonState, req: &Request) -> ActionResult {
    let headers: std::collections::HashMap<String, String> = match req.params.get("headers") {
        Some(serde_json::Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        Some(serde_json::Value::String(raw)) => serde_json::from_str(raw)
            .map_err(|e| DaemonError::bad(format!("invalid headers JSON: {}", e)))?,
        _ => return Err(DaemonError::bad("Missing required parameter 'headers'")),
    };
    context(state)?.set_extra_headers(headers.clone()).await?;
    state.ctx_opts.extra_headers = headers.clone();
    Ok(json!({ "headers": headers.len() }))
}

pub async fn set_media(state: &mut DaemonState, req: &Request) -> ActionResult {
    let color_scheme = req.str_param("colorScheme");
    let reduced_motion = if req.bool_param("reducedMotion") {
        Some("reduce")
    } else {
        None
    };
    page(state)?
        .emulate_media(color_scheme, reduced_motion)
        .await?;
    Ok(json!({
        "media": {
            "colorScheme": color_scheme,
            "reducedMotion": reduced_motion.is_some(),
        }
    }))
}

/// HTTP credentials are a context-creation option, so this also rebuilds.
pub async fn set_credentials(state: &mut DaemonState, req: &Request) -> ActionResult {
    let username = req.required_str("username").map_err(DaemonError::bad)?;
    let password = req.required_str("password").map_err(DaemonError::bad)?;
    let mut opts = state.ctx_opts.clone();
    opts.http_credentials = Some(HttpCredentials {
        username: username.to_string(),
        password: password.to_string(),
    });
    let restored = state.recreate_context(opts).await?;
    Ok(json!({ "credentials": true, "restored": restored }))
}
