use serde_json::json;

use crate::facade::Page as _;
use super::page;
use crate::daemon::dispatch::{ActionResult, DaemonError};
use crate::daemon::state::DaemonState;
use crate::protocol::Request;

pub async fn frame_switch(state: &mut DaemonState, req: &Request) -> ActionResult {
    let name = req.required_str("name").map_err(DaemonError::bad)?;
    let page = page(state)?;
    if name == "main" {
        page.switch_to_main_frame().await?;
        state.refs.clear();
        return Ok(json!({ "frame": "main" }));
    }
    let frame = page.switch_frame(name).await?;
    state.refs.clear();
    Ok(json!({ "frame": frame }))
}

pub async fn frame_list(state: &mut DaemonState) -> ActionResult {
    let frames = page(state)?.frames().await?;
    Ok(json!({ "frames": frames }))
}
