use serde_json::json;

use crate::daemon::dispatch::ActionResult;
use crate::daemon::state::DaemonState;
use crate::facade::{DialogAction, Page as _};
use crate::protocol::Request;

async fn install(state: &mut DaemonState, action: DialogAction) -> ActionResult {
    let label = if action.accept { "accept" } else { "dismiss" };
    // Installing replaces whatever handler was there before.
    state.dialog = Some(action.clone());
    if let Some(page) = state.page() {
        page.set_dialog_action(Some(action)).await?;
    }
    Ok(json!({ "dialog": label }))
}

pub async fn accept(state: &mut DaemonState, req: &Request) -> ActionResult {
    install(
        state,
        DialogAction {
            accept: true,
            prompt_text: req.str_param("promptText").map(String::from),
        },
    )
    .await
}

pub async fn dismiss(state: &mut DaemonState) -> ActionResult {
    install(
        state,
        DialogAction {
            accept: false,
            prompt_text: None,
        },
    )
    .await
}
