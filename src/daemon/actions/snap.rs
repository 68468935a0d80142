use serde_json::json;

use super::page;
use crate::daemon::dispatch::{resolve_selector, ActionResult, DaemonError};
use crate::daemon::snapshot::{
    self, render_lines, SnapshotFilters, SnapshotLine, WalkerResult,
};
use crate::daemon::state::DaemonState;
use crate::facade::{Page as _, Selector};
use crate::protocol::Request;

/// Run the walker in the main frame and every child frame, replace the ref
/// table, render, filter. Child-frame refs carry an `f<k>_` prefix.
pub async fn capture(
    state: &mut DaemonState,
    scope: Option<&str>,
    filters: &SnapshotFilters,
) -> Result<(String, usize), DaemonError> {
    let page = page(state)?;

    let raw = page
        .evaluate(&snapshot::walker_expr(scope, "e"))
        .await?;
    let result: WalkerResult = serde_json::from_value(raw)
        .map_err(|e| DaemonError::bad(format!("snapshot capture failed: {}", e)))?;

    let mut lines: Vec<SnapshotLine> = Vec::new();
    if let Some(tree) = &result.tree {
        render_lines(tree, 0, &mut lines);
    }
    state.refs.replace(result.refs, result.counter);

    if scope.is_none() {
        if let Ok(frames) = page.frames().await {
            for frame in frames {
                let prefix = format!("f{}_e", frame.ordinal + 1);
                let Ok(raw) = page
                    .evaluate_in_frame(frame.ordinal, &snapshot::walker_expr(None, &prefix))
                    .await
                else {
                    continue;
                };
                let sub: WalkerResult = match serde_json::from_value(raw) {
                    Ok(sub) => sub,
                    Err(_) => continue,
                };
                let Some(tree) = &sub.tree else { continue };
                let label = if frame.name.is_empty() {
                    frame.url.clone()
                } else {
                    frame.name.clone()
                };
                lines.push(SnapshotLine {
                    text: format!("- iframe \"{}\"", label),
                    depth: 0,
                    interactive: false,
                    cursor: false,
                    has_ref: false,
                    generic: false,
                });
                let mut sub_lines = Vec::new();
                render_lines(tree, 1, &mut sub_lines);
                lines.extend(sub_lines);
                state.refs.merge(sub.refs);
            }
        }
    }

    let kept = snapshot::apply_filters(&lines, filters);
    Ok((snapshot::lines_to_string(&kept), state.refs.len()))
}

fn filters_from(req: &Request) -> SnapshotFilters {
    SnapshotFilters {
        interactive: req.bool_param("interactive"),
        cursor: req.bool_param("cursor"),
        compact: req.bool_param("compact"),
        max_depth: req.i64_param("maxDepth").map(|d| d.max(0) as usize),
    }
}

pub async fn snapshot(state: &mut DaemonState, req: &Request) -> ActionResult {
    let filters = filters_from(req);
    let scope = match req.str_param("selector") {
        Some(raw) => match resolve_selector(state, raw)? {
            Selector::Css(css) => Some(css),
            other => Some(other.describe()),
        },
        None => None,
    };
    let (tree, ref_count) = capture(state, scope.as_deref(), &filters).await?;
    Ok(json!({ "snapshot": tree, "refs": ref_count }))
}

pub async fn annotate(state: &mut DaemonState, req: &Request) -> ActionResult {
    if state.refs.is_empty() {
        // Overlays are keyed off ref attributes; capture them first.
        capture(state, None, &SnapshotFilters::default()).await?;
    }
    let boxes = !req.params.contains_key("boxes") || req.bool_param("boxes");
    let dims = req.bool_param("dimensions");
    let page = page(state)?;
    let count = page
        .evaluate(&snapshot::annotate_expr(boxes, dims))
        .await?
        .as_u64()
        .unwrap_or(0);
    Ok(json!({ "annotated": count }))
}

pub async fn unannotate(state: &mut DaemonState) -> ActionResult {
    let page = page(state)?;
    let count = page
        .evaluate(&snapshot::unannotate_expr())
        .await?
        .as_u64()
        .unwrap_or(0);
    Ok(json!({ "removed": count }))
}

pub async fn clear_refs(state: &mut DaemonState) -> ActionResult {
    let page = page(state)?;
    let count = page
        .evaluate(&snapshot::clear_refs_expr())
        .await?
        .as_u64()
        .unwrap_or(0);
    state.refs.clear();
    Ok(json!({ "cleared": count }))
}
