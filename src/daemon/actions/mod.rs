//! Handler families for the dispatch table.

pub mod capture;
pub mod dialogs;
pub mod find;
pub mod frames;
pub mod getters;
pub mod interact;
pub mod logs;
pub mod nav;
pub mod network;
pub mod sessions;
pub mod settings;
pub mod snap;
pub mod state_files;
pub mod tabs;
pub mod waits;

use std::sync::Arc;

use crate::daemon::dispatch::DaemonError;
use crate::daemon::state::DaemonState;
use crate::facade::{BrowserContext, Page};

/// The active page; the dispatch frame has already verified it exists for
/// page-classified actions, this is the fallible accessor handlers use.
pub(crate) fn page(state: &DaemonState) -> Result<Arc<dyn Page>, DaemonError> {
    state.page().ok_or(DaemonError::NoPage)
}

pub(crate) fn context(state: &DaemonState) -> Result<Arc<dyn BrowserContext>, DaemonError> {
    state
        .context
        .as_ref()
        .map(Arc::clone)
        .ok_or_else(|| DaemonError::bad("browser not started"))
}
