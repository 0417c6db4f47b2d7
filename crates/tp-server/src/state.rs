//! Application state.
//!
//! Shared state for all request handlers.

use std::sync::Arc;

use tp_tree::TreeAdminService;

use crate::ServerConfig;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Page tree administration and cached snapshot.
    pub(crate) service: Arc<TreeAdminService>,
    /// Server settings.
    pub(crate) config: ServerConfig,
}
