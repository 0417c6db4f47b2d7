//! Navigation API endpoints.
//!
//! Returns the site navigation as a JSON tree or as a rendered HTML
//! fragment. Both use the configured status threshold and manual links.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::Html;
use serde::Serialize;
use tp_tree::NavItem;
use tp_tree::navigation::default_template;

use crate::error::ServerError;
use crate::state::AppState;

/// Response for GET /api/navigation.
#[derive(Serialize)]
pub(crate) struct NavigationResponse {
    /// Navigation tree items.
    items: Vec<NavItem>,
}

/// Handle GET /api/navigation.
pub(crate) async fn get_navigation(
    State(state): State<Arc<AppState>>,
) -> Result<Json<NavigationResponse>, ServerError> {
    let items = state
        .service
        .navigation(state.config.navigation_min_status, &state.config.manual_navigation)
        .await?;
    Ok(Json(NavigationResponse { items }))
}

/// Handle GET /api/navigation/html.
pub(crate) async fn get_navigation_html(State(state): State<Arc<AppState>>) -> Result<Html<String>, ServerError> {
    let html = state
        .service
        .render_navigation(
            state.config.navigation_min_status,
            &state.config.manual_navigation,
            default_template,
        )
        .await?;
    Ok(Html(html))
}
