//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::security;
use crate::state::AppState;

/// Create the application router.
///
/// Unmatched paths fall through to public page resolution.
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route(
            "/admin/pages/",
            get(handlers::admin::change_list).post(handlers::admin::create_page),
        )
        .route("/admin/pages/move/", post(handlers::admin::move_node))
        .route(
            "/admin/pages/{id}",
            get(handlers::admin::get_page)
                .put(handlers::admin::update_page)
                .delete(handlers::admin::delete_page),
        )
        .route("/admin/pages/{id}/move/", get(handlers::admin::move_direction));

    let api_routes = Router::new()
        .route("/api/navigation", get(handlers::navigation::get_navigation))
        .route("/api/navigation/html", get(handlers::navigation::get_navigation_html))
        .route("/sitemap.xml", get(handlers::sitemap::get_sitemap));

    let routes = Router::new()
        .merge(admin_routes)
        .merge(api_routes)
        .fallback(handlers::pages::get_page);

    security::apply(routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
