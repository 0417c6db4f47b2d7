//! HTTP server for TreePages.
//!
//! This crate provides a native Rust HTTP server using axum, serving:
//! - The admin change list and tree editor endpoints under `/admin/pages/`
//! - Public pages resolved from their slug (fallback route)
//! - `sitemap.xml` and navigation endpoints
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tp_server::{ServerConfig, run_server};
//! use tp_store::MemoryStore;
//! use tp_tree::TreeAdminService;
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = Arc::new(TreeAdminService::new(Arc::new(MemoryStore::new())));
//!     run_server(ServerConfig::default(), service).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum server (tp-server)
//!                        │
//!                        ├─► /admin/pages/...  ──► TreeAdminService writes
//!                        │                              │
//!                        │                              └─► NodeStore (SQLite)
//!                        │
//!                        └─► pages, sitemap, navigation ──► cached TreeIndex
//! ```

mod app;
mod error;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use state::AppState;
use tp_config::{NavLinkConfig, TreeInitialState};
use tp_store::PageStatus;
use tp_tree::{ManualEntry, TreeAdminService};

pub use error::ServerError;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Public base URL without a trailing slash.
    pub base_url: String,
    /// URL prefix of the tree editor assets.
    pub media_path: String,
    /// Initial state of the admin tree widget.
    pub tree_initial_state: TreeInitialState,
    /// Templates a page may select.
    pub allowed_templates: Vec<String>,
    /// Fallback template.
    pub default_template: String,
    /// Lowest status shown in navigation.
    pub navigation_min_status: PageStatus,
    /// Links placed before the page tree in navigation.
    pub manual_navigation: Vec<ManualEntry>,
    /// Login page for protected pages.
    pub login_url: String,
    /// Request header that carries the authenticated user.
    pub user_header: String,
    /// Application version (part of `ETag`s).
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7979,
            base_url: "http://127.0.0.1:7979".to_owned(),
            media_path: "/static/treepages/".to_owned(),
            tree_initial_state: TreeInitialState::Collapsed,
            allowed_templates: vec!["pages/default.html".to_owned()],
            default_template: "pages/default.html".to_owned(),
            navigation_min_status: PageStatus::NAVIGATION,
            manual_navigation: Vec::new(),
            login_url: "/accounts/login/".to_owned(),
            user_header: "x-remote-user".to_owned(),
            version: String::new(),
        }
    }
}

impl ServerConfig {
    /// Template to render a page that requests `requested`.
    pub(crate) fn template_for<'a>(&'a self, requested: &'a str) -> &'a str {
        if !requested.is_empty() && self.allowed_templates.iter().any(|t| t == requested) {
            requested
        } else {
            &self.default_template
        }
    }
}

/// Run the server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address is invalid or the listener fails.
pub async fn run_server(
    config: ServerConfig,
    service: Arc<TreeAdminService>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from_str(&format!("{}:{}", config.host, config.port))?;

    // Warm the snapshot so the first request does not pay for it
    let snapshot = service.snapshot().await?;
    tracing::info!(pages = snapshot.len(), "Loaded page tree");

    let state = Arc::new(AppState { service, config });
    let app = app::create_router(state);

    tracing::info!(address = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

fn manual_entry(link: &NavLinkConfig) -> ManualEntry {
    ManualEntry {
        label: link.label.clone(),
        link: link.link.clone(),
        children: link.children.iter().map(manual_entry).collect(),
    }
}

/// Create server configuration from TreePages config.
#[must_use]
pub fn server_config_from_config(config: &tp_config::Config, version: String) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        base_url: config.server.public_url(),
        media_path: config.admin.media_path.clone(),
        tree_initial_state: config.admin.tree_initial_state,
        allowed_templates: config.templates.allowed.clone(),
        default_template: config.templates.default.clone(),
        navigation_min_status: config.navigation.min_status,
        manual_navigation: config.navigation.manual.iter().map(manual_entry).collect(),
        login_url: config.auth.login_url.clone(),
        user_header: config.auth.user_header.to_ascii_lowercase(),
        version,
    }
}
