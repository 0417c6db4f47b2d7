//! Public page resolution.
//!
//! Every path no other route claims is looked up by its effective URL.
//! Responses are JSON with metadata, breadcrumbs, and the stored body.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use md5::{Digest, Md5};
use serde::Serialize;
use tp_store::{NodeId, PageNode, PageStatus};
use tp_tree::{Breadcrumb, Resolution};

use crate::error::ServerError;
use crate::state::AppState;

/// Response for a resolved page.
#[derive(Serialize)]
struct PageResponse {
    /// Page metadata.
    meta: PageMeta,
    /// Ancestors from the root down.
    breadcrumbs: Vec<Breadcrumb>,
    /// Stored HTML body.
    content: String,
}

/// Page metadata.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageMeta {
    id: NodeId,
    title: String,
    /// Effective URL.
    path: String,
    /// Template to render with, after the allow-list check.
    template: String,
    status: PageStatus,
    comments_enabled: bool,
    login_required: bool,
    /// Last modification time (ISO 8601).
    last_modified: String,
}

impl PageMeta {
    fn new(node: &PageNode, template: &str) -> Self {
        Self {
            id: node.id,
            title: node.title.clone(),
            path: node.url().to_owned(),
            template: template.to_owned(),
            status: node.status,
            comments_enabled: node.comments_enabled,
            login_required: node.login_required,
            last_modified: node.updated_at.to_rfc3339(),
        }
    }
}

/// Handle any unrouted path.
pub(crate) async fn get_page(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, ServerError> {
    if method != Method::GET && method != Method::HEAD {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }

    let path = uri.path();
    let page = match state.service.resolve_path(path).await? {
        Resolution::Found(page) => page,
        Resolution::Redirect(slashed) => {
            let location = match uri.query() {
                Some(query) => format!("{slashed}?{query}"),
                None => slashed,
            };
            return Ok(redirect(StatusCode::MOVED_PERMANENTLY, location));
        }
        Resolution::NotFound => return Err(ServerError::PageNotFound(path.to_owned())),
    };

    if page.node.login_required && !is_authenticated(&headers, &state.config.user_header) {
        let next = serde_urlencoded::to_string([("next", path)]).unwrap_or_default();
        return Ok(redirect(StatusCode::FOUND, format!("{}?{next}", state.config.login_url)));
    }

    let etag = compute_etag(&state.config.version, &page.node);
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && if_none_match.as_bytes() == etag.as_bytes()
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let last_modified = page.node.updated_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let template = state.config.template_for(&page.node.template);
    let response = PageResponse {
        meta: PageMeta::new(&page.node, template),
        breadcrumbs: page.breadcrumbs,
        content: page.node.body,
    };

    Ok((
        [
            (header::ETAG, etag),
            (header::LAST_MODIFIED, last_modified),
            (header::CACHE_CONTROL, "private, max-age=60".to_owned()),
        ],
        Json(response),
    )
        .into_response())
}

fn redirect(status: StatusCode, location: String) -> Response {
    (status, [(header::LOCATION, location)]).into_response()
}

/// Whether the upstream proxy passed a non-empty user.
fn is_authenticated(headers: &HeaderMap, user_header: &str) -> bool {
    headers
        .get(user_header)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|user| !user.trim().is_empty())
}

/// Compute `ETag` from version and page state.
///
/// MD5 truncated to 64 bits (16 hex chars).
fn compute_etag(version: &str, node: &PageNode) -> String {
    let stamp = node.updated_at.timestamp_micros();
    let hash = Md5::digest(format!("{version}:{}:{stamp}:{}", node.id, node.body).as_bytes());
    format!("\"{}\"", &hex::encode(hash)[..16])
}
