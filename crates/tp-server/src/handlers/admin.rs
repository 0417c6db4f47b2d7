//! Admin endpoints for the page tree editor.
//!
//! The change list carries everything the tree widget needs (rows in tree
//! order plus the materialized structure). Moves come in two shapes: arrow
//! links that redirect back, and drag-and-drop posts answered with `OK` or
//! `FAIL`.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tp_config::TreeInitialState;
use tp_store::{NodeId, PageNode, PageStatus};
use tp_tree::{DeleteOutcome, DeletePolicy, Direction, MovePosition, PageForm, TreeError, TreeIndex, TreeStructure};

use crate::error::ServerError;
use crate::state::AppState;

/// Change list location, also the redirect fallback.
const CHANGE_LIST: &str = "/admin/pages/";

/// Query for GET /admin/pages/.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChangeListQuery {
    /// Case-insensitive search over title, parent title and body.
    q: Option<String>,
    /// Exact status filter.
    status: Option<String>,
}

/// One change list row.
#[derive(Debug, Serialize)]
struct ChangeRow {
    id: NodeId,
    title: String,
    parent_id: Option<NodeId>,
    depth: i64,
    url: String,
    status: PageStatus,
    status_label: &'static str,
    template: String,
    comments_enabled: bool,
    login_required: bool,
    created_at: DateTime<Utc>,
    /// Arrow action base; append `?direction=up|down|left|right`.
    move_url: String,
}

impl From<&PageNode> for ChangeRow {
    fn from(node: &PageNode) -> Self {
        Self {
            id: node.id,
            title: node.title.clone(),
            parent_id: node.parent_id,
            depth: node.depth,
            url: node.url().to_owned(),
            status: node.status,
            status_label: node.status.label(),
            template: node.template.clone(),
            comments_enabled: node.comments_enabled,
            login_required: node.login_required,
            created_at: node.created_at,
            move_url: format!("{CHANGE_LIST}{}/move/", node.id),
        }
    }
}

/// Response for GET /admin/pages/.
#[derive(Debug, Serialize)]
pub(crate) struct ChangeListResponse {
    rows: Vec<ChangeRow>,
    tree_structure: TreeStructure,
    media_path: String,
    tree_initial_state: TreeInitialState,
    templates: Vec<String>,
}

fn matches(index: &TreeIndex, node: &PageNode, query: &ChangeListQuery, status: Option<PageStatus>) -> bool {
    if status.is_some_and(|s| node.status != s) {
        return false;
    }
    let Some(needle) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
        return true;
    };
    let needle = needle.to_lowercase();
    let parent_title = index.parent(node.id).map(|p| p.title.as_str()).unwrap_or_default();
    [node.title.as_str(), parent_title, node.body.as_str()]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// Handle GET /admin/pages/.
pub(crate) async fn change_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChangeListQuery>,
) -> Result<Json<ChangeListResponse>, ServerError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(PageStatus::from_str)
        .transpose()
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;

    let index = state.service.snapshot().await?;
    let rows = index
        .iter()
        .filter(|node| matches(&index, node, &query, status))
        .map(ChangeRow::from)
        .collect();

    Ok(Json(ChangeListResponse {
        rows,
        tree_structure: index.structure(),
        media_path: state.config.media_path.clone(),
        tree_initial_state: state.config.tree_initial_state,
        templates: state.config.allowed_templates.clone(),
    }))
}

/// Handle POST /admin/pages/.
pub(crate) async fn create_page(
    State(state): State<Arc<AppState>>,
    Json(form): Json<PageForm>,
) -> Result<(StatusCode, Json<PageNode>), ServerError> {
    let node = state.service.create(form).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// Handle GET /admin/pages/{id}.
pub(crate) async fn get_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<NodeId>,
) -> Result<Json<PageNode>, ServerError> {
    Ok(Json(state.service.get(id).await?))
}

/// Handle PUT /admin/pages/{id}.
pub(crate) async fn update_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<NodeId>,
    Json(form): Json<PageForm>,
) -> Result<Json<PageNode>, ServerError> {
    Ok(Json(state.service.update(id, form).await?))
}

/// Query for DELETE /admin/pages/{id}.
#[derive(Debug, Deserialize)]
pub(crate) struct DeleteQuery {
    policy: Option<String>,
}

/// Handle DELETE /admin/pages/{id}.
pub(crate) async fn delete_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<NodeId>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteOutcome>, ServerError> {
    let policy = match query.policy.as_deref() {
        None | Some("") => DeletePolicy::default(),
        Some(policy) => policy
            .parse()
            .map_err(|e: tp_tree::ParsePolicyError| ServerError::BadRequest(e.to_string()))?,
    };
    Ok(Json(state.service.delete(id, policy).await?))
}

/// Query for GET /admin/pages/{id}/move/.
#[derive(Debug, Deserialize)]
pub(crate) struct DirectionQuery {
    direction: Option<String>,
}

/// Handle GET /admin/pages/{id}/move/?direction=.
///
/// Unknown or missing directions are ignored. Always redirects back to the
/// referring page, or to the change list.
pub(crate) async fn move_direction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<NodeId>,
    Query(query): Query<DirectionQuery>,
    headers: HeaderMap,
) -> Result<Redirect, ServerError> {
    state.service.get(id).await?;

    if let Some(direction) = query.direction.as_deref().and_then(|d| Direction::from_str(d).ok()) {
        let outcome = state.service.move_direction(id, direction).await?;
        tracing::debug!(id, ?direction, ?outcome, "Arrow move");
    }

    let back = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(CHANGE_LIST);
    Ok(Redirect::to(back))
}

/// Form for POST /admin/pages/move/.
#[derive(Debug, Deserialize)]
pub(crate) struct MoveForm {
    cut_item: String,
    pasted_on: String,
    position: String,
}

impl MoveForm {
    /// Parsed request, or `None` for anything the tree widget cannot send.
    fn parse(&self) -> Option<(NodeId, NodeId, MovePosition)> {
        let position = match self.position.as_str() {
            "last-child" => MovePosition::LastChildOf,
            "left" => MovePosition::LeftOf,
            _ => return None,
        };
        Some((self.cut_item.trim().parse().ok()?, self.pasted_on.trim().parse().ok()?, position))
    }
}

/// Handle POST /admin/pages/move/.
///
/// Answers `OK` or `FAIL` as plain text. Only storage failures are errors.
pub(crate) async fn move_node(State(state): State<Arc<AppState>>, Form(form): Form<MoveForm>) -> Response {
    let Some((id, target, position)) = form.parse() else {
        tracing::debug!(?form, "Rejected move request");
        return "FAIL".into_response();
    };
    match state.service.move_node(id, target, position).await {
        Ok(_) => "OK".into_response(),
        Err(e @ (TreeError::InvalidMove { .. } | TreeError::NotFound(_))) => {
            tracing::debug!(error = %e, "Refused move");
            "FAIL".into_response()
        }
        Err(e) => ServerError::from(e).into_response(),
    }
}
