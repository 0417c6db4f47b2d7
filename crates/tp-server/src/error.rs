//! Error types for the HTTP server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tp_tree::TreeError;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// No published page at the given path.
    #[error("Page not found: {0}")]
    PageNotFound(String),

    /// Request could not be interpreted.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Error from the page tree.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            Self::PageNotFound(_) | Self::Tree(TreeError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Tree(TreeError::InvalidMove { .. }) => StatusCode::BAD_REQUEST,
            Self::Tree(TreeError::HasChildren(_)) => StatusCode::CONFLICT,
            Self::Tree(TreeError::Corrupt(_) | TreeError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::PageNotFound(path) => json!({"error": "Page not found", "path": path}),
            Self::Tree(e) if status.is_server_error() => {
                tracing::error!(error = %e, "Request failed");
                json!({"error": "Internal server error"})
            }
            other => json!({"error": other.to_string()}),
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use tp_store::StoreError;

    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServerError::PageNotFound("/x/".to_owned()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ServerError::from(TreeError::NotFound(3)).status(), StatusCode::NOT_FOUND);
        assert_eq!(ServerError::from(TreeError::HasChildren(3)).status(), StatusCode::CONFLICT);
        assert_eq!(
            ServerError::from(TreeError::InvalidMove {
                node: 1,
                target: 2,
                reason: "target is a descendant of the node",
            })
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::from(TreeError::Storage(StoreError::new(tp_store::StoreErrorKind::Unavailable))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_into_response_status() {
        let response = ServerError::BadRequest("unknown policy".to_owned()).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
