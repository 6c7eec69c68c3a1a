//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`; the body is always
//! `{ "success": false, "error": "..." }`, plus `conflicts` for stock
//! conflicts.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bazaar_core::cart::{CartError, StockConflict};
use bazaar_core::{QueryError, SlugError};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::models::ValidationError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// List query parameters were rejected.
    #[error("{0}")]
    Query(#[from] QueryError),

    /// Request payload broke a field rule.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Cart mutation was rejected.
    #[error("{0}")]
    Cart(#[from] CartError),

    /// An add-to-cart batch hit one or more stock conflicts.
    #[error("{} item(s) could not be added", .0.len())]
    StockConflicts(Vec<StockConflict>),

    /// No free slug could be found.
    #[error("Slug error: {0}")]
    Slug(#[from] SlugError),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Bad request from client.
    #[error("{0}")]
    BadRequest(String),

    /// The request conflicts with current state.
    #[error("{0}")]
    Conflict(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(RepositoryError::Database(e))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflicts: Option<&'a [StockConflict]>,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(RepositoryError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(RepositoryError::Conflict(_))
            | Self::StockConflicts(_)
            | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Slug(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Query(_) | Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Cart(err) => match err {
                CartError::EmptyBatch | CartError::InvalidQuantity { .. } => {
                    StatusCode::BAD_REQUEST
                }
                CartError::ProductNotFound(_) | CartError::LineNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                CartError::Stock(_) => StatusCode::CONFLICT,
            },
        }
    }
}

impl AppError {
    /// Message safe to show clients. Internal details are not exposed.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(RepositoryError::NotFound) => "Not found".to_owned(),
            Self::Database(RepositoryError::Conflict(msg)) => msg.clone(),
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_owned(),
            Self::Slug(_) => "Could not generate a unique slug".to_owned(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let error = self.public_message();

        let conflicts = match &self {
            Self::StockConflicts(conflicts) => Some(conflicts.as_slice()),
            Self::Cart(CartError::Stock(conflict)) => Some(std::slice::from_ref(conflict)),
            _ => None,
        };

        let body = ErrorBody {
            success: false,
            error,
            conflicts,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for a state-changing action.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added items", Some(&[("user_id", "42")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use bazaar_core::ProductId;

    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("post".to_string());
        assert_eq!(err.to_string(), "post not found");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::NotFound("test".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Database(RepositoryError::Conflict("dup".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Cart(CartError::EmptyBatch).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Cart(CartError::LineNotFound(ProductId::new(1))).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Slug(SlugError::GenerationFailed {
                base: "x".into(),
                attempts: 1001
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Query(QueryError::InvalidField {
                field: "nope".into(),
                allowed: "name".into()
            })
            .status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (status, body) = body_json(AppError::Internal("pool exhausted".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Internal server error");
        assert!(body.get("conflicts").is_none());
    }

    #[tokio::test]
    async fn test_conflict_body_lists_conflicts() {
        let conflict = StockConflict {
            product_id: ProductId::new(9),
            reason: bazaar_core::cart::ConflictReason::ProductNotFound,
            available: None,
            requested: 2,
        };
        let (status, body) = body_json(AppError::StockConflicts(vec![conflict])).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["conflicts"][0]["productId"], 9);
        assert_eq!(body["conflicts"][0]["reason"], "productNotFound");
    }
}
