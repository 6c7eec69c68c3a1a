//! Success envelopes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bazaar_core::query::{PageMeta, Projection};
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::ItemOutcome;

/// `{ "success": true, "data": ... }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }

    /// `201 Created` with this body.
    pub fn created(data: T) -> Response {
        (StatusCode::CREATED, Json(Self::ok(data))).into_response()
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// `{ "success": true, "meta": {...}, "data": [...] }`
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub success: bool,
    pub meta: PageMeta,
    pub data: Vec<T>,
}

impl<T: Serialize> ListResponse<T> {
    pub const fn new(meta: PageMeta, data: Vec<T>) -> Self {
        Self {
            success: true,
            meta,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ListResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Per-item report for a partial-success batch:
/// `{ "success": <no failures>, "created": n, "failed": n, "results": [...] }`
#[derive(Debug, Serialize)]
pub struct BulkReport<T> {
    pub success: bool,
    pub created: usize,
    pub failed: usize,
    pub results: Vec<ItemOutcome<T>>,
}

impl<T: Serialize> BulkReport<T> {
    #[must_use]
    pub fn new(results: Vec<ItemOutcome<T>>) -> Self {
        let created = results.iter().filter(|r| r.success).count();
        let failed = results.len() - created;
        Self {
            success: failed == 0,
            created,
            failed,
            results,
        }
    }
}

impl<T: Serialize> IntoResponse for BulkReport<T> {
    /// `201` when every item was created, `207` otherwise.
    fn into_response(self) -> Response {
        let status = if self.failed == 0 {
            StatusCode::CREATED
        } else {
            StatusCode::MULTI_STATUS
        };
        (status, Json(self)).into_response()
    }
}

/// Per-item report for a batch of upserts:
/// `{ "success": <no failures>, "inserted": n, "updated": n, "failed": n, "results": [...] }`
#[derive(Debug, Serialize)]
pub struct UpsertReport<T> {
    pub success: bool,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    pub results: Vec<ItemOutcome<T>>,
}

impl<T: Serialize> UpsertReport<T> {
    /// `inserted` of the successful outcomes created a row; the rest updated one.
    #[must_use]
    pub fn new(inserted: usize, results: Vec<ItemOutcome<T>>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        Self {
            success: failed == 0,
            inserted,
            updated: succeeded.saturating_sub(inserted),
            failed,
            results,
        }
    }
}

impl<T: Serialize> IntoResponse for UpsertReport<T> {
    /// `200` when every item was written, `207` otherwise.
    fn into_response(self) -> Response {
        let status = if self.failed == 0 {
            StatusCode::OK
        } else {
            StatusCode::MULTI_STATUS
        };
        (status, Json(self)).into_response()
    }
}

/// Serialize `items` and keep only the projected fields.
///
/// # Errors
///
/// Returns `AppError::Internal` if an item fails to serialize.
pub fn project<T: Serialize>(items: Vec<T>, projection: Option<&Projection>) -> Result<Vec<Value>> {
    items
        .into_iter()
        .map(|item| {
            let value = serde_json::to_value(item)
                .map_err(|e| AppError::Internal(format!("serialize: {e}")))?;
            Ok(match projection {
                Some(p) => p.apply(value),
                None => value,
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::query::schema::USERS;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_project_keeps_selected_fields() {
        let projection = Projection::parse(Some("name"), &USERS).unwrap();
        let rows = project(
            vec![json!({"id": 1, "name": "Ann", "email": "ann@example.com"})],
            projection.as_ref(),
        )
        .unwrap();
        assert_eq!(rows, vec![json!({"id": 1, "name": "Ann"})]);
    }

    #[test]
    fn test_bulk_report_status() {
        let all_ok = BulkReport::new(vec![ItemOutcome::ok(0, 1)]);
        assert_eq!(all_ok.into_response().status(), StatusCode::CREATED);

        let mixed = BulkReport::new(vec![ItemOutcome::ok(0, 1), ItemOutcome::failed(1, "dup")]);
        assert_eq!((mixed.created, mixed.failed), (1, 1));
        assert_eq!(mixed.into_response().status(), StatusCode::MULTI_STATUS);
    }

    #[tokio::test]
    async fn test_bulk_report_body_is_top_level() {
        let mixed = BulkReport::new(vec![ItemOutcome::ok(0, 1), ItemOutcome::failed(1, "dup")]);
        let bytes = axum::body::to_bytes(mixed.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["created"], 1);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["results"][1]["error"], "dup");
        assert!(body.get("data").is_none());
    }

    #[test]
    fn test_upsert_report_counts() {
        let report = UpsertReport::new(
            1,
            vec![
                ItemOutcome::ok(0, 1),
                ItemOutcome::ok(1, 2),
                ItemOutcome::failed(2, "bad"),
            ],
        );
        assert_eq!((report.inserted, report.updated, report.failed), (1, 1, 1));
        assert!(!report.success);
        assert_eq!(report.into_response().status(), StatusCode::MULTI_STATUS);

        let clean = UpsertReport::new(0, vec![ItemOutcome::ok(0, 1)]);
        assert_eq!(clean.updated, 1);
        assert_eq!(clean.into_response().status(), StatusCode::OK);
    }

    #[test]
    fn test_project_without_projection_is_identity() {
        let rows = project(vec![json!({"id": 2})], None).unwrap();
        assert_eq!(rows, vec![json!({"id": 2})]);
    }
}
