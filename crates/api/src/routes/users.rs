//! User route handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bazaar_core::UserId;
use bazaar_core::query::{FilterSet, ListQuery, PageMeta, RawParams, build_filter, schema::USERS};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::instrument;

use crate::db::UserRepository;
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::models::user::{
    BulkDeleteInput, BulkUpdateInput, BulkUpdated, NewUserInput, User, UserPatchInput, UserUpsertInput,
};
use crate::models::{ItemOutcome, ValidationError};
use crate::response::{ApiResponse, BulkReport, ListResponse, UpsertReport, project};
use crate::state::AppState;

/// `POST /api/users/{id}/increment-age` body. An empty body adds one year.
#[derive(Debug, Deserialize)]
pub struct IncrementAge {
    #[serde(default = "one")]
    pub by: i32,
}

const fn one() -> i32 {
    1
}

/// Largest step that can keep an age inside 0..=120.
const MAX_AGE_STEP: i32 = 120;

impl IncrementAge {
    fn from_body(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self { by: one() });
        }
        let step: Self =
            serde_json::from_slice(body).map_err(|e| AppError::BadRequest(e.to_string()))?;
        if !(-MAX_AGE_STEP..=MAX_AGE_STEP).contains(&step.by) {
            return Err(ValidationError::new(
                "by",
                format!("must be between -{MAX_AGE_STEP} and {MAX_AGE_STEP}"),
            )
            .into());
        }
        Ok(step)
    }
}

/// Resolve a JSON filter object with the list query rules. Scalars are
/// read as their query-string text; a filter that names no condition
/// besides the implicit soft-delete flag is refused.
fn resolve_filter(filter: Map<String, Value>) -> Result<FilterSet> {
    let mut raw = RawParams::new();
    for (key, value) in filter {
        let text = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => continue,
            Value::Array(_) | Value::Object(_) => {
                return Err(AppError::BadRequest(format!(
                    "filter.{key} must be a string, number or boolean"
                )));
            }
        };
        raw.insert(key, text);
    }
    let filters = build_filter(&raw, &USERS)?;
    let hidden_flag = USERS.soft_delete.map(|s| s.field);
    if filters.iter().all(|(field, _)| Some(field) == hidden_flag) {
        return Err(AppError::BadRequest(
            "filter must name at least one condition".to_owned(),
        ));
    }
    Ok(filters)
}

async fn find(state: &AppState, id: UserId) -> Result<User> {
    UserRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id}")))
}

/// List users with filters, sort, paging and projection.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    ApiQuery(raw): ApiQuery<RawParams>,
) -> Result<ListResponse<Value>> {
    let query = ListQuery::resolve(&raw, &USERS)?;
    let (users, total) = UserRepository::new(state.pool()).list(&query).await?;
    let data = project(users, query.projection.as_ref())?;
    Ok(ListResponse::new(PageMeta::new(total, &query.page), data))
}

/// Create one user.
#[instrument(skip(state, input))]
pub async fn create(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewUserInput>,
) -> Result<Response> {
    let user = input.validate()?;
    let created = UserRepository::new(state.pool()).create(&user).await?;
    tracing::info!(user_id = %created.id, "user created");
    Ok(ApiResponse::created(created))
}

/// Create users one by one; failures don't stop the batch.
#[instrument(skip(state, items), fields(items = items.len()))]
pub async fn bulk_create(
    State(state): State<AppState>,
    ApiJson(items): ApiJson<Vec<Value>>,
) -> Result<BulkReport<User>> {
    if items.is_empty() {
        return Err(AppError::BadRequest("at least one user is required".to_owned()));
    }
    let repo = UserRepository::new(state.pool());
    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let attempt = async {
            let input: NewUserInput = serde_json::from_value(item)
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            let user = input.validate()?;
            Ok::<_, AppError>(repo.create(&user).await?)
        };
        results.push(match attempt.await {
            Ok(user) => ItemOutcome::ok(index, user),
            Err(e) => {
                tracing::debug!(index, error = %e, "bulk user item failed");
                ItemOutcome::failed(index, e.public_message())
            }
        });
    }
    Ok(BulkReport::new(results))
}

/// Create every user or none.
#[instrument(skip(state, inputs), fields(items = inputs.len()))]
pub async fn create_all(
    State(state): State<AppState>,
    ApiJson(inputs): ApiJson<Vec<NewUserInput>>,
) -> Result<Response> {
    if inputs.is_empty() {
        return Err(AppError::BadRequest("at least one user is required".to_owned()));
    }
    let users = inputs
        .into_iter()
        .map(NewUserInput::validate)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let created = UserRepository::new(state.pool()).create_all(&users).await?;
    tracing::info!(count = created.len(), "users created in one transaction");
    Ok(ApiResponse::created(created))
}

/// Apply one patch to every user a filter selects.
#[instrument(skip(state, input))]
pub async fn bulk_update(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<BulkUpdateInput>,
) -> Result<ApiResponse<BulkUpdated>> {
    let patch = input.update.validate()?;
    if patch.is_empty() {
        return Err(AppError::BadRequest("no fields to update".to_owned()));
    }
    let filters = resolve_filter(input.filter)?;
    let counts = UserRepository::new(state.pool())
        .update_matching(&filters, &patch)
        .await?;
    tracing::info!(
        matched = counts.matched_count,
        modified = counts.modified_count,
        "users bulk-updated"
    );
    Ok(ApiResponse::ok(counts))
}

/// Permanently remove every user a filter selects.
#[instrument(skip(state, input))]
pub async fn bulk_delete(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<BulkDeleteInput>,
) -> Result<ApiResponse<Value>> {
    let filters = resolve_filter(input.filter)?;
    let deleted = UserRepository::new(state.pool())
        .delete_matching(&filters)
        .await?;
    tracing::info!(deleted, "users bulk-deleted");
    Ok(ApiResponse::ok(json!({ "deletedCount": deleted })))
}

/// Insert or update users keyed by email; failures don't stop the batch.
#[instrument(skip(state, items), fields(items = items.len()))]
pub async fn upsert(
    State(state): State<AppState>,
    ApiJson(items): ApiJson<Vec<Value>>,
) -> Result<UpsertReport<User>> {
    if items.is_empty() {
        return Err(AppError::BadRequest("at least one user is required".to_owned()));
    }
    let repo = UserRepository::new(state.pool());
    let mut results = Vec::with_capacity(items.len());
    let mut inserted = 0;
    for (index, item) in items.into_iter().enumerate() {
        let attempt = async {
            let input: UserUpsertInput = serde_json::from_value(item)
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            let upsert = input.validate()?;
            Ok::<_, AppError>(repo.upsert_by_email(&upsert).await?)
        };
        results.push(match attempt.await {
            Ok((user, is_new)) => {
                inserted += usize::from(is_new);
                ItemOutcome::ok(index, user)
            }
            Err(e) => {
                tracing::debug!(index, error = %e, "upsert item failed");
                ItemOutcome::failed(index, e.public_message())
            }
        });
    }
    Ok(UpsertReport::new(inserted, results))
}

/// Get one user.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<ApiResponse<User>> {
    Ok(ApiResponse::ok(find(&state, id).await?))
}

/// Partially update a user.
#[instrument(skip(state, input))]
pub async fn update(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(input): ApiJson<UserPatchInput>,
) -> Result<ApiResponse<User>> {
    let patch = input.validate()?;
    if patch.is_empty() {
        return Err(AppError::BadRequest("no fields to update".to_owned()));
    }
    let user = UserRepository::new(state.pool()).update(id, &patch).await?;
    Ok(ApiResponse::ok(user))
}

/// Atomically add to a user's age.
#[instrument(skip(state, body))]
pub async fn increment_age(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
    body: Bytes,
) -> Result<ApiResponse<User>> {
    let by = IncrementAge::from_body(&body)?.by;
    let user = UserRepository::new(state.pool())
        .increment_age(id, by)
        .await?;
    Ok(ApiResponse::ok(user))
}

/// Flag a user as deleted.
#[instrument(skip(state))]
pub async fn soft_delete(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<ApiResponse<User>> {
    let user = UserRepository::new(state.pool()).soft_delete(id).await?;
    tracing::info!(user_id = %id, "user soft-deleted");
    Ok(ApiResponse::ok(user))
}

/// Remove a user permanently.
#[instrument(skip(state))]
pub async fn destroy(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<impl IntoResponse> {
    UserRepository::new(state.pool()).delete(id).await?;
    tracing::info!(user_id = %id, "user deleted");
    Ok(ApiResponse::ok(json!({ "id": id })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_body_defaults_to_one() {
        assert_eq!(IncrementAge::from_body(b"").unwrap().by, 1);
        assert_eq!(IncrementAge::from_body(b"{}").unwrap().by, 1);
        assert_eq!(IncrementAge::from_body(br#"{"by": 5}"#).unwrap().by, 5);
        assert!(IncrementAge::from_body(b"{").is_err());
    }

    #[test]
    fn test_increment_step_is_bounded() {
        assert_eq!(IncrementAge::from_body(br#"{"by": -120}"#).unwrap().by, -120);
        let err = IncrementAge::from_body(br#"{"by": 2147483647}"#).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(IncrementAge::from_body(br#"{"by": -121}"#).is_err());
        assert!(IncrementAge::from_body(br#"{"by": -2147483648}"#).is_err());
    }

    #[test]
    fn test_resolve_filter_reads_scalars() {
        let filter = json!({"role": "guest", "age_gt": 30, "q": null});
        let Value::Object(map) = filter else { unreachable!() };
        let filters = resolve_filter(map).unwrap();
        assert!(filters.get("role").is_some());
        assert!(filters.get("age").is_some());
        assert!(filters.get("deleted").is_some());
    }

    #[test]
    fn test_resolve_filter_needs_a_condition() {
        let err = resolve_filter(Map::new()).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);

        let Value::Object(map) = json!({"includeDeleted": true}) else { unreachable!() };
        assert!(resolve_filter(map).is_err());

        let Value::Object(map) = json!({"role": ["guest"]}) else { unreachable!() };
        assert!(resolve_filter(map).is_err());

        let Value::Object(map) = json!({"age_gt": "old"}) else { unreachable!() };
        assert_eq!(
            resolve_filter(map).unwrap_err().status(),
            axum::http::StatusCode::BAD_REQUEST
        );
    }
}
