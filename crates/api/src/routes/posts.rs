//! Post route handlers.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bazaar_core::PostId;
use bazaar_core::query::{ListQuery, PageMeta, RawParams, schema::POSTS};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use crate::db::PostRepository;
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::models::post::{NewPostInput, Post, PostAnalytics, PostPatchInput};
use crate::response::{ApiResponse, BulkReport, ListResponse, project};
use crate::services::PostService;
use crate::state::AppState;

/// `DELETE /api/posts/{id}` query.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteMode {
    /// Remove the row instead of archiving it.
    #[serde(default)]
    pub hard: bool,
}

/// List posts with filters, sort and paging.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    ApiQuery(raw): ApiQuery<RawParams>,
) -> Result<ListResponse<Value>> {
    let query = ListQuery::resolve(&raw, &POSTS)?;
    let (posts, total) = PostRepository::new(state.pool()).list(&query).await?;
    let data = project(posts, query.projection.as_ref())?;
    Ok(ListResponse::new(PageMeta::new(total, &query.page), data))
}

/// Create a post with a unique slug.
#[instrument(skip(state, input))]
pub async fn create(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewPostInput>,
) -> Result<Response> {
    let post = input.validate()?;
    let created = PostService::new(state.pool()).create(&post).await?;
    Ok(ApiResponse::created(created))
}

/// Create posts one by one; failures don't stop the batch.
#[instrument(skip(state, items), fields(items = items.len()))]
pub async fn bulk_create(
    State(state): State<AppState>,
    ApiJson(items): ApiJson<Vec<Value>>,
) -> Result<BulkReport<Post>> {
    if items.is_empty() {
        return Err(AppError::BadRequest("at least one post is required".to_owned()));
    }
    let results = PostService::new(state.pool()).create_many(items).await;
    Ok(BulkReport::new(results))
}

/// Counts by status and category, and the most viewed posts.
#[instrument(skip(state))]
pub async fn analytics(State(state): State<AppState>) -> Result<ApiResponse<PostAnalytics>> {
    let analytics = PostRepository::new(state.pool()).analytics().await?;
    Ok(ApiResponse::ok(analytics))
}

/// Get a post, counting the view.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<PostId>,
) -> Result<ApiResponse<Post>> {
    let post = PostRepository::new(state.pool()).view(id).await?;
    Ok(ApiResponse::ok(post))
}

/// Update a post; a new title gets a new slug.
#[instrument(skip(state, input))]
pub async fn update(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<PostId>,
    ApiJson(input): ApiJson<PostPatchInput>,
) -> Result<ApiResponse<Post>> {
    let patch = input.validate()?;
    let post = PostService::new(state.pool()).update(id, patch).await?;
    Ok(ApiResponse::ok(post))
}

/// Archive a post, or remove it with `?hard=true`.
#[instrument(skip(state))]
pub async fn destroy(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<PostId>,
    ApiQuery(mode): ApiQuery<DeleteMode>,
) -> Result<Response> {
    let posts = PostRepository::new(state.pool());
    if mode.hard {
        posts.delete(id).await?;
        tracing::info!(post_id = %id, "post deleted");
        return Ok(ApiResponse::ok(json!({ "id": id, "deleted": true })).into_response());
    }
    let post = posts.archive(id).await?;
    tracing::info!(post_id = %id, "post archived");
    Ok(ApiResponse::ok(post).into_response())
}
