//! Task route handlers.

use axum::extract::State;
use axum::response::Response;
use bazaar_core::query::{ListQuery, PageMeta, RawParams, schema::TASKS};
use bazaar_core::{TaskId, UserId};
use chrono::Utc;
use serde_json::Value;
use tracing::instrument;

use crate::db::{TaskRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::models::task::{NewTaskInput, StatusChange, Task, TaskAnalytics};
use crate::response::{ApiResponse, ListResponse, project};
use crate::state::AppState;

/// List tasks with filters, sort and paging.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    ApiQuery(raw): ApiQuery<RawParams>,
) -> Result<ListResponse<Value>> {
    let query = ListQuery::resolve(&raw, &TASKS)?;
    let (tasks, total) = TaskRepository::new(state.pool()).list(&query).await?;
    let data = project(tasks, query.projection.as_ref())?;
    Ok(ListResponse::new(PageMeta::new(total, &query.page), data))
}

/// Create a task for an existing user.
#[instrument(skip(state, input))]
pub async fn create(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewTaskInput>,
) -> Result<Response> {
    let task = input.validate(Utc::now())?;
    if !UserRepository::new(state.pool()).is_active(task.user_id).await? {
        return Err(AppError::NotFound(format!("user {}", task.user_id)));
    }
    let created = TaskRepository::new(state.pool()).create(&task).await?;
    tracing::info!(task_id = %created.id, user_id = %created.user_id, "task created");
    Ok(ApiResponse::created(created))
}

/// Task counts by status for one user.
#[instrument(skip(state))]
pub async fn analytics(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<ApiResponse<TaskAnalytics>> {
    let counts = TaskRepository::new(state.pool())
        .status_counts(user_id)
        .await?;
    Ok(ApiResponse::ok(TaskAnalytics::from_counts(user_id, counts)))
}

/// Get one task with its progress.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TaskId>,
) -> Result<ApiResponse<Task>> {
    let task = TaskRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("task {id}")))?;
    Ok(ApiResponse::ok(task))
}

/// Move a task to a new status.
#[instrument(skip(state))]
pub async fn update_status(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TaskId>,
    ApiJson(change): ApiJson<StatusChange>,
) -> Result<ApiResponse<Task>> {
    let status = change.validate()?;
    let task = TaskRepository::new(state.pool())
        .set_status(id, status)
        .await?;
    tracing::info!(task_id = %id, status = %status, "task status changed");
    Ok(ApiResponse::ok(task))
}
