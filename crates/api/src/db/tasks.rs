//! Task repository.

use bazaar_core::query::{ListQuery, schema};
use bazaar_core::{TaskCategory, TaskId, TaskPriority, TaskStatus, UserId};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use super::RepositoryError;
use super::list::{Table, fetch_list};
use crate::models::task::{NewTask, StatusCount, Subtask, Task, progress};

const COLUMNS: &str = "id, user_id, title, description, category, priority, status, due_date, \
                       estimated_time, actual_time, tags, subtasks, completed_at, created_at, \
                       updated_at";

/// Listing metadata for `tasks`.
pub static TASKS_TABLE: Table = Table {
    name: "tasks",
    columns: COLUMNS,
    schema: &schema::TASKS,
};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TaskRow {
    id: i64,
    user_id: i64,
    title: String,
    description: Option<String>,
    category: TaskCategory,
    priority: TaskPriority,
    status: TaskStatus,
    due_date: DateTime<Utc>,
    estimated_time: Option<i32>,
    actual_time: i32,
    tags: Vec<String>,
    subtasks: Json<Vec<Subtask>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        let Json(subtasks) = row.subtasks;
        Self {
            id: TaskId::new(row.id),
            user_id: UserId::new(row.user_id),
            title: row.title,
            description: row.description,
            category: row.category,
            priority: row.priority,
            status: row.status,
            due_date: row.due_date,
            estimated_time: row.estimated_time,
            actual_time: row.actual_time,
            tags: row.tags,
            progress: progress(row.status, &subtasks),
            subtasks,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for task database operations.
pub struct TaskRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TaskRepository<'a> {
    /// Create a new task repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a validated task.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, task: &NewTask) -> Result<Task, RepositoryError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r"
            INSERT INTO tasks (user_id, title, description, category, priority, status, due_date,
                               estimated_time, tags, subtasks, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {COLUMNS}
            "
        ))
        .bind(task.user_id)
        .bind(&task.title)
        .bind(task.description.as_deref())
        .bind(task.category)
        .bind(task.priority)
        .bind(task.status)
        .bind(task.due_date)
        .bind(task.estimated_time)
        .bind(&task.tags)
        .bind(Json(&task.subtasks))
        .bind(task.completed_at)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// List tasks matching a resolved query.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, query: &ListQuery) -> Result<(Vec<Task>, u64), RepositoryError> {
        let (rows, total) = fetch_list::<TaskRow>(self.pool, &TASKS_TABLE, query).await?;
        Ok((rows.into_iter().map(Task::from).collect(), total))
    }

    /// Get a task by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: TaskId) -> Result<Option<Task>, RepositoryError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!("SELECT {COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Task::from))
    }

    /// Change a task's status. Completing stamps `completed_at` once; any
    /// other status clears it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the task does not exist.
    pub async fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<Task, RepositoryError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r"
            UPDATE tasks
            SET status = $2,
                completed_at = CASE
                    WHEN $2 = 'Completed'::task_status THEN COALESCE(completed_at, NOW())
                    ELSE NULL
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.ok_or(RepositoryError::NotFound)?.into())
    }

    /// Number of a user's tasks in each status, in workflow order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn status_counts(&self, user_id: UserId) -> Result<Vec<StatusCount>, RepositoryError> {
        let counts = sqlx::query_as::<_, StatusCount>(
            r"
            SELECT status, COUNT(*) AS count
            FROM tasks
            WHERE user_id = $1
            GROUP BY status
            ORDER BY status
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(counts)
    }
}
