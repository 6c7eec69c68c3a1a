//! Task domain types.

use bazaar_core::{TaskCategory, TaskId, TaskPriority, TaskStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ValidationError, normalize_tags, optional_text, parse_label, required_text};

const MAX_TITLE_LENGTH: usize = 200;
const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// A checklist entry inside a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// A user's task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: DateTime<Utc>,
    /// Minutes.
    pub estimated_time: Option<i32>,
    pub actual_time: i32,
    pub tags: Vec<String>,
    pub subtasks: Vec<Subtask>,
    /// Percentage of subtasks completed.
    pub progress: u8,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Percentage of completed subtasks, rounded. Without subtasks a task is
/// either done (100) or not (0).
#[must_use]
pub fn progress(status: TaskStatus, subtasks: &[Subtask]) -> u8 {
    if subtasks.is_empty() {
        return if status == TaskStatus::Completed { 100 } else { 0 };
    }
    let done = subtasks.iter().filter(|s| s.completed).count();
    let total = subtasks.len();
    // (done * 100 + total / 2) / total is at most 100
    u8::try_from((done * 100 + total / 2) / total).unwrap_or(100)
}

/// `completedAt` after a status change.
#[must_use]
pub fn completed_at_for(
    status: TaskStatus,
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if status == TaskStatus::Completed {
        Some(current.unwrap_or(now))
    } else {
        None
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskInput {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

/// `POST /api/tasks` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTaskInput {
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub due_date: DateTime<Utc>,
    pub estimated_time: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<SubtaskInput>,
}

/// A validated task ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: DateTime<Utc>,
    pub estimated_time: Option<i32>,
    pub tags: Vec<String>,
    pub subtasks: Vec<Subtask>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NewTaskInput {
    /// # Errors
    ///
    /// Returns the first field that breaks a rule.
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewTask, ValidationError> {
        let status: TaskStatus = self
            .status
            .as_deref()
            .map(|s| parse_label("status", s))
            .transpose()?
            .unwrap_or_default();
        if self.estimated_time.is_some_and(|t| t < 0) {
            return Err(ValidationError::new("estimatedTime", "cannot be negative"));
        }
        let subtasks = self
            .subtasks
            .iter()
            .map(|s| {
                Ok(Subtask {
                    title: required_text("subtasks", &s.title, MAX_TITLE_LENGTH)?,
                    completed: s.completed,
                    created_at: now,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(NewTask {
            user_id: self.user_id,
            title: required_text("title", &self.title, MAX_TITLE_LENGTH)?,
            description: optional_text(
                "description",
                self.description.as_deref(),
                MAX_DESCRIPTION_LENGTH,
            )?,
            category: self
                .category
                .as_deref()
                .map(|c| parse_label("category", c))
                .transpose()?
                .unwrap_or_default(),
            priority: self
                .priority
                .as_deref()
                .map(|p| parse_label("priority", p))
                .transpose()?
                .unwrap_or_default(),
            status,
            due_date: self.due_date,
            estimated_time: self.estimated_time,
            tags: normalize_tags(&self.tags),
            subtasks,
            completed_at: completed_at_for(status, None, now),
        })
    }
}

/// `PATCH /api/tasks/{id}/status` body.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub status: String,
}

impl StatusChange {
    /// # Errors
    ///
    /// Returns a validation error for an unknown status label.
    pub fn validate(&self) -> Result<TaskStatus, ValidationError> {
        parse_label("status", &self.status)
    }
}

/// Count of a user's tasks in one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: TaskStatus,
    pub count: i64,
}

/// Summary of one user's tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAnalytics {
    pub user_id: UserId,
    pub total: i64,
    pub completed: i64,
    /// Completed share of all tasks, rounded percent.
    pub completion_rate: u8,
    pub by_status: Vec<StatusCount>,
}

impl TaskAnalytics {
    #[must_use]
    pub fn from_counts(user_id: UserId, by_status: Vec<StatusCount>) -> Self {
        let total: i64 = by_status.iter().map(|c| c.count).sum();
        let completed = by_status
            .iter()
            .filter(|c| c.status == TaskStatus::Completed)
            .map(|c| c.count)
            .sum();
        let completion_rate = if total > 0 {
            u8::try_from((completed * 100 + total / 2) / total).unwrap_or(100)
        } else {
            0
        };
        Self {
            user_id,
            total,
            completed,
            completion_rate,
            by_status,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sub(completed: bool) -> Subtask {
        Subtask {
            title: "step".into(),
            completed,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_progress_without_subtasks() {
        assert_eq!(progress(TaskStatus::Completed, &[]), 100);
        assert_eq!(progress(TaskStatus::InProgress, &[]), 0);
    }

    #[test]
    fn test_progress_rounds() {
        assert_eq!(progress(TaskStatus::Todo, &[sub(true), sub(false), sub(false)]), 33);
        assert_eq!(progress(TaskStatus::Todo, &[sub(true), sub(true), sub(false)]), 67);
        assert_eq!(progress(TaskStatus::Todo, &[sub(true)]), 100);
    }

    #[test]
    fn test_completed_at_rules() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::hours(2);
        assert_eq!(completed_at_for(TaskStatus::Completed, None, now), Some(now));
        assert_eq!(
            completed_at_for(TaskStatus::Completed, Some(earlier), now),
            Some(earlier)
        );
        assert_eq!(completed_at_for(TaskStatus::Review, Some(earlier), now), None);
    }

    #[test]
    fn test_validate_task_input() {
        let input: NewTaskInput = serde_json::from_value(serde_json::json!({
            "userId": 4,
            "title": "Essay draft",
            "status": "In Progress",
            "dueDate": "2024-05-20T09:00:00Z",
            "tags": ["English", "english"],
            "subtasks": [{"title": "outline", "completed": true}]
        }))
        .unwrap();
        let task = input.validate(Utc::now()).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.tags, vec!["english"]);
        assert!(task.completed_at.is_none());
        assert_eq!(task.subtasks.len(), 1);
    }

    #[test]
    fn test_status_change_label() {
        let change = StatusChange {
            status: "Done".into(),
        };
        assert_eq!(change.validate().unwrap_err().field, "status");
    }

    #[test]
    fn test_analytics_completion_rate() {
        let analytics = TaskAnalytics::from_counts(
            UserId::new(1),
            vec![
                StatusCount {
                    status: TaskStatus::Todo,
                    count: 2,
                },
                StatusCount {
                    status: TaskStatus::Completed,
                    count: 1,
                },
            ],
        );
        assert_eq!(analytics.total, 3);
        assert_eq!(analytics.completed, 1);
        assert_eq!(analytics.completion_rate, 33);
        assert_eq!(
            TaskAnalytics::from_counts(UserId::new(1), Vec::new()).completion_rate,
            0
        );
    }
}
