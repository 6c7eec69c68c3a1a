//! Domain models and request payloads.
//!
//! Payload types (`*Input`, `*Patch`) deserialize loosely and are turned into
//! validated values by their `validate` methods, so every rule violation is
//! reported as a 400 with the offending field.

pub mod post;
pub mod product;
pub mod task;
pub mod user;

use serde::Serialize;
use thiserror::Error;

pub use post::{NewPost, NewPostInput, Post, PostPatch, PostPatchInput};
pub use product::{Product, Rating};
pub use task::{NewTask, NewTaskInput, StatusChange, Subtask, Task, TaskAnalytics};
pub use user::{NewUser, NewUserInput, User, UserPatch, UserPatchInput};

/// A payload field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Trim `value` and check it is non-empty and at most `max` characters.
pub(crate) fn required_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, "is required"));
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::new(
            field,
            format!("cannot exceed {max} characters"),
        ));
    }
    Ok(trimmed.to_owned())
}

/// Like [`required_text`] but blank input becomes `None`.
pub(crate) fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => required_text(field, v, max).map(Some),
    }
}

/// Parse an enum label, reporting the accepted values on failure.
pub(crate) fn parse_label<T>(field: &'static str, value: &str) -> Result<T, ValidationError>
where
    T: std::str::FromStr<Err = bazaar_core::InvalidLabel>,
{
    value
        .trim()
        .parse()
        .map_err(|e: bazaar_core::InvalidLabel| ValidationError::new(field, e.to_string()))
}

/// Trim, lower-case and de-duplicate tags, keeping first-seen order.
pub(crate) fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Result of one item in a partial-success batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome<T> {
    /// Position in the request batch.
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ItemOutcome<T> {
    pub const fn ok(index: usize, data: T) -> Self {
        Self {
            index,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(index: usize, error: impl ToString) -> Self {
        Self {
            index,
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("title", "  Hi ", 10).unwrap(), "Hi");
        assert!(required_text("title", "   ", 10).is_err());
        let err = required_text("title", "abcdef", 5).unwrap_err();
        assert_eq!(err.field, "title");
    }

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text("d", Some("  "), 5).unwrap(), None);
        assert_eq!(optional_text("d", None, 5).unwrap(), None);
        assert_eq!(optional_text("d", Some(" x "), 5).unwrap(), Some("x".into()));
    }

    #[test]
    fn test_normalize_tags() {
        let tags = vec![" Rust".to_owned(), "rust".to_owned(), "".to_owned(), "Web".to_owned()];
        assert_eq!(normalize_tags(&tags), vec!["rust", "web"]);
    }

    #[test]
    fn test_item_outcome_serialization() {
        let ok = serde_json::to_value(ItemOutcome::ok(0, 5)).unwrap();
        assert_eq!(ok, serde_json::json!({"index": 0, "success": true, "data": 5}));
        let failed = serde_json::to_value(ItemOutcome::<u8>::failed(1, "dup")).unwrap();
        assert_eq!(
            failed,
            serde_json::json!({"index": 1, "success": false, "error": "dup"})
        );
    }
}
