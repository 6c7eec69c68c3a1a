//! Post domain types.

use bazaar_core::{PostCategory, PostId, PostStatus, Slug};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ValidationError, normalize_tags, parse_label, required_text};

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_CONTENT_LENGTH: usize = 10_000;
pub const MAX_AUTHOR_LENGTH: usize = 100;

/// A blog post.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub slug: Slug,
    pub content: String,
    pub author: String,
    pub tags: Vec<String>,
    pub category: PostCategory,
    pub status: PostStatus,
    pub published_date: Option<DateTime<Utc>>,
    pub views: u64,
    pub likes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `POST /api/posts` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPostInput {
    pub title: String,
    pub content: String,
    pub author: String,
    pub category: String,
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A validated post ready to insert; the slug is allocated at insert time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub author: String,
    pub category: PostCategory,
    pub status: PostStatus,
    pub tags: Vec<String>,
}

impl NewPostInput {
    /// # Errors
    ///
    /// Returns the first field that breaks a rule.
    pub fn validate(self) -> Result<NewPost, ValidationError> {
        Ok(NewPost {
            title: required_text("title", &self.title, MAX_TITLE_LENGTH)?,
            content: required_text("content", &self.content, MAX_CONTENT_LENGTH)?,
            author: required_text("author", &self.author, MAX_AUTHOR_LENGTH)?,
            category: parse_label("category", &self.category)?,
            status: self
                .status
                .as_deref()
                .map(|s| parse_label("status", s))
                .transpose()?
                .unwrap_or_default(),
            tags: normalize_tags(&self.tags),
        })
    }
}

/// `PUT /api/posts/{id}` body. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPatchInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// A validated partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub category: Option<PostCategory>,
    pub status: Option<PostStatus>,
    pub tags: Option<Vec<String>>,
}

impl PostPatchInput {
    /// # Errors
    ///
    /// Returns the first field that breaks a rule.
    pub fn validate(self) -> Result<PostPatch, ValidationError> {
        Ok(PostPatch {
            title: self
                .title
                .as_deref()
                .map(|t| required_text("title", t, MAX_TITLE_LENGTH))
                .transpose()?,
            content: self
                .content
                .as_deref()
                .map(|c| required_text("content", c, MAX_CONTENT_LENGTH))
                .transpose()?,
            author: self
                .author
                .as_deref()
                .map(|a| required_text("author", a, MAX_AUTHOR_LENGTH))
                .transpose()?,
            category: self
                .category
                .as_deref()
                .map(|c| parse_label("category", c))
                .transpose()?,
            status: self
                .status
                .as_deref()
                .map(|s| parse_label("status", s))
                .transpose()?,
            tags: self.tags.as_deref().map(normalize_tags),
        })
    }
}

/// `publishedDate` after a status change: publishing stamps it once, any
/// other status clears it.
#[must_use]
pub fn published_date_for(
    status: PostStatus,
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match status {
        PostStatus::Published => Some(current.unwrap_or(now)),
        PostStatus::Draft | PostStatus::Archived => None,
    }
}

/// Aggregates for `GET /api/posts/analytics`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAnalytics {
    pub by_status: Vec<LabelCount>,
    pub top_viewed: Vec<TopPost>,
    pub by_category: Vec<LabelCount>,
}

/// Count of posts sharing a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

/// A post summary ranked by views.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopPost {
    pub id: PostId,
    pub title: String,
    pub slug: Slug,
    pub views: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input() -> NewPostInput {
        NewPostInput {
            title: " Hello World ".into(),
            content: "Body".into(),
            author: "Ann".into(),
            category: "Technology".into(),
            status: None,
            tags: vec!["Rust".into(), "rust ".into()],
        }
    }

    #[test]
    fn test_validate_defaults() {
        let post = input().validate().unwrap();
        assert_eq!(post.title, "Hello World");
        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.tags, vec!["rust"]);
    }

    #[test]
    fn test_validate_rejects_unknown_category() {
        let mut bad = input();
        bad.category = "Sports".into();
        assert_eq!(bad.validate().unwrap_err().field, "category");
    }

    #[test]
    fn test_validate_title_length() {
        let mut bad = input();
        bad.title = "x".repeat(MAX_TITLE_LENGTH + 1);
        assert_eq!(bad.validate().unwrap_err().field, "title");
    }

    #[test]
    fn test_published_date_rules() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::days(3);
        assert_eq!(published_date_for(PostStatus::Published, None, now), Some(now));
        assert_eq!(
            published_date_for(PostStatus::Published, Some(earlier), now),
            Some(earlier)
        );
        assert_eq!(published_date_for(PostStatus::Draft, Some(earlier), now), None);
    }
}
