//! Post service: slug allocation and publish-date bookkeeping on top of
//! [`PostRepository`].

use bazaar_core::{PostId, Slug, generate_slug};
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use tracing::instrument;

use crate::db::posts::{PostRepository, PostWrite, is_slug_race};
use crate::error::{AppError, Result};
use crate::models::ItemOutcome;
use crate::models::post::{NewPost, NewPostInput, Post, PostPatch, published_date_for};

const TITLE_TAKEN: &str = "a post with this title already exists";

/// Post operations for one request.
pub struct PostService<'a> {
    posts: PostRepository<'a>,
}

impl<'a> PostService<'a> {
    /// Create a new post service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            posts: PostRepository::new(pool),
        }
    }

    /// First free slug for `title`. The post `except` may keep its own slug.
    async fn allocate_slug(&self, title: &str, except: Option<PostId>) -> Result<Slug> {
        let taken = self.posts.taken_slugs(title, except).await?;
        let slug = generate_slug(title, |candidate| taken.contains(candidate))?;
        tracing::debug!(slug = %slug, "slug allocated");
        Ok(slug)
    }

    /// Create a post.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the title is already used
    /// - `Slug` if no free slug exists
    /// - `Database` if the insert fails twice on a slug race
    #[instrument(skip(self, post), fields(title = %post.title))]
    pub async fn create(&self, post: &NewPost) -> Result<Post> {
        if self.posts.title_taken(&post.title, None).await? {
            return Err(AppError::Conflict(TITLE_TAKEN.to_owned()));
        }
        let published = published_date_for(post.status, None, Utc::now());

        let slug = self.allocate_slug(&post.title, None).await?;
        let created = match self.posts.insert(post, &slug, published).await {
            Err(e) if is_slug_race(&e) => {
                tracing::warn!(slug = %slug, "slug taken concurrently, retrying once");
                let slug = self.allocate_slug(&post.title, None).await?;
                self.posts.insert(post, &slug, published).await?
            }
            other => other?,
        };

        tracing::info!(post_id = %created.id, slug = %created.slug, "post created");
        Ok(created)
    }

    /// Create posts one by one, reporting each item's outcome.
    pub async fn create_many(&self, items: Vec<Value>) -> Vec<ItemOutcome<Post>> {
        let mut outcomes = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let outcome = match self.create_one(item).await {
                Ok(post) => ItemOutcome::ok(index, post),
                Err(e) => {
                    tracing::debug!(index, error = %e, "bulk post item failed");
                    ItemOutcome::failed(index, e.public_message())
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn create_one(&self, item: Value) -> Result<Post> {
        let input: NewPostInput =
            serde_json::from_value(item).map_err(|e| AppError::BadRequest(e.to_string()))?;
        let post = input.validate()?;
        self.create(&post).await
    }

    /// Apply a partial update. A new title re-checks uniqueness and gets a
    /// fresh slug; publishing stamps `published_date` once, any other status
    /// clears it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the post does not exist
    /// - `Conflict` if the new title is already used
    /// - `Slug` if no free slug exists
    #[instrument(skip(self, patch), fields(post_id = %id))]
    pub async fn update(&self, id: PostId, patch: PostPatch) -> Result<Post> {
        let current = self
            .posts
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {id}")))?;

        let renamed = patch.title.as_ref().filter(|t| **t != current.title).cloned();
        if let Some(title) = &renamed
            && self.posts.title_taken(title, Some(id)).await?
        {
            return Err(AppError::Conflict(TITLE_TAKEN.to_owned()));
        }

        let status = patch.status.unwrap_or(current.status);
        let mut write = PostWrite {
            slug: match &renamed {
                Some(title) => self.allocate_slug(title, Some(id)).await?,
                None => current.slug,
            },
            title: renamed.clone().unwrap_or(current.title),
            content: patch.content.unwrap_or(current.content),
            author: patch.author.unwrap_or(current.author),
            tags: patch.tags.unwrap_or(current.tags),
            category: patch.category.unwrap_or(current.category),
            status,
            published_date: published_date_for(status, current.published_date, Utc::now()),
        };

        let updated = match self.posts.update(id, &write).await {
            Err(e) if is_slug_race(&e) => {
                tracing::warn!(slug = %write.slug, "slug taken concurrently, retrying once");
                write.slug = self.allocate_slug(&write.title, Some(id)).await?;
                self.posts.update(id, &write).await?
            }
            other => other?,
        };
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RepositoryError;
    use crate::models::ValidationError;

    #[test]
    fn test_bulk_item_messages_hide_database_errors() {
        let err = AppError::Database(RepositoryError::DataCorruption("bad row".into()));
        assert_eq!(err.public_message(), "Internal server error");

        let err = AppError::Validation(ValidationError::new("title", "is required"));
        assert_eq!(err.public_message(), "title: is required");

        let err = AppError::Database(RepositoryError::Conflict(TITLE_TAKEN.to_owned()));
        assert_eq!(err.public_message(), TITLE_TAKEN);
    }
}
