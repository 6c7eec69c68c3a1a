//! Post repository.
//!
//! Slugs are chosen by the caller; this module only reports which candidates
//! are taken and surfaces slug races so the caller can retry.

use std::collections::HashSet;

use bazaar_core::query::{ListQuery, schema};
use bazaar_core::slug::normalize_title;
use bazaar_core::{PostCategory, PostId, PostStatus, Slug};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::list::{Table, fetch_list};
use super::{RepositoryError, to_u64};
use crate::models::post::{LabelCount, NewPost, Post, PostAnalytics, TopPost};

/// Unique constraint on `posts.slug`.
pub const SLUG_CONSTRAINT: &str = "posts_slug_key";
/// Unique constraint on `posts.title`.
pub const TITLE_CONSTRAINT: &str = "posts_title_key";

const TITLE_TAKEN: &str = "a post with this title already exists";
const TOP_VIEWED: i64 = 5;

const COLUMNS: &str = "id, title, slug, content, author, tags, category, status, \
                       published_date, views, likes, created_at, updated_at";

/// Listing metadata for `posts`.
pub static POSTS_TABLE: Table = Table {
    name: "posts",
    columns: COLUMNS,
    schema: &schema::POSTS,
};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    id: i64,
    title: String,
    slug: Slug,
    content: String,
    author: String,
    tags: Vec<String>,
    category: PostCategory,
    status: PostStatus,
    published_date: Option<DateTime<Utc>>,
    views: i64,
    likes: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PostRow> for Post {
    type Error = RepositoryError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: PostId::new(row.id),
            title: row.title,
            slug: row.slug,
            content: row.content,
            author: row.author,
            tags: row.tags,
            category: row.category,
            status: row.status,
            published_date: row.published_date,
            views: to_u64(row.views, "views")?,
            likes: to_u64(row.likes, "likes")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Map unique violations: a taken title is a conflict, a taken slug stays a
/// database error so [`is_slug_race`] can spot it.
fn map_insert_error(e: sqlx::Error) -> RepositoryError {
    if RepositoryError::is_unique_violation_on(&e, TITLE_CONSTRAINT) {
        return RepositoryError::Conflict(TITLE_TAKEN.to_owned());
    }
    RepositoryError::Database(e)
}

/// Whether an insert or update lost a race for its slug.
#[must_use]
pub fn is_slug_race(err: &RepositoryError) -> bool {
    matches!(err, RepositoryError::Database(e) if RepositoryError::is_unique_violation_on(e, SLUG_CONSTRAINT))
}

/// Fields written by an update. Every value is final; the caller merges the
/// patch with the current post first.
#[derive(Debug, Clone)]
pub struct PostWrite {
    pub title: String,
    pub slug: Slug,
    pub content: String,
    pub author: String,
    pub tags: Vec<String>,
    pub category: PostCategory,
    pub status: PostStatus,
    pub published_date: Option<DateTime<Utc>>,
}

/// Repository for post database operations.
pub struct PostRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PostRepository<'a> {
    /// Create a new post repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Slugs already used for `title`'s base, ignoring the post `except`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn taken_slugs(
        &self,
        title: &str,
        except: Option<PostId>,
    ) -> Result<HashSet<String>, RepositoryError> {
        let base = normalize_title(title);
        let slugs = sqlx::query_scalar::<_, String>(
            r"
            SELECT slug
            FROM posts
            WHERE (slug = $1 OR slug LIKE $1 || '-%')
              AND ($2::bigint IS NULL OR id <> $2)
            ",
        )
        .bind(&base)
        .bind(except)
        .fetch_all(self.pool)
        .await?;

        Ok(slugs.into_iter().collect())
    }

    /// Whether another post already uses `title`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn title_taken(
        &self,
        title: &str,
        except: Option<PostId>,
    ) -> Result<bool, RepositoryError> {
        let taken = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS (
                SELECT 1 FROM posts WHERE title = $1 AND ($2::bigint IS NULL OR id <> $2)
            )
            ",
        )
        .bind(title)
        .bind(except)
        .fetch_one(self.pool)
        .await?;
        Ok(taken)
    }

    /// Insert a post under `slug`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the title is taken, and a
    /// database error recognized by [`is_slug_race`] if the slug is.
    pub async fn insert(
        &self,
        post: &NewPost,
        slug: &Slug,
        published_date: Option<DateTime<Utc>>,
    ) -> Result<Post, RepositoryError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            r"
            INSERT INTO posts (title, slug, content, author, tags, category, status, published_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {COLUMNS}
            "
        ))
        .bind(&post.title)
        .bind(slug)
        .bind(&post.content)
        .bind(&post.author)
        .bind(&post.tags)
        .bind(post.category)
        .bind(post.status)
        .bind(published_date)
        .fetch_one(self.pool)
        .await
        .map_err(map_insert_error)?;

        row.try_into()
    }

    /// List posts matching a resolved query.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, query: &ListQuery) -> Result<(Vec<Post>, u64), RepositoryError> {
        let (rows, total) = fetch_list::<PostRow>(self.pool, &POSTS_TABLE, query).await?;
        let posts = rows
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((posts, total))
    }

    /// Get a post without touching its view count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: PostId) -> Result<Option<Post>, RepositoryError> {
        let row = sqlx::query_as::<_, PostRow>(&format!("SELECT {COLUMNS} FROM posts WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.map(Post::try_from).transpose()
    }

    /// Get a post and count the view in the same statement.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post does not exist.
    pub async fn view(&self, id: PostId) -> Result<Post, RepositoryError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "UPDATE posts SET views = views + 1 WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Overwrite a post's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post does not exist,
    /// `RepositoryError::Conflict` if the title is taken, and a database
    /// error recognized by [`is_slug_race`] if the slug is.
    pub async fn update(&self, id: PostId, post: &PostWrite) -> Result<Post, RepositoryError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            r"
            UPDATE posts
            SET title = $2, slug = $3, content = $4, author = $5, tags = $6,
                category = $7, status = $8, published_date = $9, updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "
        ))
        .bind(id)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.content)
        .bind(&post.author)
        .bind(&post.tags)
        .bind(post.category)
        .bind(post.status)
        .bind(post.published_date)
        .fetch_optional(self.pool)
        .await
        .map_err(map_insert_error)?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Soft delete: archive the post and clear its publish date.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post does not exist.
    pub async fn archive(&self, id: PostId) -> Result<Post, RepositoryError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            r"
            UPDATE posts
            SET status = 'archived', published_date = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Remove a post permanently.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post does not exist.
    pub async fn delete(&self, id: PostId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Counts by status and category, and the most viewed posts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any query fails.
    pub async fn analytics(&self) -> Result<PostAnalytics, RepositoryError> {
        let by_status = sqlx::query_as::<_, LabelCount>(
            r"
            SELECT status::text AS label, COUNT(*) AS count
            FROM posts
            GROUP BY status
            ORDER BY status
            ",
        )
        .fetch_all(self.pool);

        let top_viewed = sqlx::query_as::<_, TopPost>(
            r"
            SELECT id, title, slug, views
            FROM posts
            ORDER BY views DESC, id ASC
            LIMIT $1
            ",
        )
        .bind(TOP_VIEWED)
        .fetch_all(self.pool);

        let by_category = sqlx::query_as::<_, LabelCount>(
            r"
            SELECT category::text AS label, COUNT(*) AS count
            FROM posts
            GROUP BY category
            ORDER BY count DESC, category
            ",
        )
        .fetch_all(self.pool);

        let (by_status, top_viewed, by_category) =
            tokio::try_join!(by_status, top_viewed, by_category)?;

        Ok(PostAnalytics {
            by_status,
            top_viewed,
            by_category,
        })
    }
}
