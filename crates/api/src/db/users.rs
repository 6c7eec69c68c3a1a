//! User repository for database operations.

use bazaar_core::query::{FilterSet, ListQuery, schema};
use bazaar_core::{Email, UserId, UserRole};
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};

use super::list::{Table, fetch_list, push_filters};
use super::{RepositoryError, to_u64, with_transaction};
use crate::models::user::{BulkUpdated, NewUser, User, UserPatch, UserUpsert};

const EMAIL_TAKEN: &str = "email already exists";

/// Listing metadata for `users`.
pub static USERS_TABLE: Table = Table {
    name: "users",
    columns: "id, name, email, age, role, deleted, created_at, updated_at",
    schema: &schema::USERS,
};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for `PostgreSQL` user queries.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    id: i64,
    name: String,
    email: String,
    age: Option<i32>,
    role: UserRole,
    deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            name: row.name,
            email,
            age: row.age,
            role: row.role,
            deleted: row.deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// An upserted user and whether the row was newly inserted.
#[derive(Debug, sqlx::FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    user: UserRow,
    inserted: bool,
}

const AGE_RANGE: &str = "age must stay between 0 and 120";

/// SQLSTATE for an integer result out of range.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// Message for a violated `users` CHECK constraint.
fn check_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_name_check") => "name must be 1 to 100 characters",
        Some("users_age_check") => AGE_RANGE,
        _ => "user violates a field rule",
    }
}

/// Map CHECK violations, integer overflow on `age` and a taken email to
/// [`RepositoryError::Conflict`].
fn map_write_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_check_violation() {
            return RepositoryError::Conflict(check_message(db_err.constraint()).to_owned());
        }
        if db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE) {
            return RepositoryError::Conflict(AGE_RANGE.to_owned());
        }
    }
    RepositoryError::unique(e, EMAIL_TAKEN)
}

async fn insert<'e>(executor: impl PgExecutor<'e>, user: &NewUser) -> Result<User, RepositoryError> {
    let row = sqlx::query_as::<_, UserRow>(
        r"
        INSERT INTO users (name, email, age, role)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, email, age, role, deleted, created_at, updated_at
        ",
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(user.age)
    .bind(user.role)
    .fetch_one(executor)
    .await
    .map_err(map_write_error)?;

    row.try_into()
}

/// One statement that counts the users `filters` select and updates those
/// whose values differ from `patch`.
fn update_matching_query(filters: &FilterSet, patch: &UserPatch) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("WITH matched AS (SELECT id FROM users WHERE TRUE");
    push_filters(&mut qb, filters, &schema::USERS);
    qb.push("), changed AS (UPDATE users SET updated_at = NOW()");
    if let Some(name) = &patch.name {
        qb.push(", name = ").push_bind(name.clone());
    }
    if let Some(email) = &patch.email {
        qb.push(", email = ").push_bind(email.as_str().to_owned());
    }
    if let Some(age) = patch.age {
        qb.push(", age = ").push_bind(age);
    }
    if let Some(role) = patch.role {
        qb.push(", role = ").push_bind(role);
    }
    qb.push(" FROM matched WHERE users.id = matched.id AND (FALSE");
    if let Some(name) = &patch.name {
        qb.push(" OR users.name IS DISTINCT FROM ").push_bind(name.clone());
    }
    if let Some(email) = &patch.email {
        qb.push(" OR users.email IS DISTINCT FROM ")
            .push_bind(email.as_str().to_owned());
    }
    if let Some(age) = patch.age {
        qb.push(" OR users.age IS DISTINCT FROM ").push_bind(age);
    }
    if let Some(role) = patch.role {
        qb.push(" OR users.role IS DISTINCT FROM ").push_bind(role);
    }
    qb.push(
        ") RETURNING users.id) \
         SELECT (SELECT COUNT(*) FROM matched), (SELECT COUNT(*) FROM changed)",
    );
    qb
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, user: &NewUser) -> Result<User, RepositoryError> {
        insert(self.pool, user).await
    }

    /// Create every user or none of them.
    ///
    /// # Errors
    ///
    /// Returns the first insert error; nothing is written in that case.
    pub async fn create_all(&self, users: &[NewUser]) -> Result<Vec<User>, RepositoryError> {
        let users = users.to_vec();
        with_transaction(self.pool, |mut tx| async move {
            let mut created = Vec::with_capacity(users.len());
            for user in &users {
                match insert(&mut *tx, user).await {
                    Ok(row) => created.push(row),
                    Err(e) => return (tx, Err(e)),
                }
            }
            (tx, Ok(created))
        })
        .await
    }

    /// List users matching a resolved query.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, query: &ListQuery) -> Result<(Vec<User>, u64), RepositoryError> {
        let (rows, total) = fetch_list::<UserRow>(self.pool, &USERS_TABLE, query).await?;
        let users = rows
            .into_iter()
            .map(User::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((users, total))
    }

    /// Get a user by ID, including soft-deleted users.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, name, email, age, role, deleted, created_at, updated_at
            FROM users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Conflict` if the new email is taken.
    pub async fn update(&self, id: UserId, patch: &UserPatch) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                age = COALESCE($4, age),
                role = COALESCE($5, role),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, age, role, deleted, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(patch.name.as_deref())
        .bind(patch.email.as_ref())
        .bind(patch.age)
        .bind(patch.role)
        .fetch_optional(self.pool)
        .await
        .map_err(map_write_error)?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Apply `patch` to every user `filters` selects, in one statement.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a new value breaks a field rule
    /// or the email uniqueness constraint; nothing is written in that case.
    pub async fn update_matching(
        &self,
        filters: &FilterSet,
        patch: &UserPatch,
    ) -> Result<BulkUpdated, RepositoryError> {
        let (matched, modified) = update_matching_query(filters, patch)
            .build_query_as::<(i64, i64)>()
            .fetch_one(self.pool)
            .await
            .map_err(map_write_error)?;

        Ok(BulkUpdated {
            matched_count: to_u64(matched, "matched count")?,
            modified_count: to_u64(modified, "modified count")?,
        })
    }

    /// Permanently remove every user `filters` selects. Returns the count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the statement fails.
    pub async fn delete_matching(&self, filters: &FilterSet) -> Result<u64, RepositoryError> {
        let mut qb = QueryBuilder::new("DELETE FROM users WHERE TRUE");
        push_filters(&mut qb, filters, &schema::USERS);
        let result = qb.build().execute(self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Insert a user by email, or update the fields `upsert` sets on the user
    /// already holding that email. Returns the user and whether it is new.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a new user has no name or a
    /// value breaks a field rule.
    pub async fn upsert_by_email(&self, upsert: &UserUpsert) -> Result<(User, bool), RepositoryError> {
        // A missing name inserts '' so the name CHECK rejects it.
        let row = sqlx::query_as::<_, UpsertRow>(
            r"
            INSERT INTO users (name, email, age, role)
            VALUES (COALESCE($1, ''), $2, $3, COALESCE($4, 'user'::user_role))
            ON CONFLICT (email) DO UPDATE
            SET name = COALESCE($1, users.name),
                age = COALESCE($3, users.age),
                role = COALESCE($4, users.role),
                updated_at = NOW()
            RETURNING id, name, email, age, role, deleted, created_at, updated_at,
                      (xmax = 0) AS inserted
            ",
        )
        .bind(upsert.name.as_deref())
        .bind(&upsert.email)
        .bind(upsert.age)
        .bind(upsert.role)
        .fetch_one(self.pool)
        .await
        .map_err(map_write_error)?;

        Ok((row.user.try_into()?, row.inserted))
    }

    /// Atomically add `by` to the user's age (a missing age counts as 0).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Conflict` if the result leaves 0..=120.
    pub async fn increment_age(&self, id: UserId, by: i32) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            UPDATE users
            SET age = COALESCE(age, 0) + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, age, role, deleted, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(by)
        .fetch_optional(self.pool)
        .await
        .map_err(map_write_error)?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Flag a user as deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn soft_delete(&self, id: UserId) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            UPDATE users
            SET deleted = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, age, role, deleted, created_at, updated_at
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Remove a user permanently. Their cart goes with them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Copy visible users older than `age` into `users_archive` and
    /// soft-delete them, in one transaction. Returns how many were archived.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if either statement fails.
    pub async fn archive_older_than(&self, age: i32) -> Result<u64, RepositoryError> {
        with_transaction(self.pool, |mut tx| async move {
            let copied = sqlx::query(
                r"
                INSERT INTO users_archive (id, name, email, age, role, created_at, updated_at)
                SELECT id, name, email, age, role, created_at, updated_at
                FROM users
                WHERE age > $1 AND NOT deleted
                ON CONFLICT (id) DO UPDATE
                SET name = EXCLUDED.name, email = EXCLUDED.email, age = EXCLUDED.age,
                    role = EXCLUDED.role, updated_at = EXCLUDED.updated_at, archived_at = NOW()
                ",
            )
            .bind(age)
            .execute(&mut *tx)
            .await;
            if let Err(e) = copied {
                return (tx, Err(RepositoryError::Database(e)));
            }

            let flagged = sqlx::query(
                "UPDATE users SET deleted = TRUE, updated_at = NOW() WHERE age > $1 AND NOT deleted",
            )
            .bind(age)
            .execute(&mut *tx)
            .await;

            let result = flagged
                .map(|r| r.rows_affected())
                .map_err(RepositoryError::from);
            (tx, result)
        })
        .await
    }

    /// Whether a user exists and is not soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn is_active(&self, id: UserId) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 AND NOT deleted)",
        )
        .bind(id)
        .fetch_one(self.pool)
        .await?;
        Ok(exists)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::query::{RawParams, build_filter};

    use super::*;

    #[test]
    fn test_check_message_names_the_constraint() {
        assert_eq!(
            check_message(Some("users_name_check")),
            "name must be 1 to 100 characters"
        );
        assert_eq!(check_message(Some("users_age_check")), AGE_RANGE);
        assert_eq!(check_message(Some("other")), "user violates a field rule");
        assert_eq!(check_message(None), "user violates a field rule");
    }

    #[test]
    fn test_update_matching_only_touches_changed_rows() {
        let raw = RawParams::from([("role".to_owned(), "guest".to_owned())]);
        let filters = build_filter(&raw, &schema::USERS).unwrap();
        let patch = UserPatch {
            age: Some(40),
            role: Some(UserRole::User),
            ..UserPatch::default()
        };
        let qb = update_matching_query(&filters, &patch);
        let sql = qb.sql();
        assert!(sql.starts_with("WITH matched AS (SELECT id FROM users WHERE TRUE AND "));
        assert!(sql.contains("SET updated_at = NOW(), age = $"));
        assert!(sql.contains("(FALSE OR users.age IS DISTINCT FROM $"));
        assert!(sql.contains(" OR users.role IS DISTINCT FROM $"));
        assert!(!sql.contains("name ="));
        assert!(sql.ends_with("(SELECT COUNT(*) FROM changed)"));
    }
}
