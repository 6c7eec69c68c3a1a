//! Database operations for the Bazaar `PostgreSQL` store.
//!
//! ## Tables
//!
//! - `users` - Accounts (unique lower-cased email, soft-delete flag)
//! - `users_archive` - Copies of archived users
//! - `products` - Catalog with live stock and price
//! - `carts` / `cart_lines` - One cart per user, lines keyed by product
//! - `posts` - Blog posts (unique title and slug)
//! - `tasks` - Per-user tasks with JSONB subtasks
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p bazaar-cli -- migrate
//! ```
//!
//! Queries use the runtime `sqlx::query_as::<_, Row>` API; list filters are
//! rendered with `sqlx::QueryBuilder` in [`list`].

pub mod carts;
pub mod list;
pub mod posts;
pub mod products;
pub mod tasks;
pub mod users;

use std::future::Future;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;

pub use carts::CartRepository;
pub use posts::PostRepository;
pub use products::ProductRepository;
pub use tasks::TaskRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique violation to [`RepositoryError::Conflict`].
    pub(crate) fn unique(e: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(e)
    }

    /// Whether this is a unique violation on the named constraint.
    pub(crate) fn is_unique_violation_on(e: &sqlx::Error, constraint: &str) -> bool {
        matches!(
            e,
            sqlx::Error::Database(db_err)
                if db_err.is_unique_violation() && db_err.constraint() == Some(constraint)
        )
    }
}

/// A transaction on the shared pool.
pub type Tx = Transaction<'static, Postgres>;

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Run `body` inside a transaction.
///
/// The body receives the transaction by value and hands it back with its
/// result. `Ok` commits, `Err` rolls back. If the future is dropped midway
/// the transaction is dropped with it and `PostgreSQL` rolls it back.
///
/// ```rust,ignore
/// let user = with_transaction(pool, |mut tx| async move {
///     let result = insert_user(&mut tx, &new).await;
///     (tx, result)
/// })
/// .await?;
/// ```
///
/// # Errors
///
/// Returns the body's error, or a database error from `BEGIN`/`COMMIT`.
pub async fn with_transaction<T, E, F, Fut>(pool: &PgPool, body: F) -> Result<T, E>
where
    F: FnOnce(Tx) -> Fut,
    Fut: Future<Output = (Tx, Result<T, E>)>,
    E: From<sqlx::Error>,
{
    let tx = pool.begin().await?;
    let (tx, result) = body(tx).await;
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "transaction rollback failed");
            }
            Err(e)
        }
    }
}

/// Convert a non-negative database integer to `u64`.
pub(crate) fn to_u64(value: i64, what: &str) -> Result<u64, RepositoryError> {
    u64::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {what}: {value}")))
}

/// Convert a database integer to `u32`.
pub(crate) fn to_u32(value: i32, what: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {what}: {value}")))
}
