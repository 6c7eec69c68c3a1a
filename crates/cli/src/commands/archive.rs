//! User archiving command.

use bazaar_api::db::UserRepository;

use super::{CommandError, connect};

/// Archive and soft-delete users older than `older_than`.
///
/// # Errors
///
/// Returns an error if the connection or either statement fails. Nothing is
/// archived in that case.
pub async fn run(older_than: i32) -> Result<u64, CommandError> {
    let pool = connect().await?;

    tracing::info!(older_than, "Archiving users");
    let archived = UserRepository::new(&pool)
        .archive_older_than(older_than)
        .await?;

    tracing::info!(archived, "Users archived");
    Ok(archived)
}
