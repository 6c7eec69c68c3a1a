//! Seed the database from a YAML file.
//!
//! The file has four optional sections. Users, posts and tasks go through the
//! same validation as the API; tasks name their owner by email.
//!
//! ```yaml
//! users:
//!   - { name: Ada Lovelace, email: ada@example.com, age: 36, role: admin }
//! products:
//!   - { name: Desk Lamp, price: "39.90", category: Home, stock: 12 }
//! posts:
//!   - { title: Hello, content: "...", author: Ada, category: Technology }
//! tasks:
//!   - { userEmail: ada@example.com, title: Read chapter 3, dueInDays: 7 }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use bazaar_api::db::{TaskRepository, UserRepository};
use bazaar_api::error::AppError;
use bazaar_api::models::task::{NewTaskInput, SubtaskInput};
use bazaar_api::models::{NewPostInput, NewUserInput};
use bazaar_api::services::PostService;
use bazaar_core::{Price, UserId};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;

use super::{CommandError, connect};

/// Contents of a seed file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedFile {
    #[serde(default)]
    pub users: Vec<NewUserInput>,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
    #[serde(default)]
    pub posts: Vec<NewPostInput>,
    #[serde(default)]
    pub tasks: Vec<TaskSeed>,
}

/// A product row. Products have no create endpoint, so this is the only way
/// they are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSeed {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub category: String,
    pub subcategory: Option<String>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub rating_average: Decimal,
    #[serde(default)]
    pub rating_count: u32,
    #[serde(default = "active")]
    pub is_active: bool,
}

const fn active() -> bool {
    true
}

/// A task whose owner is looked up by email among the seeded users.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSeed {
    pub user_email: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    /// Days from now until the task is due.
    pub due_in_days: i64,
    pub estimated_time: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<SubtaskInput>,
}

impl TaskSeed {
    fn into_input(self, user_id: UserId) -> NewTaskInput {
        NewTaskInput {
            user_id,
            title: self.title,
            description: self.description,
            category: self.category,
            priority: self.priority,
            status: self.status,
            due_date: Utc::now() + Duration::days(self.due_in_days),
            estimated_time: self.estimated_time,
            tags: self.tags,
            subtasks: self.subtasks,
        }
    }
}

/// Rows written by one seed run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub products: usize,
    pub posts: usize,
    pub tasks: usize,
}

impl SeedFile {
    /// Parse a seed file.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Yaml` if the YAML does not match the layout.
    pub fn parse(content: &str) -> Result<Self, CommandError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Checks that need the whole file: unique user emails, sane product
    /// numbers and task owners that exist in the file.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidSeed` naming the first bad record.
    pub fn check(&self) -> Result<(), CommandError> {
        let mut emails = HashSet::new();
        for user in &self.users {
            if !emails.insert(user.email.trim().to_lowercase()) {
                return Err(CommandError::InvalidSeed(format!(
                    "duplicate user email {}",
                    user.email
                )));
            }
        }

        for product in &self.products {
            let prices = std::iter::once(product.price).chain(product.original_price);
            for price in prices {
                Price::new(price).map_err(|e| {
                    CommandError::InvalidSeed(format!("product {}: {e}", product.name))
                })?;
            }
            if product.rating_average < Decimal::ZERO || product.rating_average > Decimal::from(5) {
                return Err(CommandError::InvalidSeed(format!(
                    "product {}: rating must be between 0 and 5",
                    product.name
                )));
            }
        }

        for task in &self.tasks {
            if !emails.contains(&task.user_email.trim().to_lowercase()) {
                return Err(CommandError::InvalidSeed(format!(
                    "task {:?} belongs to unknown user {}",
                    task.title, task.user_email
                )));
            }
        }
        Ok(())
    }
}

/// Load `file` into the database, optionally truncating first.
///
/// The file is parsed and checked before anything is written.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid, a record breaks a
/// validation rule, or a statement fails.
pub async fn run(file: &Path, reset: bool) -> Result<SeedSummary, CommandError> {
    let content = tokio::fs::read_to_string(file)
        .await
        .map_err(|source| CommandError::Io {
            path: file.display().to_string(),
            source,
        })?;
    let seed = SeedFile::parse(&content)?;
    seed.check()?;
    tracing::info!(
        path = %file.display(),
        users = seed.users.len(),
        products = seed.products.len(),
        posts = seed.posts.len(),
        tasks = seed.tasks.len(),
        "Parsed seed file"
    );

    let pool = connect().await?;
    if reset {
        truncate(&pool).await?;
    }
    load(&pool, seed).await
}

async fn truncate(pool: &PgPool) -> Result<(), CommandError> {
    tracing::warn!("Truncating all tables");
    sqlx::query(
        "TRUNCATE cart_lines, carts, tasks, posts, products, users_archive, users \
         RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn load(pool: &PgPool, seed: SeedFile) -> Result<SeedSummary, CommandError> {
    let mut summary = SeedSummary::default();

    let users = UserRepository::new(pool);
    let mut owners: HashMap<String, UserId> = HashMap::new();
    for input in seed.users {
        let user = input.validate().map_err(AppError::from)?;
        let created = users.create(&user).await?;
        owners.insert(created.email.as_str().to_owned(), created.id);
        summary.users += 1;
    }

    for product in &seed.products {
        insert_product(pool, product).await?;
        summary.products += 1;
    }

    let posts = PostService::new(pool);
    for input in seed.posts {
        let post = input.validate().map_err(AppError::from)?;
        posts.create(&post).await?;
        summary.posts += 1;
    }

    let tasks = TaskRepository::new(pool);
    let now = Utc::now();
    for task in seed.tasks {
        let email = task.user_email.trim().to_lowercase();
        let user_id = *owners.get(&email).ok_or_else(|| {
            CommandError::InvalidSeed(format!("unknown user {}", task.user_email))
        })?;
        let new_task = task
            .into_input(user_id)
            .validate(now)
            .map_err(AppError::from)?;
        tasks.create(&new_task).await?;
        summary.tasks += 1;
    }

    Ok(summary)
}

async fn insert_product(pool: &PgPool, product: &ProductSeed) -> Result<(), CommandError> {
    let stock = i32::try_from(product.stock)
        .map_err(|_| CommandError::InvalidSeed(format!("product {}: stock too large", product.name)))?;
    let rating_count = i32::try_from(product.rating_count).map_err(|_| {
        CommandError::InvalidSeed(format!("product {}: rating count too large", product.name))
    })?;

    sqlx::query(
        r"
        INSERT INTO products (name, description, price, original_price, category, subcategory,
                              stock, rating_average, rating_count, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ",
    )
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.price)
    .bind(product.original_price)
    .bind(&product.category)
    .bind(product.subcategory.as_deref())
    .bind(stock)
    .bind(product.rating_average)
    .bind(rating_count)
    .bind(product.is_active)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = include_str!("../../seed/sample.yaml");

    #[test]
    fn test_sample_seed_is_valid() {
        let seed = SeedFile::parse(SAMPLE).unwrap();
        assert!(!seed.users.is_empty());
        assert!(!seed.products.is_empty());
        assert!(!seed.posts.is_empty());
        assert!(!seed.tasks.is_empty());
        seed.check().unwrap();
    }

    #[test]
    fn test_sample_records_pass_api_validation() {
        let seed = SeedFile::parse(SAMPLE).unwrap();
        for user in seed.users {
            user.validate().unwrap();
        }
        for post in seed.posts {
            post.validate().unwrap();
        }
        let now = Utc::now();
        for task in seed.tasks {
            task.into_input(UserId::new(1)).validate(now).unwrap();
        }
    }

    #[test]
    fn test_task_owner_must_be_seeded() {
        let seed = SeedFile::parse(
            r"
users:
  - { name: Ada, email: ada@example.com }
tasks:
  - { userEmail: grace@example.com, title: Orphan, dueInDays: 3 }
",
        )
        .unwrap();
        assert!(matches!(seed.check(), Err(CommandError::InvalidSeed(_))));
    }

    #[test]
    fn test_owner_email_match_ignores_case() {
        let seed = SeedFile::parse(
            r"
users:
  - { name: Ada, email: Ada@Example.com }
tasks:
  - { userEmail: ada@example.com, title: Mine, dueInDays: 3 }
",
        )
        .unwrap();
        seed.check().unwrap();
    }

    #[test]
    fn test_duplicate_emails_rejected() {
        let seed = SeedFile::parse(
            r"
users:
  - { name: Ada, email: ada@example.com }
  - { name: Ada Again, email: ADA@example.com }
",
        )
        .unwrap();
        assert!(seed.check().is_err());
    }

    #[test]
    fn test_negative_price_rejected() {
        let seed = SeedFile::parse(
            r#"
products:
  - { name: Broken, price: "-1.00", category: Home }
"#,
        )
        .unwrap();
        assert!(seed.check().is_err());
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(SeedFile::parse("orders: []").is_err());
    }
}
