//! Cart repository.
//!
//! Reads go through the pool. Mutations take a connection from an open
//! transaction so the cart row lock, the stock snapshot and the rewritten
//! lines commit together.

use bazaar_core::cart::{Cart, CartLine, CartPolicy};
use bazaar_core::{CartId, Price, ProductId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use super::{RepositoryError, to_u32};

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    product_id: i64,
    quantity: i32,
    unit_price: Decimal,
    added_at: DateTime<Utc>,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: ProductId::new(row.product_id),
            quantity: to_u32(row.quantity, "quantity")?,
            unit_price: Price::new(row.unit_price)
                .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?,
            added_at: row.added_at,
        })
    }
}

async fn load_lines(conn: &mut PgConnection, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError> {
    let rows = sqlx::query_as::<_, CartLineRow>(
        r"
        SELECT product_id, quantity, unit_price, added_at
        FROM cart_lines
        WHERE cart_id = $1
        ORDER BY position, product_id
        ",
    )
    .bind(cart_id)
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(CartLine::try_from).collect()
}

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Read a user's cart without locking. `None` if it was never created.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get(
        &self,
        user_id: UserId,
        policy: &CartPolicy,
    ) -> Result<Option<Cart>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let cart_id = sqlx::query_scalar::<_, CartId>("SELECT id FROM carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
        let Some(cart_id) = cart_id else {
            return Ok(None);
        };
        let lines = load_lines(&mut conn, cart_id).await?;
        Ok(Some(Cart::from_lines(user_id, lines, policy)))
    }

    /// Create the user's cart if missing, lock it, and load its lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn lock_or_create(
        conn: &mut PgConnection,
        user_id: UserId,
        policy: &CartPolicy,
    ) -> Result<(CartId, Cart), RepositoryError> {
        sqlx::query("INSERT INTO carts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Self::lock(conn, user_id, policy)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Lock an existing cart `FOR UPDATE` and load its lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn lock(
        conn: &mut PgConnection,
        user_id: UserId,
        policy: &CartPolicy,
    ) -> Result<Option<(CartId, Cart)>, RepositoryError> {
        let cart_id = sqlx::query_scalar::<_, CartId>(
            "SELECT id FROM carts WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
        let Some(cart_id) = cart_id else {
            return Ok(None);
        };
        let lines = load_lines(conn, cart_id).await?;
        Ok(Some((cart_id, Cart::from_lines(user_id, lines, policy))))
    }

    /// Replace the stored lines and total with `cart`'s.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn save(
        conn: &mut PgConnection,
        cart_id: CartId,
        cart: &Cart,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *conn)
            .await?;

        if !cart.is_empty() {
            let lines = cart.lines();
            let product_ids: Vec<i64> = lines.iter().map(|l| l.product_id.as_i64()).collect();
            let quantities: Vec<i32> = lines
                .iter()
                .map(|l| i32::try_from(l.quantity).unwrap_or(i32::MAX))
                .collect();
            let prices: Vec<Decimal> = lines.iter().map(|l| l.unit_price.amount()).collect();
            let added: Vec<DateTime<Utc>> = lines.iter().map(|l| l.added_at).collect();
            let positions: Vec<i32> = (0..lines.len())
                .map(|i| i32::try_from(i).unwrap_or(i32::MAX))
                .collect();

            sqlx::query(
                r"
                INSERT INTO cart_lines (cart_id, product_id, quantity, unit_price, added_at, position)
                SELECT $1, line.*
                FROM UNNEST($2::bigint[], $3::int[], $4::numeric[], $5::timestamptz[], $6::int[])
                    AS line(product_id, quantity, unit_price, added_at, position)
                ",
            )
            .bind(cart_id)
            .bind(product_ids)
            .bind(quantities)
            .bind(prices)
            .bind(added)
            .bind(positions)
            .execute(&mut *conn)
            .await?;
        }

        sqlx::query("UPDATE carts SET total_amount = $2, updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .bind(cart.total_amount())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
