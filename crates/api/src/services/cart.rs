//! Cart service.
//!
//! Every mutation runs in one transaction: the cart row is created if needed
//! and locked `FOR UPDATE`, the referenced products are locked `FOR SHARE`,
//! the change is applied in memory by `bazaar_core::cart`, and the lines are
//! rewritten before commit. Concurrent mutations of one cart serialize on the
//! cart row.

use std::collections::BTreeSet;

use bazaar_core::cart::{Adjustment, Cart, CartError, CartPolicy, LineRequest, merge_cart};
use bazaar_core::{ProductId, UserId};
use chrono::Utc;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use crate::db::carts::CartRepository;
use crate::db::products::lock_stock;
use crate::db::{UserRepository, with_transaction};
use crate::error::{AppError, Result, add_breadcrumb};

/// A cart after a mutation, with any quantities lowered to stock.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartUpdate {
    pub cart: Cart,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<Adjustment>,
}

/// Cart operations for one request.
pub struct CartService<'a> {
    pool: &'a PgPool,
    policy: &'a CartPolicy,
}

impl<'a> CartService<'a> {
    /// Create a new cart service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, policy: &'a CartPolicy) -> Self {
        Self { pool, policy }
    }

    /// Add a batch of lines. Any conflict aborts the whole batch before
    /// anything is written.
    ///
    /// # Errors
    ///
    /// - `CartError::EmptyBatch` / `CartError::InvalidQuantity` before any read
    /// - `AppError::NotFound` if the user does not exist
    /// - `AppError::StockConflicts` listing every unsatisfiable line
    #[instrument(skip(self, items), fields(user_id = %user_id, items = items.len()))]
    pub async fn add(&self, user_id: UserId, items: &[LineRequest]) -> Result<CartUpdate> {
        if items.is_empty() {
            return Err(CartError::EmptyBatch.into());
        }
        if let Some(bad) = items.iter().find(|r| r.quantity == 0) {
            return Err(CartError::InvalidQuantity {
                product_id: bad.product_id,
            }
            .into());
        }
        if !UserRepository::new(self.pool).is_active(user_id).await? {
            return Err(AppError::NotFound(format!("user {user_id}")));
        }

        let policy = self.policy;
        let update = with_transaction(self.pool, |mut tx| async move {
            let result = add_locked(&mut tx, user_id, items, policy).await;
            (tx, result)
        })
        .await?;

        add_breadcrumb(
            "cart",
            "Added items",
            Some(&[("user_id", &user_id.to_string())]),
        );
        tracing::info!(
            lines = update.cart.lines().len(),
            total = %update.cart.total_amount(),
            adjusted = update.adjustments.len(),
            "cart updated"
        );
        Ok(update)
    }

    /// Read a cart. A cart that was never created reads as empty.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if a query fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get(&self, user_id: UserId) -> Result<Cart> {
        let cart = CartRepository::new(self.pool)
            .get(user_id, self.policy)
            .await?;
        Ok(cart.unwrap_or_else(|| Cart::empty(user_id)))
    }

    /// Set the quantity of a line already in the cart.
    ///
    /// # Errors
    ///
    /// - `CartError::InvalidQuantity` for zero
    /// - `AppError::NotFound` if the user has no cart
    /// - `CartError::ProductNotFound` / `CartError::LineNotFound`
    /// - `CartError::Stock` when out of stock, or above stock under `reject`
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartUpdate> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { product_id }.into());
        }

        let policy = self.policy;
        with_transaction(self.pool, |mut tx| async move {
            let result = update_locked(&mut tx, user_id, product_id, quantity, policy).await;
            (tx, result)
        })
        .await
    }

    /// Remove one line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the user has no cart and
    /// `CartError::LineNotFound` if the line is missing.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn remove(&self, user_id: UserId, product_id: ProductId) -> Result<Cart> {
        let policy = self.policy;
        with_transaction(self.pool, |mut tx| async move {
            let result = remove_locked(&mut tx, user_id, product_id, policy).await;
            (tx, result)
        })
        .await
    }

    /// Empty the cart. Clearing a cart that was never created is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if a statement fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn clear(&self, user_id: UserId) -> Result<Cart> {
        let policy = self.policy;
        with_transaction(self.pool, |mut tx| async move {
            let result = clear_locked(&mut tx, user_id, policy).await;
            (tx, result)
        })
        .await
    }
}

/// Distinct product ids in ascending order, so row locks are always taken
/// in the same order.
fn lock_order(items: &[LineRequest]) -> Vec<ProductId> {
    items
        .iter()
        .map(|r| r.product_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

async fn add_locked(
    conn: &mut PgConnection,
    user_id: UserId,
    items: &[LineRequest],
    policy: &CartPolicy,
) -> Result<CartUpdate> {
    let (cart_id, cart) = CartRepository::lock_or_create(conn, user_id, policy).await?;
    let stock = lock_stock(conn, &lock_order(items)).await?;

    let outcome = merge_cart(cart, items, &stock, policy, Utc::now())?;
    if outcome.has_conflicts() {
        tracing::warn!(conflicts = outcome.conflicts.len(), "cart batch rejected");
        return Err(AppError::StockConflicts(outcome.conflicts));
    }

    CartRepository::save(conn, cart_id, &outcome.cart).await?;
    Ok(CartUpdate {
        cart: outcome.cart,
        adjustments: outcome.adjustments,
    })
}

async fn update_locked(
    conn: &mut PgConnection,
    user_id: UserId,
    product_id: ProductId,
    quantity: u32,
    policy: &CartPolicy,
) -> Result<CartUpdate> {
    let (cart_id, mut cart) = CartRepository::lock(conn, user_id, policy)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("cart for user {user_id}")))?;
    let stock = lock_stock(conn, &[product_id]).await?;

    let adjustment = cart.set_quantity(product_id, quantity, stock.get(&product_id), policy)?;
    CartRepository::save(conn, cart_id, &cart).await?;
    Ok(CartUpdate {
        cart,
        adjustments: adjustment.into_iter().collect(),
    })
}

async fn remove_locked(
    conn: &mut PgConnection,
    user_id: UserId,
    product_id: ProductId,
    policy: &CartPolicy,
) -> Result<Cart> {
    let (cart_id, mut cart) = CartRepository::lock(conn, user_id, policy)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("cart for user {user_id}")))?;
    if !cart.remove_line(product_id, policy) {
        return Err(CartError::LineNotFound(product_id).into());
    }
    CartRepository::save(conn, cart_id, &cart).await?;
    Ok(cart)
}

async fn clear_locked(conn: &mut PgConnection, user_id: UserId, policy: &CartPolicy) -> Result<Cart> {
    let Some((cart_id, mut cart)) = CartRepository::lock(conn, user_id, policy).await? else {
        return Ok(Cart::empty(user_id));
    };
    cart.clear(policy);
    CartRepository::save(conn, cart_id, &cart).await?;
    Ok(cart)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_order_is_sorted_and_distinct() {
        let items = [
            LineRequest {
                product_id: ProductId::new(7),
                quantity: 1,
            },
            LineRequest {
                product_id: ProductId::new(2),
                quantity: 3,
            },
            LineRequest {
                product_id: ProductId::new(7),
                quantity: 2,
            },
        ];
        assert_eq!(lock_order(&items), vec![ProductId::new(2), ProductId::new(7)]);
    }
}
