//! Cart merge engine.
//!
//! A [`Cart`] is an owned aggregate: its lines and its total only change
//! through the methods here, and every mutation recomputes the total from the
//! current lines. Storage loads the cart and a [`StockSnapshot`] inside one
//! transaction, calls into this module, and writes the result back.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Price, ProductId, UserId};

/// What to do when a requested quantity exceeds available stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockPolicy {
    /// Lower the quantity to the available stock.
    #[default]
    Clamp,
    /// Refuse with a stock conflict.
    Reject,
}

impl FromStr for StockPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clamp" => Ok(Self::Clamp),
            "reject" => Ok(Self::Reject),
            other => Err(format!("expected clamp or reject, got {other:?}")),
        }
    }
}

/// Pricing and stock rules applied to every cart mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartPolicy {
    /// Fraction added on top of the subtotal (0.08 = 8%).
    pub tax_rate: Decimal,
    /// Flat amount subtracted after tax.
    pub discount: Decimal,
    pub stock: StockPolicy,
}

impl Default for CartPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(8, 2),
            discount: Decimal::ZERO,
            stock: StockPolicy::Clamp,
        }
    }
}

/// Breakdown of a cart total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    #[serde(with = "rust_decimal::serde::str")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub tax: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub discount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
}

/// `Σ(quantity × price) × (1 + tax) − discount`, floored at zero. Tax is
/// rounded to cents.
#[must_use]
pub fn calculate_totals(lines: &[CartLine], policy: &CartPolicy) -> CartTotals {
    let subtotal: Decimal = lines.iter().map(CartLine::line_total).sum();
    let tax = (subtotal * policy.tax_rate).round_dp(2);
    let total = (subtotal + tax - policy.discount).max(Decimal::ZERO);
    CartTotals {
        subtotal,
        tax,
        discount: policy.discount,
        total,
    }
}

/// One product in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Price at the time the line was last touched.
    pub unit_price: Price,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price.times(self.quantity)
    }
}

/// A user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    user_id: UserId,
    lines: Vec<CartLine>,
    #[serde(with = "rust_decimal::serde::str")]
    total_amount: Decimal,
}

impl Cart {
    /// An empty cart. Reading a cart that was never created yields this.
    #[must_use]
    pub const fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            lines: Vec::new(),
            total_amount: Decimal::ZERO,
        }
    }

    /// Rebuild a cart from stored lines. Lines sharing a product are merged
    /// and the total is recomputed.
    #[must_use]
    pub fn from_lines(user_id: UserId, stored: Vec<CartLine>, policy: &CartPolicy) -> Self {
        let mut cart = Self::empty(user_id);
        for line in stored {
            match cart.line_mut(line.product_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(line.quantity);
                }
                None => cart.lines.push(line),
            }
        }
        cart.recompute(policy);
        cart
    }

    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub const fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    #[must_use]
    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    fn line_mut(&mut self, product_id: ProductId) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|l| l.product_id == product_id)
    }

    #[must_use]
    pub fn totals(&self, policy: &CartPolicy) -> CartTotals {
        calculate_totals(&self.lines, policy)
    }

    fn recompute(&mut self, policy: &CartPolicy) {
        self.total_amount = calculate_totals(&self.lines, policy).total;
    }

    /// Set the quantity of an existing line.
    ///
    /// The unit price is re-snapshotted; `added_at` is left alone.
    ///
    /// # Errors
    ///
    /// - [`CartError::InvalidQuantity`] for zero
    /// - [`CartError::ProductNotFound`] when the product is missing or inactive
    /// - [`CartError::Stock`] when the product is out of stock, or the
    ///   quantity exceeds stock under [`StockPolicy::Reject`]
    /// - [`CartError::LineNotFound`] when the cart has no such line
    pub fn set_quantity(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        level: Option<&StockLevel>,
        policy: &CartPolicy,
    ) -> Result<Option<Adjustment>, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { product_id });
        }
        let level = level
            .filter(|l| l.active)
            .ok_or(CartError::ProductNotFound(product_id))?;
        if level.stock == 0 {
            return Err(CartError::Stock(StockConflict::out_of_stock(
                product_id, quantity,
            )));
        }

        let (granted, adjustment) = grant(product_id, quantity, level, policy.stock)?;
        let line = self
            .line_mut(product_id)
            .ok_or(CartError::LineNotFound(product_id))?;
        line.quantity = granted;
        line.unit_price = level.price;
        self.recompute(policy);
        Ok(adjustment)
    }

    /// Remove a line. Returns `false` when the cart had no such line.
    pub fn remove_line(&mut self, product_id: ProductId, policy: &CartPolicy) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        let removed = self.lines.len() != before;
        if removed {
            self.recompute(policy);
        }
        removed
    }

    /// Drop every line.
    pub fn clear(&mut self, policy: &CartPolicy) {
        self.lines.clear();
        self.recompute(policy);
    }
}

/// Live price and stock for one product, read in the same transaction as the
/// cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLevel {
    pub price: Price,
    pub stock: u32,
    pub active: bool,
}

/// Stock levels keyed by product.
pub type StockSnapshot = BTreeMap<ProductId, StockLevel>;

/// One requested line in an add-to-cart batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictReason {
    ProductNotFound,
    OutOfStock,
    InsufficientStock,
}

/// A requested line that could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockConflict {
    pub product_id: ProductId,
    pub reason: ConflictReason,
    /// Units in stock; absent when the product does not exist.
    pub available: Option<u32>,
    pub requested: u32,
}

impl StockConflict {
    const fn not_found(product_id: ProductId, requested: u32) -> Self {
        Self {
            product_id,
            reason: ConflictReason::ProductNotFound,
            available: None,
            requested,
        }
    }

    const fn out_of_stock(product_id: ProductId, requested: u32) -> Self {
        Self {
            product_id,
            reason: ConflictReason::OutOfStock,
            available: Some(0),
            requested,
        }
    }

    const fn insufficient(product_id: ProductId, available: u32, requested: u32) -> Self {
        Self {
            product_id,
            reason: ConflictReason::InsufficientStock,
            available: Some(available),
            requested,
        }
    }
}

impl std::fmt::Display for StockConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reason {
            ConflictReason::ProductNotFound => write!(f, "product {} not found", self.product_id),
            ConflictReason::OutOfStock => write!(f, "product {} is out of stock", self.product_id),
            ConflictReason::InsufficientStock => write!(
                f,
                "product {}: requested {}, only {} available",
                self.product_id,
                self.requested,
                self.available.unwrap_or_default()
            ),
        }
    }
}

/// A quantity lowered to the stock ceiling under [`StockPolicy::Clamp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjustment {
    pub product_id: ProductId,
    pub requested: u32,
    pub granted: u32,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("at least one item is required")]
    EmptyBatch,

    #[error("quantity for product {product_id} must be at least 1")]
    InvalidQuantity { product_id: ProductId },

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("product {0} is not in the cart")]
    LineNotFound(ProductId),

    #[error("{0}")]
    Stock(StockConflict),
}

/// Result of merging a batch into a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub cart: Cart,
    /// Lines that were skipped. Callers abort the batch when this is
    /// non-empty.
    pub conflicts: Vec<StockConflict>,
    pub adjustments: Vec<Adjustment>,
}

impl MergeOutcome {
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

fn grant(
    product_id: ProductId,
    desired: u32,
    level: &StockLevel,
    policy: StockPolicy,
) -> Result<(u32, Option<Adjustment>), CartError> {
    if desired <= level.stock {
        return Ok((desired, None));
    }
    match policy {
        StockPolicy::Clamp => Ok((
            level.stock,
            Some(Adjustment {
                product_id,
                requested: desired,
                granted: level.stock,
            }),
        )),
        StockPolicy::Reject => Err(CartError::Stock(StockConflict::insufficient(
            product_id,
            level.stock,
            desired,
        ))),
    }
}

/// Merge `requests` into `cart` against `stock`.
///
/// Requests are applied in order, so a product listed twice is incremented
/// twice. Unknown, inactive or out-of-stock products are recorded as
/// conflicts and leave the cart untouched. Quantities above stock follow
/// `policy.stock`. Touched lines get the current price and `now` as
/// `added_at`.
///
/// # Errors
///
/// Returns [`CartError::EmptyBatch`] for an empty batch and
/// [`CartError::InvalidQuantity`] for a zero quantity, before anything is
/// merged.
pub fn merge_cart(
    mut cart: Cart,
    requests: &[LineRequest],
    stock: &StockSnapshot,
    policy: &CartPolicy,
    now: DateTime<Utc>,
) -> Result<MergeOutcome, CartError> {
    if requests.is_empty() {
        return Err(CartError::EmptyBatch);
    }
    if let Some(bad) = requests.iter().find(|r| r.quantity == 0) {
        return Err(CartError::InvalidQuantity {
            product_id: bad.product_id,
        });
    }

    let mut conflicts = Vec::new();
    let mut adjustments = Vec::new();

    for request in requests {
        let Some(level) = stock.get(&request.product_id).filter(|l| l.active) else {
            conflicts.push(StockConflict::not_found(request.product_id, request.quantity));
            continue;
        };
        if level.stock == 0 {
            conflicts.push(StockConflict::out_of_stock(
                request.product_id,
                request.quantity,
            ));
            continue;
        }

        let current = cart.line(request.product_id).map_or(0, |l| l.quantity);
        let desired = current.saturating_add(request.quantity);
        let granted = match grant(request.product_id, desired, level, policy.stock) {
            Ok((granted, adjustment)) => {
                adjustments.extend(adjustment);
                granted
            }
            Err(CartError::Stock(conflict)) => {
                conflicts.push(conflict);
                continue;
            }
            Err(other) => return Err(other),
        };

        match cart.line_mut(request.product_id) {
            Some(line) => {
                line.quantity = granted;
                line.unit_price = level.price;
                line.added_at = now;
            }
            None => cart.lines.push(CartLine {
                product_id: request.product_id,
                quantity: granted,
                unit_price: level.price,
                added_at: now,
            }),
        }
    }

    cart.recompute(policy);
    Ok(MergeOutcome {
        cart,
        conflicts,
        adjustments,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const USER: UserId = UserId::new(1);
    const P1: ProductId = ProductId::new(10);
    const P2: ProductId = ProductId::new(20);

    fn price(cents: i64) -> Price {
        Price::from_cents(cents).unwrap()
    }

    fn level(cents: i64, stock: u32) -> StockLevel {
        StockLevel {
            price: price(cents),
            stock,
            active: true,
        }
    }

    fn req(product_id: ProductId, quantity: u32) -> LineRequest {
        LineRequest {
            product_id,
            quantity,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_new_line_clamped_to_stock() {
        let stock = StockSnapshot::from([(P1, level(1000, 3))]);
        let out = merge_cart(
            Cart::empty(USER),
            &[req(P1, 5)],
            &stock,
            &CartPolicy::default(),
            now(),
        )
        .unwrap();

        assert!(!out.has_conflicts());
        assert_eq!(out.cart.line(P1).unwrap().quantity, 3);
        // 3 x 10.00 x 1.08
        assert_eq!(out.cart.total_amount(), Decimal::new(3240, 2));
        assert_eq!(
            out.adjustments,
            vec![Adjustment {
                product_id: P1,
                requested: 5,
                granted: 3
            }]
        );
    }

    #[test]
    fn test_existing_line_incremented_and_repriced() {
        let stock = StockSnapshot::from([(P1, level(500, 10))]);
        let policy = CartPolicy::default();
        let earlier = now() - chrono::Duration::hours(1);
        let cart = Cart::from_lines(
            USER,
            vec![CartLine {
                product_id: P1,
                quantity: 2,
                unit_price: price(400),
                added_at: earlier,
            }],
            &policy,
        );

        let out = merge_cart(cart, &[req(P1, 3)], &stock, &policy, now()).unwrap();
        let line = out.cart.line(P1).unwrap();
        assert_eq!(line.quantity, 5);
        assert_eq!(line.unit_price, price(500));
        assert_eq!(line.added_at, now());
        assert_eq!(out.cart.lines().len(), 1);
    }

    #[test]
    fn test_unknown_product_is_conflict() {
        let stock = StockSnapshot::from([(P1, level(1000, 5))]);
        let out = merge_cart(
            Cart::empty(USER),
            &[req(P1, 1), req(P2, 1)],
            &stock,
            &CartPolicy::default(),
            now(),
        )
        .unwrap();

        assert_eq!(out.conflicts.len(), 1);
        assert_eq!(out.conflicts[0].product_id, P2);
        assert_eq!(out.conflicts[0].reason, ConflictReason::ProductNotFound);
        assert!(out.cart.line(P2).is_none());
        assert_eq!(out.cart.total_amount(), Decimal::new(1080, 2));
    }

    #[test]
    fn test_zero_stock_and_inactive_are_conflicts() {
        let mut inactive = level(100, 5);
        inactive.active = false;
        let stock = StockSnapshot::from([(P1, level(100, 0)), (P2, inactive)]);
        let out = merge_cart(
            Cart::empty(USER),
            &[req(P1, 1), req(P2, 1)],
            &stock,
            &CartPolicy::default(),
            now(),
        )
        .unwrap();

        assert_eq!(out.conflicts[0].reason, ConflictReason::OutOfStock);
        assert_eq!(out.conflicts[1].reason, ConflictReason::ProductNotFound);
        assert!(out.cart.is_empty());
    }

    #[test]
    fn test_reject_policy_records_insufficient() {
        let stock = StockSnapshot::from([(P1, level(100, 2))]);
        let policy = CartPolicy {
            stock: StockPolicy::Reject,
            ..CartPolicy::default()
        };
        let out = merge_cart(Cart::empty(USER), &[req(P1, 3)], &stock, &policy, now()).unwrap();
        assert_eq!(
            out.conflicts,
            vec![StockConflict {
                product_id: P1,
                reason: ConflictReason::InsufficientStock,
                available: Some(2),
                requested: 3,
            }]
        );
    }

    #[test]
    fn test_duplicate_requests_merge_sequentially() {
        let stock = StockSnapshot::from([(P1, level(100, 4))]);
        let out = merge_cart(
            Cart::empty(USER),
            &[req(P1, 2), req(P1, 3)],
            &stock,
            &CartPolicy::default(),
            now(),
        )
        .unwrap();
        assert_eq!(out.cart.line(P1).unwrap().quantity, 4);
    }

    #[test]
    fn test_empty_batch_and_zero_quantity_rejected() {
        let stock = StockSnapshot::new();
        let policy = CartPolicy::default();
        assert_eq!(
            merge_cart(Cart::empty(USER), &[], &stock, &policy, now()),
            Err(CartError::EmptyBatch)
        );
        assert!(matches!(
            merge_cart(Cart::empty(USER), &[req(P1, 0)], &stock, &policy, now()),
            Err(CartError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_set_quantity() {
        let policy = CartPolicy::default();
        let stock = StockSnapshot::from([(P1, level(250, 4))]);
        let mut cart = merge_cart(Cart::empty(USER), &[req(P1, 1)], &stock, &policy, now())
            .unwrap()
            .cart;

        let adjustment = cart
            .set_quantity(P1, 9, stock.get(&P1), &policy)
            .unwrap();
        assert_eq!(adjustment.map(|a| a.granted), Some(4));
        assert_eq!(cart.line(P1).unwrap().quantity, 4);
        assert_eq!(cart.total_amount(), Decimal::new(1080, 2));

        assert_eq!(
            cart.set_quantity(P2, 1, None, &policy),
            Err(CartError::ProductNotFound(P2))
        );
        let other = StockSnapshot::from([(P2, level(100, 5))]);
        assert_eq!(
            cart.set_quantity(P2, 1, other.get(&P2), &policy),
            Err(CartError::LineNotFound(P2))
        );
    }

    #[test]
    fn test_set_quantity_reject_policy() {
        let policy = CartPolicy {
            stock: StockPolicy::Reject,
            ..CartPolicy::default()
        };
        let stock = StockSnapshot::from([(P1, level(100, 2))]);
        let mut cart = merge_cart(Cart::empty(USER), &[req(P1, 1)], &stock, &policy, now())
            .unwrap()
            .cart;
        assert!(matches!(
            cart.set_quantity(P1, 3, stock.get(&P1), &policy),
            Err(CartError::Stock(StockConflict {
                reason: ConflictReason::InsufficientStock,
                ..
            }))
        ));
        assert_eq!(cart.line(P1).unwrap().quantity, 1);
    }

    #[test]
    fn test_remove_and_clear_recompute() {
        let policy = CartPolicy::default();
        let stock = StockSnapshot::from([(P1, level(100, 5)), (P2, level(200, 5))]);
        let mut cart = merge_cart(
            Cart::empty(USER),
            &[req(P1, 1), req(P2, 1)],
            &stock,
            &policy,
            now(),
        )
        .unwrap()
        .cart;

        assert!(cart.remove_line(P1, &policy));
        assert!(!cart.remove_line(P1, &policy));
        assert_eq!(cart.total_amount(), Decimal::new(216, 2));

        cart.clear(&policy);
        assert!(cart.is_empty());
        assert_eq!(cart.total_amount(), Decimal::ZERO);
    }

    #[test]
    fn test_discount_floors_at_zero() {
        let policy = CartPolicy {
            discount: Decimal::new(50, 0),
            ..CartPolicy::default()
        };
        let stock = StockSnapshot::from([(P1, level(1000, 5))]);
        let out = merge_cart(Cart::empty(USER), &[req(P1, 1)], &stock, &policy, now()).unwrap();
        assert_eq!(out.cart.total_amount(), Decimal::ZERO);
        let totals = out.cart.totals(&policy);
        assert_eq!(totals.subtotal, Decimal::new(1000, 2));
    }

    #[test]
    fn test_tax_is_rounded_to_cents() {
        let policy = CartPolicy::default();
        let stock = StockSnapshot::from([(P1, level(999, 5))]);
        let out = merge_cart(Cart::empty(USER), &[req(P1, 3)], &stock, &policy, now()).unwrap();
        // 29.97 x 0.08 = 2.3976
        let totals = out.cart.totals(&policy);
        assert_eq!(totals.tax.to_string(), "2.40");
        assert_eq!(out.cart.total_amount().to_string(), "32.37");
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("Reject".parse::<StockPolicy>().unwrap(), StockPolicy::Reject);
        assert!("sometimes".parse::<StockPolicy>().is_err());
    }
}
