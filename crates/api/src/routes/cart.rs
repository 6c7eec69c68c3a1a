//! Cart route handlers.

use axum::extract::State;
use bazaar_core::cart::{Adjustment, Cart, CartTotals, LineRequest};
use bazaar_core::{ProductId, UserId};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::extract::{ApiJson, ApiPath};
use crate::response::ApiResponse;
use crate::services::{CartService, CartUpdate};
use crate::state::AppState;

/// `POST /api/cart` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCart {
    pub user_id: UserId,
    #[serde(default)]
    pub items: Vec<LineRequest>,
}

/// `PUT /api/cart/{userId}/item` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetQuantity {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A cart with its price breakdown.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub item_count: u64,
    pub totals: CartTotals,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<Adjustment>,
}

impl CartView {
    fn new(state: &AppState, cart: Cart, adjustments: Vec<Adjustment>) -> Self {
        Self {
            item_count: cart.item_count(),
            totals: cart.totals(state.cart_policy()),
            cart,
            adjustments,
        }
    }

    fn from_update(state: &AppState, update: CartUpdate) -> Self {
        Self::new(state, update.cart, update.adjustments)
    }
}

fn service(state: &AppState) -> CartService<'_> {
    CartService::new(state.pool(), state.cart_policy())
}

/// Add a batch of items to a user's cart.
#[instrument(skip(state, body))]
pub async fn add(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AddToCart>,
) -> Result<ApiResponse<CartView>> {
    let update = service(&state).add(body.user_id, &body.items).await?;
    Ok(ApiResponse::ok(CartView::from_update(&state, update)))
}

/// Read a user's cart.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<ApiResponse<CartView>> {
    let cart = service(&state).get(user_id).await?;
    Ok(ApiResponse::ok(CartView::new(&state, cart, Vec::new())))
}

/// Set the quantity of one line.
#[instrument(skip(state))]
pub async fn update_item(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
    ApiJson(body): ApiJson<SetQuantity>,
) -> Result<ApiResponse<CartView>> {
    let update = service(&state)
        .update_quantity(user_id, body.product_id, body.quantity)
        .await?;
    Ok(ApiResponse::ok(CartView::from_update(&state, update)))
}

/// Remove one line.
#[instrument(skip(state))]
pub async fn remove_item(
    State(state): State<AppState>,
    ApiPath((user_id, product_id)): ApiPath<(UserId, ProductId)>,
) -> Result<ApiResponse<CartView>> {
    let cart = service(&state).remove(user_id, product_id).await?;
    Ok(ApiResponse::ok(CartView::new(&state, cart, Vec::new())))
}

/// Empty a user's cart.
#[instrument(skip(state))]
pub async fn clear(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<ApiResponse<CartView>> {
    let cart = service(&state).clear(user_id).await?;
    Ok(ApiResponse::ok(CartView::new(&state, cart, Vec::new())))
}
