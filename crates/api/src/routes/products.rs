//! Product route handlers.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bazaar_core::ProductId;
use bazaar_core::query::schema::{PRODUCT_SEARCH, PRODUCTS};
use bazaar_core::query::{Facet, ListQuery, PageMeta, RawParams};
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use crate::db::ProductRepository;
use crate::error::{AppError, Result};
use crate::extract::{ApiPath, ApiQuery};
use crate::models::product::Product;
use crate::response::{ApiResponse, ListResponse, project};
use crate::state::AppState;

/// Search results with category facets.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub meta: PageMeta,
    pub data: Vec<Product>,
    pub facets: Vec<Facet>,
}

impl IntoResponse for SearchResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// List products with filters, `sortBy` aliases and paging.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    ApiQuery(raw): ApiQuery<RawParams>,
) -> Result<ListResponse<Value>> {
    let query = ListQuery::resolve(&raw, &PRODUCTS)?;
    let (products, total) = ProductRepository::new(state.pool()).list(&query).await?;
    let data = project(products, query.projection.as_ref())?;
    Ok(ListResponse::new(PageMeta::new(total, &query.page), data))
}

/// Full-text search ranked by relevance, with category facets.
#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    ApiQuery(raw): ApiQuery<RawParams>,
) -> Result<SearchResponse> {
    let query = ListQuery::resolve(&raw, &PRODUCT_SEARCH)?;
    let found = ProductRepository::new(state.pool()).search(&query).await?;
    tracing::debug!(total = found.total, facets = found.facets.len(), "product search");
    Ok(SearchResponse {
        success: true,
        meta: PageMeta::new(found.total, &query.page),
        data: found.products,
        facets: found.facets,
    })
}

/// Newest active products in one category.
#[instrument(skip(state))]
pub async fn by_category(
    State(state): State<AppState>,
    ApiPath(category): ApiPath<String>,
) -> Result<ApiResponse<Vec<Product>>> {
    let products = ProductRepository::new(state.pool())
        .by_category(&category)
        .await?;
    Ok(ApiResponse::ok(products))
}

/// Get one active product.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<ApiResponse<Product>> {
    let product = ProductRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;
    Ok(ApiResponse::ok(product))
}
