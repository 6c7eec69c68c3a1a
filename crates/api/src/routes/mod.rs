//! HTTP route handlers for the JSON API.
//!
//! # Route Structure
//!
//! ```text
//! # Users
//! GET    /api/users                          - List (filters, sort, paging, fields)
//! POST   /api/users                          - Create
//! POST   /api/users/bulk                     - Create many, per-item outcome
//! POST   /api/users/transaction              - Create many, all or nothing
//! POST   /api/users/bulk-update              - Patch every user a filter selects
//! POST   /api/users/bulk-delete              - Remove every user a filter selects
//! POST   /api/users/upsert                   - Insert or update by email, per-item outcome
//! GET    /api/users/{id}                     - Get
//! PATCH  /api/users/{id}                     - Partial update
//! DELETE /api/users/{id}                     - Hard delete
//! POST   /api/users/{id}/increment-age       - Atomic age increment
//! POST   /api/users/{id}/soft-delete         - Soft delete
//!
//! # Products
//! GET    /api/products                       - List (filters, sortBy, paging)
//! GET    /api/products/search                - Ranked search with category facets
//! GET    /api/products/category/{category}   - Active products in a category
//! GET    /api/products/{id}                  - Get
//!
//! # Cart
//! POST   /api/cart                           - Add a batch of items
//! GET    /api/cart/{userId}                  - Get (absent cart reads as empty)
//! PUT    /api/cart/{userId}/item             - Set a line's quantity
//! DELETE /api/cart/{userId}/item/{productId} - Remove a line
//! DELETE /api/cart/clear/{userId}            - Empty the cart
//!
//! # Posts
//! GET    /api/posts                          - List
//! POST   /api/posts                          - Create (unique title and slug)
//! POST   /api/posts/bulk                     - Create many, per-item outcome
//! GET    /api/posts/analytics                - Counts and top viewed
//! GET    /api/posts/{id}                     - Get, counting the view
//! PUT    /api/posts/{id}                     - Update
//! DELETE /api/posts/{id}[?hard=true]         - Archive or remove
//!
//! # Tasks
//! GET    /api/tasks                          - List
//! POST   /api/tasks                          - Create
//! GET    /api/tasks/analytics/{userId}       - Counts by status
//! GET    /api/tasks/{id}                     - Get with progress
//! PATCH  /api/tasks/{id}/status              - Change status
//! ```

pub mod cart;
pub mod posts;
pub mod products;
pub mod tasks;
pub mod users;

use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

use crate::state::AppState;

/// Create the user routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(users::index).post(users::create))
        .route("/bulk", post(users::bulk_create))
        .route("/transaction", post(users::create_all))
        .route("/bulk-update", post(users::bulk_update))
        .route("/bulk-delete", post(users::bulk_delete))
        .route("/upsert", post(users::upsert))
        .route(
            "/{id}",
            get(users::show).patch(users::update).delete(users::destroy),
        )
        .route("/{id}/increment-age", post(users::increment_age))
        .route("/{id}/soft-delete", post(users::soft_delete))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/search", get(products::search))
        .route("/category/{category}", get(products::by_category))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(cart::add))
        .route("/clear/{user_id}", delete(cart::clear))
        .route("/{user_id}", get(cart::show))
        .route("/{user_id}/item", put(cart::update_item))
        .route("/{user_id}/item/{product_id}", delete(cart::remove_item))
}

/// Create the post routes router.
pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(posts::index).post(posts::create))
        .route("/bulk", post(posts::bulk_create))
        .route("/analytics", get(posts::analytics))
        .route(
            "/{id}",
            get(posts::show).put(posts::update).delete(posts::destroy),
        )
}

/// Create the task routes router.
pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::index).post(tasks::create))
        .route("/analytics/{user_id}", get(tasks::analytics))
        .route("/{id}", get(tasks::show))
        .route("/{id}/status", patch(tasks::update_status))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api/users", user_routes())
        .nest("/api/products", product_routes())
        .nest("/api/cart", cart_routes())
        .nest("/api/posts", post_routes())
        .nest("/api/tasks", task_routes())
}
