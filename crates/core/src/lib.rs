//! Bazaar Core - domain types and pure algorithms.
//!
//! This crate is shared by every Bazaar component:
//! - `api` - JSON service over `PostgreSQL`
//! - `cli` - migrations, seeding and maintenance commands
//!
//! # Architecture
//!
//! The core crate contains no I/O: no database access, no HTTP, no clock.
//! Callers pass in what was read (stock levels, existing slugs, the current
//! time) and persist what comes back.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, emails, and enum labels
//! - [`query`] - Filter builder, sort parser, pager, projection and facets
//! - [`cart`] - Cart merge engine with stock clamping and totals
//! - [`slug`] - Unique slug generation for posts

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod query;
pub mod slug;
pub mod types;

pub use cart::{Cart, CartError, CartLine, CartPolicy, LineRequest, StockPolicy, merge_cart};
pub use query::{ListQuery, QueryError, RawParams};
pub use slug::{Slug, SlugError, generate_slug};
pub use types::*;
