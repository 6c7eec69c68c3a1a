//! Business logic services.
//!
//! # Services
//!
//! - `cart` - Transactional cart mutations over the merge engine
//! - `posts` - Slug allocation, publish dates and bulk creation
//!
//! Plain reads and single-statement writes go straight from the route to the
//! repository.

pub mod cart;
pub mod posts;

pub use cart::{CartService, CartUpdate};
pub use posts::PostService;
