//! List query resolution.
//!
//! Every list endpoint turns its query string into a [`ListQuery`] through
//! the same four steps, each driven by the entity's static
//! [`EntitySchema`](schema::EntitySchema):
//!
//! - [`filter::build_filter`] - recognized keys to typed predicates
//! - [`sort::parse_sort`] - `-age,name` to ordered sort keys
//! - [`page::paginate`] - `page`/`limit` to an offset window
//! - [`projection::Projection`] - optional `fields` list
//!
//! Nothing here touches storage; the API crate renders a resolved query into
//! SQL.

use std::collections::BTreeMap;

pub mod facet;
pub mod filter;
pub mod page;
pub mod projection;
pub mod schema;
pub mod sort;

pub use facet::{Facet, rank_facets};
pub use filter::{Bound, FilterSet, FilterValue, Predicate, SEARCH_KEY, build_filter};
pub use page::{Page, PageMeta, page_from_params, paginate};
pub use projection::Projection;
pub use schema::{EntitySchema, FieldKind, FieldSpec, SearchMode};
pub use sort::{SortDirection, SortKey, parse_sort};

/// Hard ceiling on any page size.
pub const MAX_LIMIT: u64 = 100;

/// Raw query-string parameters, as received.
pub type RawParams = BTreeMap<String, String>;

/// Errors produced while resolving a list query.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A value could not be parsed as its field's type.
    #[error("invalid value {value:?} for `{param}`: expected {expected}")]
    InvalidParameter {
        param: String,
        value: String,
        expected: &'static str,
    },

    /// A sort or projection token names no known field.
    #[error("unknown field `{field}` (allowed: {allowed})")]
    InvalidField { field: String, allowed: String },
}

/// A fully resolved, immutable list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub filters: FilterSet,
    pub sort: Vec<SortKey>,
    pub page: Page,
    pub projection: Option<Projection>,
}

impl ListQuery {
    /// Resolve raw parameters against `schema`.
    ///
    /// # Errors
    ///
    /// Returns the first [`QueryError`] produced by any step.
    pub fn resolve(raw: &RawParams, schema: &EntitySchema) -> Result<Self, QueryError> {
        let sort_expr = schema
            .sort_params
            .iter()
            .find_map(|key| filter::non_empty(raw, key));

        Ok(Self {
            filters: build_filter(raw, schema)?,
            sort: parse_sort(sort_expr, schema)?,
            page: page_from_params(raw, schema)?,
            projection: Projection::parse(raw.get("fields").map(String::as_str), schema)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::query::schema::{PRODUCT_SEARCH, PRODUCTS, USERS};

    fn params(pairs: &[(&str, &str)]) -> RawParams {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_resolve_users() {
        let q = ListQuery::resolve(
            &params(&[
                ("role", "admin"),
                ("sort", "-age,name"),
                ("page", "2"),
                ("limit", "5"),
                ("fields", "name"),
            ]),
            &USERS,
        )
        .unwrap();
        assert_eq!(q.sort, vec![SortKey::desc("age"), SortKey::asc("name")]);
        assert_eq!(q.page.skip, 5);
        assert!(q.filters.get("role").is_some());
        assert_eq!(q.projection.unwrap().fields(), &["id", "name"]);
    }

    #[test]
    fn test_products_prefer_sort_by() {
        let q = ListQuery::resolve(&params(&[("sortBy", "priceAsc"), ("sort", "-stock")]), &PRODUCTS)
            .unwrap();
        assert_eq!(q.sort, vec![SortKey::asc("price")]);
    }

    #[test]
    fn test_search_ignores_sort_params() {
        let q = ListQuery::resolve(&params(&[("sort", "bogus")]), &PRODUCT_SEARCH).unwrap();
        assert_eq!(q.sort, vec![SortKey::desc("createdAt")]);
    }

    #[test]
    fn test_first_error_wins() {
        let err = ListQuery::resolve(&params(&[("sort", "nope")]), &USERS).unwrap_err();
        assert!(matches!(err, QueryError::InvalidField { .. }));
    }
}
