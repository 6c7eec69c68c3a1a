//! Offset pagination.

use serde::Serialize;

use super::schema::EntitySchema;
use super::{MAX_LIMIT, QueryError, RawParams, filter::non_empty};

/// A resolved page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    /// 1-based page number.
    pub page: u64,
    pub skip: u64,
    pub limit: u64,
}

/// Clamp `page` and `limit` for `schema` and compute the offset.
///
/// `page` is raised to 1; `limit` defaults to the schema default and is
/// clamped to `[1, schema.max_limit]`, never above [`MAX_LIMIT`].
#[must_use]
pub fn paginate(page: Option<u64>, limit: Option<u64>, schema: &EntitySchema) -> Page {
    let max = schema.max_limit.clamp(1, MAX_LIMIT);
    let limit = limit.unwrap_or(schema.default_limit).clamp(1, max);
    let page = page.unwrap_or(1).max(1);
    Page {
        page,
        skip: (page - 1).saturating_mul(limit),
        limit,
    }
}

/// Read `page` and `limit` from the query string and paginate.
///
/// # Errors
///
/// Returns [`QueryError::InvalidParameter`] when either value is not an
/// integer. Negative integers are accepted and clamped.
pub fn page_from_params(raw: &RawParams, schema: &EntitySchema) -> Result<Page, QueryError> {
    let page = parse_count(raw, "page")?;
    let limit = parse_count(raw, "limit")?;
    Ok(paginate(page, limit, schema))
}

fn parse_count(raw: &RawParams, key: &str) -> Result<Option<u64>, QueryError> {
    non_empty(raw, key)
        .map(|v| {
            v.parse::<i64>()
                .map(|n| u64::try_from(n).unwrap_or(0))
                .map_err(|_| QueryError::InvalidParameter {
                    param: key.to_owned(),
                    value: v.to_owned(),
                    expected: "an integer",
                })
        })
        .transpose()
}

/// Pagination metadata returned with every list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub total: u64,
    pub page: u64,
    pub pages: u64,
    pub limit: u64,
}

impl PageMeta {
    #[must_use]
    pub const fn new(total: u64, page: &Page) -> Self {
        Self {
            total,
            page: page.page,
            pages: total.div_ceil(page.limit),
            limit: page.limit,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::query::schema::{PRODUCT_SEARCH, PRODUCTS, TASKS, USERS};

    #[test]
    fn test_skip_is_page_minus_one_times_limit() {
        let page = paginate(Some(3), Some(10), &USERS);
        assert_eq!(page.skip, 20);
        assert_eq!(page.limit, 10);
    }

    #[test]
    fn test_defaults_per_entity() {
        assert_eq!(paginate(None, None, &USERS).limit, 10);
        assert_eq!(paginate(None, None, &PRODUCTS).limit, 12);
        assert_eq!(paginate(None, None, &TASKS).limit, 20);
    }

    #[test]
    fn test_clamping() {
        let page = paginate(Some(0), Some(0), &USERS);
        assert_eq!(page, Page { page: 1, skip: 0, limit: 1 });

        assert_eq!(paginate(None, Some(10_000), &USERS).limit, MAX_LIMIT);
        assert_eq!(paginate(None, Some(80), &PRODUCT_SEARCH).limit, 50);
    }

    #[test]
    fn test_from_params() {
        let raw: RawParams = [("page", "-4"), ("limit", "5")]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        let page = page_from_params(&raw, &USERS).unwrap();
        assert_eq!(page, Page { page: 1, skip: 0, limit: 5 });

        let raw: RawParams = [("limit".to_owned(), "ten".to_owned())].into_iter().collect();
        assert!(page_from_params(&raw, &USERS).is_err());
    }

    #[test]
    fn test_meta_pages_rounds_up() {
        let page = paginate(Some(2), Some(10), &USERS);
        let meta = PageMeta::new(21, &page);
        assert_eq!(meta.pages, 3);
        assert_eq!(PageMeta::new(0, &page).pages, 0);
    }
}
