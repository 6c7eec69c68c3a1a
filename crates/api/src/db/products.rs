//! Product repository: catalog listing, search with facets, and the stock
//! snapshot read by cart mutations.

use bazaar_core::cart::{StockLevel, StockSnapshot};
use bazaar_core::query::{Facet, ListQuery, Predicate, SEARCH_KEY, rank_facets, schema};
use bazaar_core::{Price, ProductId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, QueryBuilder};

use super::list::{Table, fetch_list, push_filters, push_order, push_page, push_rank_order};
use super::{RepositoryError, to_u32, to_u64};
use crate::models::product::{Product, Rating};

/// Products returned by `by_category`.
pub const CATEGORY_LIMIT: i64 = 50;

const COLUMNS: &str = "id, name, description, price, original_price, category, subcategory, \
                       stock, rating_average, rating_count, is_active, created_at, updated_at";

/// Listing metadata for `products`.
pub static PRODUCTS_TABLE: Table = Table {
    name: "products",
    columns: COLUMNS,
    schema: &schema::PRODUCTS,
};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: i64,
    name: String,
    description: String,
    price: Decimal,
    original_price: Option<Decimal>,
    category: String,
    subcategory: Option<String>,
    stock: i32,
    rating_average: Decimal,
    rating_count: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn price(amount: Decimal) -> Result<Price, RepositoryError> {
    Price::new(amount).map_err(|e| RepositoryError::DataCorruption(e.to_string()))
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductId::new(row.id),
            name: row.name,
            description: row.description,
            price: price(row.price)?,
            original_price: row.original_price.map(price).transpose()?,
            category: row.category,
            subcategory: row.subcategory,
            stock: to_u32(row.stock, "stock")?,
            rating: Rating {
                average: row.rating_average,
                count: to_u32(row.rating_count, "rating count")?,
            },
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_products(rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
    rows.into_iter().map(Product::try_from).collect()
}

#[derive(Debug, sqlx::FromRow)]
struct FacetRow {
    value: String,
    count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    id: i64,
    price: Decimal,
    stock: i32,
    is_active: bool,
}

/// One page of search hits plus category facets over every match.
#[derive(Debug)]
pub struct ProductSearch {
    pub products: Vec<Product>,
    pub total: u64,
    pub facets: Vec<Facet>,
}

/// Lock the given products `FOR SHARE`, in id order, and read their price
/// and stock. Unknown ids are simply absent from the snapshot.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_stock(
    conn: &mut PgConnection,
    ids: &[ProductId],
) -> Result<StockSnapshot, RepositoryError> {
    let ids: Vec<i64> = ids.iter().map(ProductId::as_i64).collect();
    let rows = sqlx::query_as::<_, StockRow>(
        r"
        SELECT id, price, stock, is_active
        FROM products
        WHERE id = ANY($1)
        ORDER BY id
        FOR SHARE
        ",
    )
    .bind(ids)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            let level = StockLevel {
                price: price(row.price)?,
                stock: to_u32(row.stock, "stock")?,
                active: row.is_active,
            };
            Ok((ProductId::new(row.id), level))
        })
        .collect()
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products matching a resolved query.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, query: &ListQuery) -> Result<(Vec<Product>, u64), RepositoryError> {
        let (rows, total) = fetch_list::<ProductRow>(self.pool, &PRODUCTS_TABLE, query).await?;
        Ok((into_products(rows)?, total))
    }

    /// Get a product by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    /// Newest active products in a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn by_category(&self, category: &str) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            SELECT {COLUMNS}
            FROM products
            WHERE category = $1 AND is_active
            ORDER BY created_at DESC, id ASC
            LIMIT $2
            "
        ))
        .bind(category)
        .bind(CATEGORY_LIMIT)
        .fetch_all(self.pool)
        .await?;

        into_products(rows)
    }

    /// Full-text search ranked by relevance, with category facets.
    ///
    /// Without a search term the results are simply newest first. The facets
    /// ignore any `category` filter so clients can see where else their terms
    /// match.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any query fails.
    pub async fn search(&self, query: &ListQuery) -> Result<ProductSearch, RepositoryError> {
        let schema = &schema::PRODUCT_SEARCH;

        let mut select = QueryBuilder::new(format!("SELECT {COLUMNS} FROM products WHERE TRUE"));
        push_filters(&mut select, &query.filters, schema);
        if let Some(Predicate::TextSearch { query: text, fields, .. }) =
            query.filters.get(SEARCH_KEY)
        {
            push_rank_order(&mut select, schema, fields, text);
        } else {
            push_order(&mut select, &query.sort, schema);
        }
        push_page(&mut select, &query.page);

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products WHERE TRUE");
        push_filters(&mut count, &query.filters, schema);

        let mut facet_filters = query.filters.clone();
        facet_filters.remove("category");
        let mut facets = QueryBuilder::new(
            "SELECT category AS value, COUNT(*) AS count FROM products WHERE TRUE",
        );
        push_filters(&mut facets, &facet_filters, schema);
        facets.push(" GROUP BY category");

        let (rows, total, facet_rows) = tokio::try_join!(
            select.build_query_as::<ProductRow>().fetch_all(self.pool),
            count.build_query_scalar::<i64>().fetch_one(self.pool),
            facets.build_query_as::<FacetRow>().fetch_all(self.pool),
        )?;

        let facets = facet_rows
            .into_iter()
            .map(|row| Ok(Facet::new(row.value, to_u64(row.count, "facet count")?)))
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(ProductSearch {
            products: into_products(rows)?,
            total: to_u64(total, "count")?,
            facets: rank_facets(facets),
        })
    }
}
