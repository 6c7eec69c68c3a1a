//! Rendering resolved list queries into SQL.
//!
//! Identifiers come only from the static entity schemas; every client value
//! is bound as a parameter.

use bazaar_core::query::{
    EntitySchema, FieldKind, FieldSpec, FilterSet, FilterValue, ListQuery, Page, Predicate,
    SearchMode, SortKey,
};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::{RepositoryError, to_u64};

/// Text search configuration used for every full-text predicate.
const TS_CONFIG: &str = "'english'";

/// A listable table.
#[derive(Debug, Clone, Copy)]
pub struct Table {
    pub name: &'static str,
    /// Column list for `SELECT`, matching the row type.
    pub columns: &'static str,
    pub schema: &'static EntitySchema,
}

/// Expression used when comparing a field against a bound value.
fn compare_expr(field: &FieldSpec) -> String {
    match field.kind {
        FieldKind::Label => format!("{}::text", field.column),
        _ => field.column.to_owned(),
    }
}

/// Expression used when a field is part of a text document.
fn text_expr(field: &FieldSpec) -> String {
    match field.kind {
        FieldKind::TextArray => format!("array_to_string({}, ' ')", field.column),
        FieldKind::Text => field.column.to_owned(),
        _ => format!("{}::text", field.column),
    }
}

/// The text-search document for `fields`: the schema's stored `tsvector`
/// column when it covers exactly these fields, otherwise `to_tsvector` over
/// their concatenation.
#[must_use]
pub fn search_document(schema: &EntitySchema, fields: &[&str]) -> String {
    if let Some(search) = schema.search
        && let Some(column) = search.document
        && search.fields == fields
    {
        return column.to_owned();
    }
    let parts: Vec<String> = fields
        .iter()
        .filter_map(|name| schema.field(name))
        .map(text_expr)
        .collect();
    format!("to_tsvector({TS_CONFIG}, concat_ws(' ', {}))", parts.join(", "))
}

/// Escape `%`, `_` and `\` for use inside an `ILIKE` pattern.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::Text(s) => qb.push_bind(s.clone()),
        FilterValue::Integer(n) => qb.push_bind(*n),
        FilterValue::Decimal(d) => qb.push_bind(*d),
        FilterValue::Bool(b) => qb.push_bind(*b),
        FilterValue::Timestamp(ts) => qb.push_bind(*ts),
    };
}

fn push_list<'v>(
    qb: &mut QueryBuilder<'_, Postgres>,
    values: impl IntoIterator<Item = &'v FilterValue>,
) {
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_value(qb, value);
    }
}

fn push_text_search(
    qb: &mut QueryBuilder<'_, Postgres>,
    schema: &EntitySchema,
    query: &str,
    fields: &[&str],
    mode: SearchMode,
) {
    match mode {
        SearchMode::Substring => {
            let pattern = like_pattern(query);
            qb.push("(");
            let mut first = true;
            for field in fields.iter().filter_map(|name| schema.field(name)) {
                if !first {
                    qb.push(" OR ");
                }
                first = false;
                qb.push(text_expr(field));
                qb.push(" ILIKE ");
                qb.push_bind(pattern.clone());
            }
            if first {
                qb.push("FALSE");
            }
            qb.push(")");
        }
        SearchMode::FullText => {
            qb.push(search_document(schema, fields));
            qb.push(format!(" @@ plainto_tsquery({TS_CONFIG}, "));
            qb.push_bind(query.to_owned());
            qb.push(")");
        }
    }
}

fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, field: &FieldSpec, predicate: &Predicate) {
    let expr = compare_expr(field);
    let is_array = field.kind == FieldKind::TextArray;

    match predicate {
        Predicate::Equals { value } if is_array => {
            push_value(qb, value);
            qb.push(format!(" = ANY({})", field.column));
        }
        Predicate::Equals { value } => {
            qb.push(format!("{expr} = "));
            push_value(qb, value);
        }
        Predicate::Range { min, max } => {
            qb.push("(TRUE");
            if let Some(bound) = min {
                let op = if bound.inclusive { ">=" } else { ">" };
                qb.push(format!(" AND {expr} {op} "));
                push_value(qb, &bound.value);
            }
            if let Some(bound) = max {
                let op = if bound.inclusive { "<=" } else { "<" };
                qb.push(format!(" AND {expr} {op} "));
                push_value(qb, &bound.value);
            }
            qb.push(")");
        }
        Predicate::In { values } if is_array => {
            qb.push(format!("{} && ARRAY[", field.column));
            push_list(qb, values);
            qb.push("]::text[]");
        }
        Predicate::In { values } => {
            qb.push(format!("{expr} IN ("));
            push_list(qb, values);
            qb.push(")");
        }
        Predicate::All { values } if is_array => {
            qb.push(format!("{} @> ARRAY[", field.column));
            push_list(qb, values);
            qb.push("]::text[]");
        }
        Predicate::All { values } => {
            qb.push("(TRUE");
            for value in values {
                qb.push(format!(" AND {expr} = "));
                push_value(qb, value);
            }
            qb.push(")");
        }
        Predicate::TextSearch { .. } => {
            qb.push("TRUE");
        }
    }
}

/// Append `AND <predicate>` for every entry of `filters`.
///
/// The builder must already contain a `WHERE` clause.
pub fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &FilterSet, schema: &EntitySchema) {
    for (key, predicate) in filters.iter() {
        if let Predicate::TextSearch {
            query,
            fields,
            mode,
        } = predicate
        {
            qb.push(" AND ");
            push_text_search(qb, schema, query, fields, *mode);
            continue;
        }
        let Some(field) = schema.field(key) else {
            tracing::warn!(entity = schema.entity, field = key, "filter on unknown field skipped");
            continue;
        };
        qb.push(" AND ");
        push_predicate(qb, field, predicate);
    }
}

/// Append `ORDER BY`, ending with `id ASC` as the final tie-break.
pub fn push_order(qb: &mut QueryBuilder<'_, Postgres>, sort: &[SortKey], schema: &EntitySchema) {
    qb.push(" ORDER BY ");
    for key in sort {
        if let Some(field) = schema.field(key.field) {
            qb.push(format!(
                "{} {} NULLS LAST, ",
                field.column,
                key.direction.as_sql()
            ));
        }
    }
    qb.push("id ASC");
}

/// Append `ORDER BY` on full-text rank, newest first among equal ranks.
pub fn push_rank_order(
    qb: &mut QueryBuilder<'_, Postgres>,
    schema: &EntitySchema,
    fields: &[&str],
    query: &str,
) {
    qb.push(format!(
        " ORDER BY ts_rank({}, plainto_tsquery({TS_CONFIG}, ",
        search_document(schema, fields)
    ));
    qb.push_bind(query.to_owned());
    qb.push(")) DESC, created_at DESC, id ASC");
}

/// Append `LIMIT` and `OFFSET`.
pub fn push_page(qb: &mut QueryBuilder<'_, Postgres>, page: &Page) {
    qb.push(" LIMIT ");
    qb.push_bind(i64::try_from(page.limit).unwrap_or(i64::MAX));
    qb.push(" OFFSET ");
    qb.push_bind(i64::try_from(page.skip).unwrap_or(i64::MAX));
}

/// Build the page query for `table`.
#[must_use]
pub fn select_query(table: &Table, query: &ListQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM {} WHERE TRUE",
        table.columns, table.name
    ));
    push_filters(&mut qb, &query.filters, table.schema);
    push_order(&mut qb, &query.sort, table.schema);
    push_page(&mut qb, &query.page);
    qb
}

/// Build the matching count query for `table`.
#[must_use]
pub fn count_query(table: &Table, filters: &FilterSet) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE TRUE", table.name));
    push_filters(&mut qb, filters, table.schema);
    qb
}

/// Fetch one page of rows and the total match count concurrently.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if either query fails.
pub async fn fetch_list<R>(
    pool: &PgPool,
    table: &Table,
    query: &ListQuery,
) -> Result<(Vec<R>, u64), RepositoryError>
where
    R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let mut select = select_query(table, query);
    let mut count = count_query(table, &query.filters);

    let (rows, total) = tokio::try_join!(
        select.build_query_as::<R>().fetch_all(pool),
        count.build_query_scalar::<i64>().fetch_one(pool),
    )?;

    Ok((rows, to_u64(total, "count")?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use bazaar_core::query::RawParams;
    use bazaar_core::query::schema::{POSTS, PRODUCT_SEARCH, TASKS, USERS};

    use super::*;

    static USER_TABLE: Table = Table {
        name: "users",
        columns: "id, name",
        schema: &USERS,
    };

    fn params(pairs: &[(&str, &str)]) -> RawParams {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<BTreeMap<_, _>>()
    }

    #[test]
    fn test_select_renders_filters_sort_and_page() {
        let query = ListQuery::resolve(
            &params(&[("role", "admin"), ("age_gt", "18"), ("sort", "-age")]),
            &USERS,
        )
        .unwrap();
        let qb = select_query(&USER_TABLE, &query);
        assert_eq!(
            qb.sql(),
            "SELECT id, name FROM users WHERE TRUE \
             AND (TRUE AND age > $1) \
             AND deleted = $2 \
             AND role::text = $3 \
             ORDER BY age DESC NULLS LAST, id ASC LIMIT $4 OFFSET $5"
        );
    }

    #[test]
    fn test_substring_search_binds_per_field() {
        let query = ListQuery::resolve(&params(&[("q", "50%"), ("includeDeleted", "true")]), &USERS)
            .unwrap();
        let qb = count_query(&USER_TABLE, &query.filters);
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM users WHERE TRUE AND (name ILIKE $1 OR email ILIKE $2)"
        );
        assert_eq!(like_pattern("50%_x"), "%50\\%\\_x%");
    }

    #[test]
    fn test_full_text_and_tag_sets() {
        let table = Table {
            name: "tasks",
            columns: "id",
            schema: &TASKS,
        };
        let filters = bazaar_core::query::build_filter(
            &params(&[("search", "essay"), ("tags", "math,urgent")]),
            &TASKS,
        )
        .unwrap();
        let qb = count_query(&table, &filters);
        let sql = qb.sql();
        assert!(sql.contains(
            "to_tsvector('english', concat_ws(' ', title, description, array_to_string(tags, ' '))) \
             @@ plainto_tsquery('english', $1)"
        ));
        assert!(sql.contains("tags @> ARRAY[$2, $3]::text[]"));
    }

    #[test]
    fn test_product_search_uses_stored_document() {
        let table = Table {
            name: "products",
            columns: "id",
            schema: &PRODUCT_SEARCH,
        };
        let query = ListQuery::resolve(&params(&[("q", "lamp")]), &PRODUCT_SEARCH).unwrap();
        let mut qb = count_query(&table, &query.filters);
        let Some(Predicate::TextSearch { query: text, fields, .. }) =
            query.filters.get(bazaar_core::query::SEARCH_KEY)
        else {
            panic!("expected a text search predicate");
        };
        push_rank_order(&mut qb, &PRODUCT_SEARCH, fields, text);
        let sql = qb.sql();
        assert!(sql.contains("AND search_vector @@ plainto_tsquery('english', $"));
        assert!(sql.contains("ORDER BY ts_rank(search_vector, plainto_tsquery('english', "));
        assert!(!sql.contains("concat_ws"));
    }

    #[test]
    fn test_post_tags_overlap() {
        let table = Table {
            name: "posts",
            columns: "id",
            schema: &POSTS,
        };
        let filters =
            bazaar_core::query::build_filter(&params(&[("tags", "rust")]), &POSTS).unwrap();
        let qb = count_query(&table, &filters);
        assert!(qb.sql().ends_with("AND tags && ARRAY[$1]::text[]"));
    }
}
