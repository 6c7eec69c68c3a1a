//! Static descriptions of the listable entities.
//!
//! A schema names every field a client may filter, sort or project on, the
//! query-string keys that feed the filter builder, and the paging limits.
//! Storage code renders SQL only from the `column` strings declared here, so
//! no client input ever reaches an identifier position.

use super::sort::SortDirection;

/// Value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Text backed by a database enum; compared as text, sorted in
    /// declaration order.
    Label,
    Integer,
    Decimal,
    Bool,
    Timestamp,
    /// Array of lower-cased strings (tags).
    TextArray,
}

/// A field exposed to list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Name used on the wire (`createdAt`).
    pub name: &'static str,
    /// Storage column (`created_at`).
    pub column: &'static str,
    pub kind: FieldKind,
    pub sortable: bool,
}

impl FieldSpec {
    const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column,
            kind,
            sortable: true,
        }
    }

    const fn unsorted(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column,
            kind,
            sortable: false,
        }
    }
}

/// How a query-string key contributes to the predicate on its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRole {
    Equals,
    /// Lower bound of a range.
    Above { inclusive: bool },
    /// Upper bound of a range.
    Below { inclusive: bool },
    /// Comma-separated set; matches any member.
    AnyOf,
    /// Comma-separated set; must contain every member.
    AllOf,
}

/// A recognized query-string key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParam {
    pub key: &'static str,
    pub field: &'static str,
    pub role: ParamRole,
}

const fn param(key: &'static str, field: &'static str, role: ParamRole) -> FilterParam {
    FilterParam { key, field, role }
}

/// Text matching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchMode {
    /// Case-insensitive substring on any field.
    Substring,
    /// Stemmed full-text match over the concatenated fields.
    FullText,
}

/// Free-text search configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSearch {
    /// Query-string keys, first non-empty wins.
    pub keys: &'static [&'static str],
    pub fields: &'static [&'static str],
    pub mode: SearchMode,
    /// Stored `tsvector` column holding the document for `fields`, if the
    /// table keeps one.
    pub document: Option<&'static str>,
}

/// Soft-delete flag applied unless the client opts out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftDelete {
    pub field: &'static str,
    /// Value the flag has on visible rows.
    pub visible: bool,
    /// Query-string key that disables the implicit filter when `true`.
    pub override_param: &'static str,
}

/// Everything the resolver needs to know about one listable entity.
#[derive(Debug)]
pub struct EntitySchema {
    pub entity: &'static str,
    pub fields: &'static [FieldSpec],
    pub filters: &'static [FilterParam],
    pub search: Option<TextSearch>,
    pub soft_delete: Option<SoftDelete>,
    /// Keys carrying a sort expression, first present wins.
    pub sort_params: &'static [&'static str],
    /// Whole-token shorthands expanded before validation.
    pub sort_aliases: &'static [(&'static str, &'static str)],
    pub default_sort: &'static [(&'static str, SortDirection)],
    pub default_limit: u64,
    pub max_limit: u64,
}

impl EntitySchema {
    /// Look up a field by wire name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Comma-separated list of sortable field names, for error messages.
    #[must_use]
    pub fn sortable_names(&self) -> String {
        self.fields
            .iter()
            .filter(|f| f.sortable)
            .map(|f| f.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Comma-separated list of all field names, for error messages.
    #[must_use]
    pub fn field_names(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

use FieldKind::{Bool, Decimal, Integer, Label, Text, TextArray, Timestamp};

const USER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", "id", Integer),
    FieldSpec::new("name", "name", Text),
    FieldSpec::new("email", "email", Text),
    FieldSpec::new("age", "age", Integer),
    FieldSpec::new("role", "role", Label),
    FieldSpec::unsorted("deleted", "deleted", Bool),
    FieldSpec::new("createdAt", "created_at", Timestamp),
    FieldSpec::new("updatedAt", "updated_at", Timestamp),
];

/// `GET /api/users`
pub static USERS: EntitySchema = EntitySchema {
    entity: "user",
    fields: USER_FIELDS,
    filters: &[
        param("role", "role", ParamRole::Equals),
        param("age_gt", "age", ParamRole::Above { inclusive: false }),
        param("age_lt", "age", ParamRole::Below { inclusive: false }),
    ],
    search: Some(TextSearch {
        keys: &["q"],
        fields: &["name", "email"],
        mode: SearchMode::Substring,
        document: None,
    }),
    soft_delete: Some(SoftDelete {
        field: "deleted",
        visible: false,
        override_param: "includeDeleted",
    }),
    sort_params: &["sort"],
    sort_aliases: &[],
    default_sort: &[("createdAt", SortDirection::Desc)],
    default_limit: 10,
    max_limit: 100,
};

const PRODUCT_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", "id", Integer),
    FieldSpec::new("name", "name", Text),
    FieldSpec::unsorted("description", "description", Text),
    FieldSpec::new("price", "price", Decimal),
    FieldSpec::new("originalPrice", "original_price", Decimal),
    FieldSpec::new("category", "category", Text),
    FieldSpec::new("subcategory", "subcategory", Text),
    FieldSpec::new("stock", "stock", Integer),
    FieldSpec::new("ratingAverage", "rating_average", Decimal),
    FieldSpec::new("ratingCount", "rating_count", Integer),
    FieldSpec::unsorted("isActive", "is_active", Bool),
    FieldSpec::new("createdAt", "created_at", Timestamp),
    FieldSpec::new("updatedAt", "updated_at", Timestamp),
];

const PRODUCT_FILTERS: &[FilterParam] = &[
    param("category", "category", ParamRole::Equals),
    param("subcategory", "subcategory", ParamRole::Equals),
    param("minPrice", "price", ParamRole::Above { inclusive: true }),
    param("maxPrice", "price", ParamRole::Below { inclusive: true }),
];

const PRODUCT_TEXT: TextSearch = TextSearch {
    keys: &["q"],
    fields: &["name", "description", "category", "subcategory"],
    mode: SearchMode::FullText,
    document: Some("search_vector"),
};

const PRODUCT_ACTIVE: SoftDelete = SoftDelete {
    field: "isActive",
    visible: true,
    override_param: "includeInactive",
};

/// `GET /api/products`
pub static PRODUCTS: EntitySchema = EntitySchema {
    entity: "product",
    fields: PRODUCT_FIELDS,
    filters: PRODUCT_FILTERS,
    search: Some(PRODUCT_TEXT),
    soft_delete: Some(PRODUCT_ACTIVE),
    sort_params: &["sortBy", "sort"],
    sort_aliases: &[
        ("priceAsc", "price"),
        ("priceDesc", "-price"),
        ("rating", "-ratingAverage"),
    ],
    default_sort: &[("createdAt", SortDirection::Desc)],
    default_limit: 12,
    max_limit: 100,
};

/// `GET /api/products/search`: ranked by relevance, so no sort keys.
pub static PRODUCT_SEARCH: EntitySchema = EntitySchema {
    entity: "product",
    fields: PRODUCT_FIELDS,
    filters: PRODUCT_FILTERS,
    search: Some(PRODUCT_TEXT),
    soft_delete: Some(PRODUCT_ACTIVE),
    sort_params: &[],
    sort_aliases: &[],
    default_sort: &[("createdAt", SortDirection::Desc)],
    default_limit: 12,
    max_limit: 50,
};

/// `GET /api/posts`
pub static POSTS: EntitySchema = EntitySchema {
    entity: "post",
    fields: &[
        FieldSpec::new("id", "id", Integer),
        FieldSpec::new("title", "title", Text),
        FieldSpec::new("slug", "slug", Text),
        FieldSpec::unsorted("content", "content", Text),
        FieldSpec::new("author", "author", Text),
        FieldSpec::unsorted("tags", "tags", TextArray),
        FieldSpec::new("category", "category", Label),
        FieldSpec::new("status", "status", Label),
        FieldSpec::new("publishedDate", "published_date", Timestamp),
        FieldSpec::new("views", "views", Integer),
        FieldSpec::new("likes", "likes", Integer),
        FieldSpec::new("createdAt", "created_at", Timestamp),
        FieldSpec::new("updatedAt", "updated_at", Timestamp),
    ],
    filters: &[
        param("category", "category", ParamRole::Equals),
        param("status", "status", ParamRole::Equals),
        param("author", "author", ParamRole::Equals),
        param("tags", "tags", ParamRole::AnyOf),
    ],
    search: Some(TextSearch {
        keys: &["search", "q"],
        fields: &["title", "content"],
        mode: SearchMode::FullText,
        document: None,
    }),
    soft_delete: None,
    sort_params: &["sort"],
    sort_aliases: &[],
    default_sort: &[("createdAt", SortDirection::Desc)],
    default_limit: 10,
    max_limit: 100,
};

/// `GET /api/tasks`
pub static TASKS: EntitySchema = EntitySchema {
    entity: "task",
    fields: &[
        FieldSpec::new("id", "id", Integer),
        FieldSpec::new("userId", "user_id", Integer),
        FieldSpec::new("title", "title", Text),
        FieldSpec::unsorted("description", "description", Text),
        FieldSpec::new("category", "category", Label),
        FieldSpec::new("priority", "priority", Label),
        FieldSpec::new("status", "status", Label),
        FieldSpec::new("dueDate", "due_date", Timestamp),
        FieldSpec::new("estimatedTime", "estimated_time", Integer),
        FieldSpec::new("actualTime", "actual_time", Integer),
        FieldSpec::unsorted("tags", "tags", TextArray),
        FieldSpec::new("completedAt", "completed_at", Timestamp),
        FieldSpec::new("createdAt", "created_at", Timestamp),
        FieldSpec::new("updatedAt", "updated_at", Timestamp),
    ],
    filters: &[
        param("userId", "userId", ParamRole::Equals),
        param("priority", "priority", ParamRole::Equals),
        param("status", "status", ParamRole::Equals),
        param("category", "category", ParamRole::Equals),
        param("fromDate", "dueDate", ParamRole::Above { inclusive: true }),
        param("toDate", "dueDate", ParamRole::Below { inclusive: true }),
        param("tags", "tags", ParamRole::AllOf),
    ],
    search: Some(TextSearch {
        keys: &["search", "q"],
        fields: &["title", "description", "tags"],
        mode: SearchMode::FullText,
        document: None,
    }),
    soft_delete: None,
    sort_params: &["sort"],
    sort_aliases: &[],
    default_sort: &[("dueDate", SortDirection::Asc)],
    default_limit: 20,
    max_limit: 100,
};

/// Every schema, for consistency checks.
pub static ALL: &[&EntitySchema] = &[&USERS, &PRODUCTS, &PRODUCT_SEARCH, &POSTS, &TASKS];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MAX_LIMIT;

    #[test]
    fn test_every_reference_resolves() {
        for schema in ALL {
            for p in schema.filters {
                assert!(
                    schema.field(p.field).is_some(),
                    "{}: filter {} names unknown field {}",
                    schema.entity,
                    p.key,
                    p.field
                );
            }
            if let Some(search) = schema.search {
                for f in search.fields {
                    assert!(schema.field(f).is_some(), "{}: search field {f}", schema.entity);
                }
                if search.document.is_some() {
                    assert_eq!(search.mode, SearchMode::FullText, "{}", schema.entity);
                }
            }
            if let Some(soft) = schema.soft_delete {
                let field = schema.field(soft.field);
                assert!(matches!(field.map(|f| f.kind), Some(FieldKind::Bool)));
            }
            for (name, _) in schema.default_sort {
                assert!(schema.field(name).is_some_and(|f| f.sortable));
            }
        }
    }

    #[test]
    fn test_limits_within_global_max() {
        for schema in ALL {
            assert!(schema.default_limit >= 1);
            assert!(schema.default_limit <= schema.max_limit);
            assert!(schema.max_limit <= MAX_LIMIT);
        }
    }

    #[test]
    fn test_field_names_unique() {
        for schema in ALL {
            let mut names: Vec<_> = schema.fields.iter().map(|f| f.name).collect();
            names.sort_unstable();
            let before = names.len();
            names.dedup();
            assert_eq!(before, names.len(), "{}", schema.entity);
        }
    }
}
