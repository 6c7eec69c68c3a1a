//! Sort expression parsing (`-age,name`).

use serde::Serialize;

use super::QueryError;
use super::schema::EntitySchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One `(field, direction)` pair; earlier keys take precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub field: &'static str,
    pub direction: SortDirection,
}

impl SortKey {
    #[must_use]
    pub const fn asc(field: &'static str) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    #[must_use]
    pub const fn desc(field: &'static str) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }
}

/// The schema's default ordering.
#[must_use]
pub fn default_sort(schema: &EntitySchema) -> Vec<SortKey> {
    schema
        .default_sort
        .iter()
        .map(|&(field, direction)| SortKey { field, direction })
        .collect()
}

/// Parse a comma-separated sort expression against `schema`.
///
/// Blank tokens are skipped and a repeated field keeps its first position.
/// A token equal to one of the schema's aliases is replaced by the alias
/// expansion before validation. An absent or empty expression yields the
/// schema default.
///
/// # Errors
///
/// Returns [`QueryError::InvalidField`] for a token that names no sortable
/// field.
pub fn parse_sort(expr: Option<&str>, schema: &EntitySchema) -> Result<Vec<SortKey>, QueryError> {
    let mut keys: Vec<SortKey> = Vec::new();

    for token in expr.unwrap_or_default().split(',').map(str::trim) {
        if token.is_empty() {
            continue;
        }
        let token = schema
            .sort_aliases
            .iter()
            .find(|(alias, _)| *alias == token)
            .map_or(token, |&(_, expansion)| expansion);

        let (name, direction) = match token.strip_prefix('-') {
            Some(rest) => (rest, SortDirection::Desc),
            None => (token, SortDirection::Asc),
        };

        let field = schema
            .field(name)
            .filter(|f| f.sortable)
            .ok_or_else(|| QueryError::InvalidField {
                field: name.to_owned(),
                allowed: schema.sortable_names(),
            })?;

        if keys.iter().all(|k| k.field != field.name) {
            keys.push(SortKey {
                field: field.name,
                direction,
            });
        }
    }

    if keys.is_empty() {
        return Ok(default_sort(schema));
    }
    Ok(keys)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::query::schema::{PRODUCTS, TASKS, USERS};

    #[test]
    fn test_mixed_directions_keep_order() {
        let keys = parse_sort(Some("-age,name"), &USERS).unwrap();
        assert_eq!(keys, vec![SortKey::desc("age"), SortKey::asc("name")]);
    }

    #[test]
    fn test_default_when_absent_or_blank() {
        assert_eq!(
            parse_sort(None, &USERS).unwrap(),
            vec![SortKey::desc("createdAt")]
        );
        assert_eq!(
            parse_sort(Some(" , "), &USERS).unwrap(),
            vec![SortKey::desc("createdAt")]
        );
        assert_eq!(parse_sort(None, &TASKS).unwrap(), vec![SortKey::asc("dueDate")]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse_sort(Some("name,password"), &USERS).unwrap_err();
        assert!(matches!(err, QueryError::InvalidField { ref field, .. } if field == "password"));
        // present but not sortable
        assert!(parse_sort(Some("deleted"), &USERS).is_err());
        assert!(parse_sort(Some("-"), &USERS).is_err());
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let keys = parse_sort(Some("name,-age,-name"), &USERS).unwrap();
        assert_eq!(keys, vec![SortKey::asc("name"), SortKey::desc("age")]);
    }

    #[test]
    fn test_product_aliases() {
        assert_eq!(
            parse_sort(Some("priceDesc"), &PRODUCTS).unwrap(),
            vec![SortKey::desc("price")]
        );
        assert_eq!(
            parse_sort(Some("rating,priceAsc"), &PRODUCTS).unwrap(),
            vec![SortKey::desc("ratingAverage"), SortKey::asc("price")]
        );
    }
}
