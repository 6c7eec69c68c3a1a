//! Field projection (`fields=name,email`).

use serde_json::{Map, Value};

use super::QueryError;
use super::schema::EntitySchema;

/// Fields to keep in each returned record; `id` is always included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection(Vec<&'static str>);

impl Projection {
    /// Parse a comma-separated field list. Returns `None` for an absent or
    /// blank list.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidField`] for a name the schema does not
    /// define.
    pub fn parse(expr: Option<&str>, schema: &EntitySchema) -> Result<Option<Self>, QueryError> {
        let mut fields = vec!["id"];
        for name in expr.unwrap_or_default().split(',').map(str::trim) {
            if name.is_empty() {
                continue;
            }
            let field = schema.field(name).ok_or_else(|| QueryError::InvalidField {
                field: name.to_owned(),
                allowed: schema.field_names(),
            })?;
            if !fields.contains(&field.name) {
                fields.push(field.name);
            }
        }
        if fields.len() == 1 {
            return Ok(None);
        }
        Ok(Some(Self(fields)))
    }

    #[must_use]
    pub fn fields(&self) -> &[&'static str] {
        &self.0
    }

    /// Drop every key of a serialized record that is not projected.
    #[must_use]
    pub fn apply(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let kept: Map<String, Value> = map
                    .into_iter()
                    .filter(|(k, _)| self.0.contains(&k.as_str()))
                    .collect();
                Value::Object(kept)
            }
            other => other,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::query::schema::USERS;

    #[test]
    fn test_parse_keeps_id_and_order() {
        let p = Projection::parse(Some("email, name,email"), &USERS)
            .unwrap()
            .unwrap();
        assert_eq!(p.fields(), &["id", "email", "name"]);
        assert!(Projection::parse(Some(" "), &USERS).unwrap().is_none());
        assert!(Projection::parse(None, &USERS).unwrap().is_none());
    }

    #[test]
    fn test_unknown_field() {
        assert!(matches!(
            Projection::parse(Some("name,passwordHash"), &USERS),
            Err(QueryError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_apply() {
        let p = Projection::parse(Some("name"), &USERS).unwrap().unwrap();
        let out = p.apply(json!({"id": 1, "name": "Ann", "email": "a@b.co", "age": 30}));
        assert_eq!(out, json!({"id": 1, "name": "Ann"}));
    }
}
