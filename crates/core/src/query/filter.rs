//! Filter builder: raw query-string values to a structured predicate set.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use super::schema::{EntitySchema, FieldKind, FieldSpec, ParamRole, SearchMode};
use super::{QueryError, RawParams};

/// Key under which the free-text predicate is stored in a [`FilterSet`].
pub const SEARCH_KEY: &str = "search";

/// A typed filter operand.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

/// One end of a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bound {
    pub value: FilterValue,
    pub inclusive: bool,
}

/// Condition on a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Predicate {
    Equals { value: FilterValue },
    Range {
        min: Option<Bound>,
        max: Option<Bound>,
    },
    In { values: BTreeSet<FilterValue> },
    /// Array field contains every value.
    All { values: BTreeSet<FilterValue> },
    TextSearch {
        query: String,
        fields: Vec<&'static str>,
        mode: SearchMode,
    },
}

/// Predicates keyed by field name.
///
/// Backed by a `BTreeMap` so two sets built from the same input compare equal
/// and render SQL in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FilterSet(BTreeMap<&'static str, Predicate>);

impl FilterSet {
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Predicate> {
        self.0.get(field)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Predicate)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    /// Add or replace the predicate on `field`.
    pub fn insert(&mut self, field: &'static str, predicate: Predicate) {
        self.0.insert(field, predicate);
    }

    /// Remove and return the predicate on `field`.
    pub fn remove(&mut self, field: &str) -> Option<Predicate> {
        self.0.remove(field)
    }

    fn set_bound(&mut self, field: &'static str, bound: Bound, upper: bool) {
        let entry = self.0.entry(field).or_insert(Predicate::Range {
            min: None,
            max: None,
        });
        if !matches!(entry, Predicate::Range { .. }) {
            *entry = Predicate::Range {
                min: None,
                max: None,
            };
        }
        if let Predicate::Range { min, max } = entry {
            if upper {
                *max = Some(bound);
            } else {
                *min = Some(bound);
            }
        }
    }
}

/// Returns the trimmed value of `key`, treating blank values as absent.
pub(crate) fn non_empty<'a>(raw: &'a RawParams, key: &str) -> Option<&'a str> {
    raw.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Build the predicate set for `schema` from raw query parameters.
///
/// Unknown keys are ignored. The soft-delete flag, when the schema has one,
/// is applied unless its override parameter is `true`.
///
/// # Errors
///
/// Returns [`QueryError::InvalidParameter`] when a value cannot be parsed as
/// its field's type.
pub fn build_filter(raw: &RawParams, schema: &EntitySchema) -> Result<FilterSet, QueryError> {
    let mut set = FilterSet::default();

    for param in schema.filters {
        let Some(value) = non_empty(raw, param.key) else {
            continue;
        };
        let Some(field) = schema.field(param.field) else {
            continue;
        };

        match param.role {
            ParamRole::Equals => {
                let value = parse_value(param.key, value, field)?;
                set.insert(field.name, Predicate::Equals { value });
            }
            ParamRole::Above { inclusive } | ParamRole::Below { inclusive } => {
                let upper = matches!(param.role, ParamRole::Below { .. });
                let bound = parse_bound(param.key, value, field, inclusive, upper)?;
                set.set_bound(field.name, bound, upper);
            }
            ParamRole::AnyOf | ParamRole::AllOf => {
                let values = value
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| parse_value(param.key, v, field))
                    .collect::<Result<BTreeSet<_>, _>>()?;
                if values.is_empty() {
                    continue;
                }
                let predicate = if param.role == ParamRole::AnyOf {
                    Predicate::In { values }
                } else {
                    Predicate::All { values }
                };
                set.insert(field.name, predicate);
            }
        }
    }

    if let Some(search) = schema.search
        && let Some(query) = search.keys.iter().find_map(|key| non_empty(raw, key))
    {
        set.insert(
            SEARCH_KEY,
            Predicate::TextSearch {
                query: query.to_owned(),
                fields: search.fields.to_vec(),
                mode: search.mode,
            },
        );
    }

    if let Some(soft) = schema.soft_delete {
        let include_hidden = match non_empty(raw, soft.override_param) {
            Some(v) => parse_bool(soft.override_param, v)?,
            None => false,
        };
        if !include_hidden && let Some(field) = schema.field(soft.field) {
            set.insert(
                field.name,
                Predicate::Equals {
                    value: FilterValue::Bool(soft.visible),
                },
            );
        }
    }

    Ok(set)
}

fn invalid(param: &str, value: &str, expected: &'static str) -> QueryError {
    QueryError::InvalidParameter {
        param: param.to_owned(),
        value: value.to_owned(),
        expected,
    }
}

fn parse_bool(param: &str, value: &str) -> Result<bool, QueryError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(param, value, "true or false")),
    }
}

fn parse_value(param: &str, value: &str, field: &FieldSpec) -> Result<FilterValue, QueryError> {
    match field.kind {
        FieldKind::Text | FieldKind::Label => Ok(FilterValue::Text(value.to_owned())),
        FieldKind::TextArray => Ok(FilterValue::Text(value.to_lowercase())),
        FieldKind::Integer => value
            .parse::<i64>()
            .map(FilterValue::Integer)
            .map_err(|_| invalid(param, value, "an integer")),
        FieldKind::Decimal => Decimal::from_str(value)
            .map(FilterValue::Decimal)
            .map_err(|_| invalid(param, value, "a number")),
        FieldKind::Bool => parse_bool(param, value).map(FilterValue::Bool),
        FieldKind::Timestamp => parse_timestamp(value)
            .map(FilterValue::Timestamp)
            .ok_or_else(|| invalid(param, value, "an RFC 3339 timestamp or YYYY-MM-DD date")),
    }
}

/// Parse one end of a range.
///
/// Integer fields also take decimal bounds: a fractional lower bound becomes
/// an inclusive ceiling, a fractional upper bound an inclusive floor, so
/// `age_gt=18.5` matches the same rows as `age >= 19`.
fn parse_bound(
    param: &str,
    value: &str,
    field: &FieldSpec,
    inclusive: bool,
    upper: bool,
) -> Result<Bound, QueryError> {
    if field.kind != FieldKind::Integer {
        return Ok(Bound {
            value: parse_value(param, value, field)?,
            inclusive,
        });
    }
    if let Ok(n) = value.parse::<i64>() {
        return Ok(Bound {
            value: FilterValue::Integer(n),
            inclusive,
        });
    }

    let number = Decimal::from_str(value).map_err(|_| invalid(param, value, "a number"))?;
    let (rounded, inclusive) = if number.fract().is_zero() {
        (number, inclusive)
    } else if upper {
        (number.floor(), true)
    } else {
        (number.ceil(), true)
    };
    let n = rounded
        .to_i64()
        .ok_or_else(|| invalid(param, value, "a number in the integer range"))?;
    Ok(Bound {
        value: FilterValue::Integer(n),
        inclusive,
    })
}

/// Accepts RFC 3339 or a bare date (midnight UTC).
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
