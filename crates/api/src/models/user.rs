//! User domain types.
//!
//! These types represent validated domain objects separate from database row types.

use bazaar_core::{Email, UserId, UserRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ValidationError, parse_label, required_text};

const MAX_NAME_LENGTH: usize = 100;
const MAX_AGE: i32 = 120;

/// A user account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Lower-cased; unique across users.
    pub email: Email,
    pub age: Option<i32>,
    pub role: UserRole,
    /// Soft-delete flag.
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `POST /api/users` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserInput {
    pub name: String,
    pub email: String,
    pub age: Option<i32>,
    pub role: Option<String>,
}

/// A validated user ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: Email,
    pub age: Option<i32>,
    pub role: UserRole,
}

fn validate_age(age: Option<i32>) -> Result<Option<i32>, ValidationError> {
    match age {
        Some(a) if !(0..=MAX_AGE).contains(&a) => Err(ValidationError::new(
            "age",
            format!("must be between 0 and {MAX_AGE}"),
        )),
        other => Ok(other),
    }
}

fn validate_email(raw: &str) -> Result<Email, ValidationError> {
    Email::parse(raw).map_err(|e| ValidationError::new("email", e.to_string()))
}

impl NewUserInput {
    /// # Errors
    ///
    /// Returns the first field that breaks a rule.
    pub fn validate(self) -> Result<NewUser, ValidationError> {
        Ok(NewUser {
            name: required_text("name", &self.name, MAX_NAME_LENGTH)?,
            email: validate_email(&self.email)?,
            age: validate_age(self.age)?,
            role: self
                .role
                .as_deref()
                .map(|r| parse_label("role", r))
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

/// `PATCH /api/users/{id}` body. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatchInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i32>,
    pub role: Option<String>,
}

/// A validated partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<Email>,
    pub age: Option<i32>,
    pub role: Option<UserRole>,
}

impl UserPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.age.is_none() && self.role.is_none()
    }
}

impl UserPatchInput {
    /// # Errors
    ///
    /// Returns the first field that breaks a rule.
    pub fn validate(self) -> Result<UserPatch, ValidationError> {
        Ok(UserPatch {
            name: self
                .name
                .as_deref()
                .map(|n| required_text("name", n, MAX_NAME_LENGTH))
                .transpose()?,
            email: self.email.as_deref().map(validate_email).transpose()?,
            age: validate_age(self.age)?,
            role: self
                .role
                .as_deref()
                .map(|r| parse_label("role", r))
                .transpose()?,
        })
    }
}

/// `POST /api/users/bulk-update` body. `filter` takes the list query keys
/// (`role`, `age_gt`, `age_lt`, `q`, `includeDeleted`).
#[derive(Debug, Clone, Deserialize)]
pub struct BulkUpdateInput {
    #[serde(default)]
    pub filter: Map<String, Value>,
    pub update: UserPatchInput,
}

/// `POST /api/users/bulk-delete` body.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkDeleteInput {
    #[serde(default)]
    pub filter: Map<String, Value>,
}

/// One item of `POST /api/users/upsert`, keyed by email.
#[derive(Debug, Clone, Deserialize)]
pub struct UserUpsertInput {
    pub email: String,
    pub name: Option<String>,
    pub age: Option<i32>,
    pub role: Option<String>,
}

/// A validated upsert. Absent fields keep their stored value on an existing
/// user; a new user needs a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUpsert {
    pub email: Email,
    pub name: Option<String>,
    pub age: Option<i32>,
    pub role: Option<UserRole>,
}

impl UserUpsertInput {
    /// # Errors
    ///
    /// Returns the first field that breaks a rule.
    pub fn validate(self) -> Result<UserUpsert, ValidationError> {
        Ok(UserUpsert {
            email: validate_email(&self.email)?,
            name: self
                .name
                .as_deref()
                .map(|n| required_text("name", n, MAX_NAME_LENGTH))
                .transpose()?,
            age: validate_age(self.age)?,
            role: self
                .role
                .as_deref()
                .map(|r| parse_label("role", r))
                .transpose()?,
        })
    }
}

/// Counts returned by `bulk-update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdated {
    /// Users the filter selected.
    pub matched_count: u64,
    /// Users whose stored values actually changed.
    pub modified_count: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input() -> NewUserInput {
        NewUserInput {
            name: " Ann Lee ".into(),
            email: "Ann@Example.com".into(),
            age: Some(34),
            role: None,
        }
    }

    #[test]
    fn test_validate_normalizes() {
        let user = input().validate().unwrap();
        assert_eq!(user.name, "Ann Lee");
        assert_eq!(user.email.as_str(), "ann@example.com");
        assert_eq!(user.role, UserRole::User);
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut bad = input();
        bad.age = Some(121);
        assert_eq!(bad.validate().unwrap_err().field, "age");

        let mut bad = input();
        bad.role = Some("root".into());
        assert_eq!(bad.validate().unwrap_err().field, "role");

        let mut bad = input();
        bad.email = "nope".into();
        assert_eq!(bad.validate().unwrap_err().field, "email");
    }

    #[test]
    fn test_patch() {
        let patch = UserPatchInput {
            role: Some("manager".into()),
            ..UserPatchInput::default()
        }
        .validate()
        .unwrap();
        assert_eq!(patch.role, Some(UserRole::Manager));
        assert!(!patch.is_empty());
        assert!(UserPatchInput::default().validate().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_fields_are_optional_except_email() {
        let upsert = UserUpsertInput {
            email: "Bo@Example.com".into(),
            name: None,
            age: None,
            role: Some("guest".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(upsert.email.as_str(), "bo@example.com");
        assert_eq!(upsert.name, None);
        assert_eq!(upsert.role, Some(UserRole::Guest));

        let bad = UserUpsertInput {
            email: "bo@example.com".into(),
            name: Some("  ".into()),
            age: None,
            role: None,
        };
        assert_eq!(bad.validate().unwrap_err().field, "name");
    }

    #[test]
    fn test_bulk_bodies() {
        let body: BulkUpdateInput = serde_json::from_value(serde_json::json!({
            "filter": {"role": "guest", "age_gt": 30},
            "update": {"role": "user"}
        }))
        .unwrap();
        assert_eq!(body.filter.len(), 2);
        assert_eq!(body.update.role.as_deref(), Some("user"));

        let body: BulkDeleteInput = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(body.filter.is_empty());

        let counts = serde_json::to_value(BulkUpdated {
            matched_count: 3,
            modified_count: 2,
        })
        .unwrap();
        assert_eq!(counts, serde_json::json!({"matchedCount": 3, "modifiedCount": 2}));
    }
}
