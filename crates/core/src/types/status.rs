//! Enumerations stored as `PostgreSQL` enum types.
//!
//! Every enum round-trips through the exact label used on the wire and in the
//! database (`"In Progress"`, `"published"`, ...), so query-string filters can
//! compare against the label directly.

use serde::{Deserialize, Serialize};

/// Error returned when a label does not name a variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value:?} (expected one of {expected})")]
pub struct InvalidLabel {
    /// Enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
    /// Accepted labels, comma separated.
    pub expected: &'static str,
}

macro_rules! labelled_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The wire and database label.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = InvalidLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok(Self::$variant),)+
                    _ => Err(InvalidLabel {
                        kind: $kind,
                        value: s.to_owned(),
                        expected: concat!($($label, ", "),+),
                    }),
                }
            }
        }
    };
}

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
    Manager,
    Guest,
}

labelled_enum!(UserRole, "role", {
    Admin => "admin",
    User => "user",
    Manager => "manager",
    Guest => "guest",
});

/// Publication status of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "post_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    /// Soft-deleted.
    Archived,
}

labelled_enum!(PostStatus, "status", {
    Draft => "draft",
    Published => "published",
    Archived => "archived",
});

/// Post category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "post_category"))]
pub enum PostCategory {
    Technology,
    Business,
    Lifestyle,
    Education,
    Other,
}

labelled_enum!(PostCategory, "category", {
    Technology => "Technology",
    Business => "Business",
    Lifestyle => "Lifestyle",
    Education => "Education",
    Other => "Other",
});

/// Task workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "task_status"))]
pub enum TaskStatus {
    #[default]
    Todo,
    #[serde(rename = "In Progress")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "In Progress"))]
    InProgress,
    Review,
    Completed,
    Cancelled,
}

labelled_enum!(TaskStatus, "status", {
    Todo => "Todo",
    InProgress => "In Progress",
    Review => "Review",
    Completed => "Completed",
    Cancelled => "Cancelled",
});

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "task_priority"))]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

labelled_enum!(TaskPriority, "priority", {
    Low => "Low",
    Medium => "Medium",
    High => "High",
    Critical => "Critical",
});

/// Task category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "task_category"))]
pub enum TaskCategory {
    #[default]
    Assignment,
    Project,
    Exam,
    Reading,
    Research,
    Personal,
    Other,
}

labelled_enum!(TaskCategory, "category", {
    Assignment => "Assignment",
    Project => "Project",
    Exam => "Exam",
    Reading => "Reading",
    Research => "Research",
    Personal => "Personal",
    Other => "Other",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), *status);
        }
        for role in UserRole::ALL {
            assert_eq!(role.to_string().parse::<UserRole>().unwrap(), *role);
        }
    }

    #[test]
    fn test_serde_matches_label() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");
        let json = serde_json::to_string(&PostStatus::Published).unwrap();
        assert_eq!(json, "\"published\"");
    }

    #[test]
    fn test_invalid_label_lists_expected() {
        let err = "superuser".parse::<UserRole>().unwrap_err();
        assert_eq!(err.kind, "role");
        assert!(err.expected.contains("manager"));
    }

    #[test]
    fn test_labels_are_case_sensitive() {
        assert!("technology".parse::<PostCategory>().is_err());
        assert!("Technology".parse::<PostCategory>().is_ok());
    }
}
