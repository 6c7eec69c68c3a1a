//! URL slugs for posts.
//!
//! A title is normalized to a base slug; collisions are resolved by probing
//! `base`, `base-1`, `base-2`, ... up to [`MAX_SUFFIX`]. The unique index on
//! `posts.slug` remains the final authority, so storage retries once when an
//! insert races another writer.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Longest base slug, before any numeric suffix.
pub const MAX_SLUG_LENGTH: usize = 200;

/// Highest numeric suffix tried before giving up.
pub const MAX_SUFFIX: u32 = 1000;

/// Used when a title contains nothing sluggable.
pub const FALLBACK_SLUG: &str = "post";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SlugError {
    #[error("no free slug for {base:?} after {attempts} attempts")]
    GenerationFailed { base: String, attempts: u32 },
}

/// A normalized, URL-safe slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(transparent))]
pub struct Slug(String);

impl Slug {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fold common Latin accented letters to ASCII.
const fn fold(c: char) -> Option<&'static str> {
    Some(match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "a",
        'æ' | 'Æ' => "ae",
        'ç' | 'Ç' => "c",
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => "i",
        'ñ' | 'Ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => "o",
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => "u",
        'ý' | 'ÿ' | 'Ý' => "y",
        'ß' => "ss",
        _ => return None,
    })
}

/// Normalize a title to its base slug.
///
/// ASCII letters and digits are kept (lower-cased), accented Latin letters
/// are folded, whitespace `-` and `_` collapse into single `-` separators,
/// and everything else is dropped. The result is truncated to
/// [`MAX_SLUG_LENGTH`] without a trailing separator, and falls back to
/// [`FALLBACK_SLUG`] when empty.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len().min(MAX_SLUG_LENGTH));
    let mut pending_separator = false;

    for c in title.chars() {
        let piece: Option<&str> = if c.is_ascii_alphanumeric() {
            None
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_separator = true;
            continue;
        } else if let Some(folded) = fold(c) {
            Some(folded)
        } else {
            continue;
        };

        if pending_separator && !out.is_empty() {
            out.push('-');
        }
        pending_separator = false;
        match piece {
            Some(s) => out.push_str(s),
            None => out.push(c.to_ascii_lowercase()),
        }
        if out.len() >= MAX_SLUG_LENGTH {
            break;
        }
    }

    out.truncate(MAX_SLUG_LENGTH);
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        return FALLBACK_SLUG.to_owned();
    }
    out
}

/// Candidate slugs for one base, in probe order.
#[derive(Debug, Clone)]
pub struct SlugCandidates {
    base: String,
    next: u32,
}

impl SlugCandidates {
    #[must_use]
    pub fn new(title: &str) -> Self {
        Self {
            base: normalize_title(title),
            next: 0,
        }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Error for when every candidate is taken.
    #[must_use]
    pub fn exhausted(&self) -> SlugError {
        SlugError::GenerationFailed {
            base: self.base.clone(),
            attempts: MAX_SUFFIX + 1,
        }
    }
}

impl Iterator for SlugCandidates {
    type Item = Slug;

    fn next(&mut self) -> Option<Slug> {
        let n = self.next;
        if n > MAX_SUFFIX {
            return None;
        }
        self.next += 1;
        Some(Slug(if n == 0 {
            self.base.clone()
        } else {
            format!("{}-{n}", self.base)
        }))
    }
}

/// First candidate for `title` that `exists` reports as free.
///
/// # Errors
///
/// Returns [`SlugError::GenerationFailed`] when the base and every suffix up
/// to [`MAX_SUFFIX`] are taken.
pub fn generate_slug(title: &str, mut exists: impl FnMut(&str) -> bool) -> Result<Slug, SlugError> {
    let mut candidates = SlugCandidates::new(title);
    let found = candidates.by_ref().find(|slug| !exists(slug.as_str()));
    found.ok_or_else(|| candidates.exhausted())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_title("Hello World"), "hello-world");
        assert_eq!(normalize_title("  Rust -- 2024: what's new?  "), "rust-2024-whats-new");
        assert_eq!(normalize_title("snake_case_title"), "snake-case-title");
        assert_eq!(normalize_title("Café Crème"), "cafe-creme");
        assert_eq!(normalize_title("!!!"), FALLBACK_SLUG);
        assert_eq!(normalize_title(""), FALLBACK_SLUG);
    }

    #[test]
    fn test_normalize_truncates_without_trailing_separator() {
        let title = format!("{} tail", "a".repeat(199));
        let slug = normalize_title(&title);
        assert_eq!(slug.len(), 199);
        assert!(!slug.ends_with('-'));

        let long = "word ".repeat(100);
        assert!(normalize_title(&long).len() <= MAX_SLUG_LENGTH);
    }

    #[test]
    fn test_generate_appends_suffix_on_collision() {
        let mut taken = HashSet::new();

        let first = generate_slug("Hello World", |s| taken.contains(s)).unwrap();
        assert_eq!(first.as_str(), "hello-world");
        taken.insert(first.into_inner());

        let second = generate_slug("Hello World", |s| taken.contains(s)).unwrap();
        assert_eq!(second.as_str(), "hello-world-1");
        taken.insert(second.into_inner());

        let third = generate_slug("hello   world!", |s| taken.contains(s)).unwrap();
        assert_eq!(third.as_str(), "hello-world-2");
    }

    #[test]
    fn test_generate_gives_up() {
        let err = generate_slug("busy", |_| true).unwrap_err();
        assert_eq!(
            err,
            SlugError::GenerationFailed {
                base: "busy".into(),
                attempts: MAX_SUFFIX + 1
            }
        );
    }

    #[test]
    fn test_candidates_last_suffix() {
        let last = SlugCandidates::new("x").last().unwrap();
        assert_eq!(last.as_str(), "x-1000");
        assert_eq!(SlugCandidates::new("x").count(), 1001);
    }
}
