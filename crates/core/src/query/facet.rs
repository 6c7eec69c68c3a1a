//! Facet counts returned next to search results.

use serde::Serialize;

/// Number of matching records sharing one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facet {
    pub value: String,
    pub count: u64,
}

impl Facet {
    #[must_use]
    pub fn new(value: impl Into<String>, count: u64) -> Self {
        Self {
            value: value.into(),
            count,
        }
    }
}

/// Order facets by count (descending), then value, and drop empty buckets.
#[must_use]
pub fn rank_facets(mut facets: Vec<Facet>) -> Vec<Facet> {
    facets.retain(|f| f.count > 0);
    facets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    facets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_orders_by_count_then_value() {
        let ranked = rank_facets(vec![
            Facet::new("Books", 2),
            Facet::new("Audio", 5),
            Facet::new("Apparel", 2),
            Facet::new("Empty", 0),
        ]);
        let values: Vec<_> = ranked.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values, ["Audio", "Apparel", "Books"]);
    }
}
