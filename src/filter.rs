//! Content filter applied to every post before it is offered for download.

use serde::{Deserialize, Serialize};

/// Ordered set of case-sensitive substrings
///
/// An empty set matches every post. Otherwise a post matches when its text
/// contains at least one of the terms.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermFilter {
    terms: Vec<String>,
}

impl TermFilter {
    /// Build a filter from terms, dropping empty ones
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            terms: terms
                .into_iter()
                .map(Into::into)
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Parse a comma-separated list, trimming each term
    pub fn from_csv(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim))
    }

    /// Terms in configuration order
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// True when no terms are configured
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether `text` passes the filter
    pub fn matches(&self, text: &str) -> bool {
        self.terms.is_empty() || self.terms.iter().any(|term| text.contains(term.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let filter = TermFilter::default();
        assert!(filter.matches("anything at all"));
        assert!(filter.matches(""));
    }

    #[test]
    fn matches_any_configured_term() {
        let filter = TermFilter::new(["cat", "dog"]);
        assert!(filter.matches("I have a cat"));
        assert!(filter.matches("a dog and a cat"));
        assert!(!filter.matches("I have a fish"));
    }

    #[test]
    fn matching_is_case_sensitive_substring() {
        let filter = TermFilter::new(["Cat"]);
        assert!(!filter.matches("I have a cat"));
        assert!(filter.matches("Catalog"));
    }

    #[test]
    fn csv_terms_are_trimmed_and_blanks_dropped() {
        let filter = TermFilter::from_csv(" cat , dog,, ");
        assert_eq!(filter.terms(), ["cat".to_string(), "dog".to_string()]);
        assert!(!filter.matches("fish"));
    }

    #[test]
    fn blank_csv_is_match_all() {
        assert!(TermFilter::from_csv("").is_empty());
        assert!(TermFilter::from_csv(" , ").matches("fish"));
    }
}
