//! Test configuration helpers

use rippl::{Config, TermFilter};
use std::time::Duration;

/// Configuration for `sources` with short timings suited to tests
///
/// The dispatch period is 200ms and eager dispatch stays enabled.
pub fn test_config(sources: &[&str]) -> Config {
    Config {
        sources: sources.iter().map(|s| s.to_string()).collect(),
        poll_interval: Some(Duration::from_millis(200)),
        shutdown_grace: Duration::from_secs(1),
        ..Default::default()
    }
}

/// [`test_config`] with a title filter
pub fn filtered_config(sources: &[&str], terms: &[&str]) -> Config {
    Config {
        filter_terms: TermFilter::new(terms.iter().copied()),
        ..test_config(sources)
    }
}
