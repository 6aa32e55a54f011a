//! Collection settings.

use serde::{Deserialize, Serialize};

use crate::collect::error::CollectError;

/// Settings fixed for the lifetime of one [`Collector`](crate::collect::Collector).
///
/// Deserializable so callers can keep them next to their own job
/// configuration; every field has a default.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollectOptions {
    /// Number of trailing path components kept per file row; the rest is
    /// deduplicated into the prefix registry.
    pub prefix_depth: usize,

    /// Path component separator.
    pub separator: char,

    /// Worker threads for [`Collector::collect_all`](crate::collect::Collector::collect_all).
    /// `None` uses rayon's default.
    pub threads: Option<usize>,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            prefix_depth: 1,
            separator: '/',
            threads: None,
        }
    }
}

impl CollectOptions {
    /// Set the prefix depth.
    pub fn with_prefix_depth(mut self, prefix_depth: usize) -> Self {
        self.prefix_depth = prefix_depth;
        self
    }

    /// Set the worker thread count for parallel collection.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Reject settings the collector cannot honor.
    pub fn validate(&self) -> Result<(), CollectError> {
        if self.prefix_depth == 0 {
            return Err(CollectError::InvalidOptions {
                msg: "prefix_depth must be at least 1".to_string(),
            });
        }
        if self.threads == Some(0) {
            return Err(CollectError::InvalidOptions {
                msg: "threads must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let opts = CollectOptions::default();
        assert_eq!(opts.prefix_depth, 1);
        assert_eq!(opts.separator, '/');
        opts.validate().unwrap();
    }

    #[test]
    fn zero_prefix_depth_is_rejected() {
        let err = CollectOptions::default()
            .with_prefix_depth(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, CollectError::InvalidOptions { .. }));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let opts: CollectOptions = serde_json::from_str(r#"{"prefix_depth": 2}"#).unwrap();
        assert_eq!(opts.prefix_depth, 2);
        assert_eq!(opts.separator, '/');
        assert_eq!(opts.threads, None);
    }
}
