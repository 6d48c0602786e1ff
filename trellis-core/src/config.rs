//! Runtime Configuration
//!
//! A [`RuntimeConfig`] is handed to [`Runtime::with_config`](crate::Runtime::with_config).
//! Every field has a default, so partial JSON documents are accepted:
//!
//! ```rust,ignore
//! let config = RuntimeConfig::from_json(r#"{ "dev_warnings": false }"#)?;
//! let rt = Runtime::with_config(config);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on microtasks executed by a single drain.
    ///
    /// A job that keeps re-queueing itself would otherwise spin forever.
    /// When the bound is hit the remaining microtasks stay queued and a
    /// warning is logged.
    pub max_microtask_turns: usize,

    /// Log a warning when lifecycle or provide/inject helpers are called
    /// outside of a component's setup.
    pub dev_warnings: bool,

    /// Longest list a `length` or index write may produce. Writes beyond it
    /// are ignored with a warning instead of allocating.
    pub max_list_len: usize,
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the microtask bound.
    pub fn max_microtask_turns(mut self, turns: usize) -> Self {
        self.max_microtask_turns = turns;
        self
    }

    /// Set the longest list a `length` or index write may produce.
    pub fn max_list_len(mut self, len: usize) -> Self {
        self.max_list_len = len;
        self
    }

    /// Enable or disable misuse warnings.
    pub fn dev_warnings(mut self, enabled: bool) -> Self {
        self.dev_warnings = enabled;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_microtask_turns: 10_000,
            dev_warnings: true,
            max_list_len: 1 << 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config = RuntimeConfig::from_json(r#"{ "dev_warnings": false }"#).unwrap();
        assert!(!config.dev_warnings);
        assert_eq!(config.max_microtask_turns, 10_000);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = RuntimeConfig::from_json("{ nope").unwrap_err();
        assert!(err.to_string().starts_with("invalid runtime configuration"));
    }

    #[test]
    fn builder_setters() {
        let config = RuntimeConfig::default()
            .max_microtask_turns(3)
            .dev_warnings(false)
            .max_list_len(8);
        assert_eq!(config.max_microtask_turns, 3);
        assert_eq!(config.max_list_len, 8);
        assert!(!config.dev_warnings);
    }
}
