//! Row-count retention policy.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Bounds the number of persisted rows.
///
/// `max_rows == 0` disables retention. `batch_size` is always at least 1,
/// whatever the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RetentionSpec")]
pub struct RetentionPolicy {
    max_rows: u64,
    batch_size: u64,
}

/// Retention settings as written in a config file, before clamping.
#[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema)]
pub struct RetentionSpec {
    /// Maximum rows kept in the table; 0 or negative disables the limit.
    #[serde(default)]
    pub max_rows: i64,

    /// Rows removed per truncation pass. Defaults to 10% of `max_rows`.
    #[serde(default)]
    pub batch_size: Option<i64>,
}

impl From<RetentionSpec> for RetentionPolicy {
    fn from(spec: RetentionSpec) -> Self {
        RetentionPolicy::new(spec.max_rows, spec.batch_size)
    }
}

impl RetentionPolicy {
    /// Build a policy, clamping out-of-range inputs.
    pub fn new(max_rows: i64, batch_size: Option<i64>) -> Self {
        let max_rows = max_rows.max(0);
        let batch_size = batch_size.unwrap_or(max_rows / 10).max(1);
        Self {
            max_rows: max_rows as u64,
            batch_size: batch_size as u64,
        }
    }

    /// A policy that never truncates.
    pub fn disabled() -> Self {
        Self::new(0, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.max_rows > 0
    }

    pub fn max_rows(&self) -> u64 {
        self.max_rows
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Number of newest rows a truncation pass keeps.
    pub fn keep_rows(&self) -> u64 {
        self.max_rows.saturating_sub(self.batch_size)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}
