use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{DEFAULT_CATEGORY, DEFAULT_PERIOD_SECS};

/// A scheduling/policy bucket that services opt into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    /// Probe period, always positive.
    pub period_seconds: u64,
    pub is_resilient: bool,
    pub enabled: bool,
    /// Whether an unhealthy `/__gtg` observation auto-disables the category.
    pub sticky: bool,
}

impl Category {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }

    /// The synthetic `"default"` category, always present (§3 invariant).
    pub fn default_category() -> Self {
        Self {
            name: DEFAULT_CATEGORY.to_string(),
            period_seconds: DEFAULT_PERIOD_SECS,
            is_resilient: false,
            enabled: true,
            sticky: false,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::default_category()
    }
}
