use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generic descriptive text attached to every cluster-health check, carried
/// over from the original `go-fthealth` style checks (not service-specific,
/// since the distillation doesn't specify per-service copy).
pub const BUSINESS_IMPACT: &str =
    "On its own this failure does not have a business impact but it represents a degradation of the cluster health.";
pub const PANIC_GUIDE: &str = "https://runbooks.internal/aggregate-healthcheck";
pub const TECHNICAL_SUMMARY: &str = "The service is not healthy. Please check the panic guide.";

/// The outcome of probing a single service once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    /// 1 = critical, 2 = warning; lower is worse.
    pub severity: u8,
    pub output: String,
    pub last_updated: DateTime<Utc>,
    pub business_impact: String,
    pub panic_guide: String,
    pub technical_summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ack: String,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, severity: u8, ok: bool, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok,
            severity,
            output: output.into(),
            last_updated: Utc::now(),
            business_impact: BUSINESS_IMPACT.to_string(),
            panic_guide: PANIC_GUIDE.to_string(),
            technical_summary: TECHNICAL_SUMMARY.to_string(),
            ack: String::new(),
        }
    }
}

/// Aggregate envelope returned by both the per-service cache cell (holding
/// exactly one check) and the cluster-wide aggregator (holding many).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResult {
    pub name: String,
    pub description: String,
    pub schema_version: u8,
    pub ok: bool,
    pub severity: u8,
    pub checks: Vec<CheckResult>,
}

impl Default for HealthResult {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            schema_version: 1,
            ok: false,
            severity: 2,
            checks: Vec::new(),
        }
    }
}

impl HealthResult {
    pub fn single(check: CheckResult) -> Self {
        Self {
            name: check.name.clone(),
            description: String::new(),
            schema_version: 1,
            ok: check.ok,
            severity: check.severity,
            checks: vec![check],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_health_result_is_zero_value() {
        let hr = HealthResult::default();
        assert!(hr.checks.is_empty());
        assert_eq!(hr.schema_version, 1);
        assert!(!hr.ok);
    }

    #[test]
    fn single_wraps_exactly_one_check() {
        let check = CheckResult::new("foo", 2, true, "");
        let hr = HealthResult::single(check.clone());
        assert_eq!(hr.checks, vec![check]);
        assert!(hr.ok);
    }
}
