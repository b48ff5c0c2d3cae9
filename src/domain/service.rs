use serde::{Deserialize, Serialize};

/// A discovered service under observation.
///
/// `categories` always contains `"default"` first (§3 invariant). Equality
/// is structural (including category order) so the registry's reconciliation
/// step (§4.F) can detect "no real change" reloads with `==`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Unique key, also the probe's `Host` header value.
    pub name: String,
    /// Wire host/authority the probe connects to (the vulcand address).
    pub host: String,
    /// Absolute URL path to the service's health endpoint.
    pub path: String,
    /// Ordered category memberships, `"default"` always first.
    pub categories: Vec<String>,
    /// Free-form operator acknowledgement, empty if none.
    pub ack: String,
    /// Configuration-store node identifying this service.
    pub service_key: String,
}

impl Service {
    /// Build a service's health-check path the way the registry does:
    /// `/health/<name><suffix>`.
    pub fn build_path(name: &str, suffix: &str) -> String {
        format!("/health/{name}{suffix}")
    }

    pub fn has_any_category(&self, requested: &[String]) -> bool {
        requested.iter().any(|c| self.categories.contains(c))
    }

    /// The portion of the name before the final `-`, used to group replicas
    /// for resilient aggregation (glossary: "service group").
    pub fn group_name(name: &str) -> &str {
        match name.rfind('-') {
            Some(idx) => &name[..idx],
            None => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(name: &str, categories: &[&str]) -> Service {
        Service {
            name: name.to_string(),
            host: "vulcand".to_string(),
            path: "/__health".to_string(),
            categories: categories.iter().map(|s| s.to_string()).collect(),
            ack: String::new(),
            service_key: name.to_string(),
        }
    }

    #[test]
    fn build_path_prefixes_with_health() {
        assert_eq!(Service::build_path("foo", "/__health"), "/health/foo/__health");
    }

    #[test]
    fn has_any_category_matches_intersection() {
        let s = svc("foo-1", &["default", "bar"]);
        assert!(s.has_any_category(&["bar".to_string(), "baz".to_string()]));
        assert!(!s.has_any_category(&["qux".to_string()]));
    }

    #[test]
    fn group_name_strips_trailing_replica_index() {
        assert_eq!(Service::group_name("svc-1"), "svc");
        assert_eq!(Service::group_name("svc-foo-2"), "svc-foo");
        assert_eq!(Service::group_name("svc"), "svc");
    }

    #[test]
    fn deep_equality_detects_category_order_changes() {
        let a = svc("foo", &["default", "bar"]);
        let b = svc("foo", &["bar", "default"]);
        assert_ne!(a, b, "category order is part of deep equality per §9");
    }
}
