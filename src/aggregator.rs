//! Aggregation engine (component I, §4.I) — the pure verdict-computation
//! half of the controller. The Axum handlers in [`crate::handlers`] are
//! thin wrappers around this.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{CheckResult, HealthResult, Service};
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub ok: bool,
    pub severity: u8,
}

pub enum GtgOutcome {
    Ok,
    BadRequest,
    Unavailable,
}

pub struct Aggregator {
    registry: Arc<Registry>,
    environment: String,
}

impl Aggregator {
    pub fn new(registry: Arc<Registry>, environment: String) -> Self {
        Self { registry, environment }
    }

    fn select_services(&self, requested: &[String]) -> Vec<Service> {
        self.registry
            .services()
            .into_values()
            .filter(|s| s.has_any_category(requested))
            .collect()
    }

    /// §4.I "Source of results" — `cache=true` reads the latest cached
    /// value per selected service (skipping never-probed services);
    /// `cache=false` runs the probe synchronously in parallel and pushes
    /// each fresh result back through the registry.
    async fn collect_results(&self, requested: &[String], cache: bool) -> Vec<(Service, CheckResult)> {
        let services = self.select_services(requested);

        if cache {
            let mut out = Vec::with_capacity(services.len());
            for svc in services {
                let Some(ms) = self.registry.get_measured(&svc.name) else {
                    continue;
                };
                let hr = ms.cache_reader.read().await;
                if let Some(mut check) = hr.checks.into_iter().next() {
                    check.ack = self.registry.get_ack(&svc.name);
                    out.push((svc, check));
                }
            }
            out
        } else {
            let probe = self.registry.checker();
            let registry = self.registry.clone();
            let futures = services.into_iter().map(move |svc| {
                let probe = probe.clone();
                let registry = registry.clone();
                async move {
                    let (ok, output) = probe.check(&svc).await;
                    let severity = probe.severity_for(&svc.name);
                    let mut check = CheckResult::new(svc.name.clone(), severity, ok, output);
                    check.ack = registry.get_ack(&svc.name);
                    let hr = HealthResult::single(check.clone());
                    let _ = registry.update_cached_and_buffered_health(&svc.name, hr).await;
                    (svc, check)
                }
            });
            futures::future::join_all(futures).await
        }
    }

    /// §4.I "Aggregation verdict" — plain (non-resilient) case.
    fn plain_verdict(results: &[CheckResult]) -> Verdict {
        let ok = results.iter().all(|r| r.ok || !r.ack.is_empty());
        let severity = results
            .iter()
            .filter(|r| !r.ok && r.ack.is_empty())
            .map(|r| r.severity)
            .min()
            .unwrap_or(2);
        Verdict { ok, severity }
    }

    /// Resilient case: group by service group, a single healthy/acked
    /// member marks its group healthy; an unhealthy group's severity is the
    /// last-seen unhealthy member's severity, per spec.md §4.I verbatim.
    fn resilient_verdict(results: &[CheckResult]) -> Verdict {
        let mut groups: HashMap<&str, (bool, u8)> = HashMap::new();
        for r in results {
            let group = Service::group_name(&r.name);
            let healthy = r.ok || !r.ack.is_empty();
            let entry = groups.entry(group).or_insert((false, 2));
            if healthy {
                *entry = (true, r.severity);
            } else if !entry.0 {
                entry.1 = r.severity;
            }
        }
        let ok = groups.values().all(|(ok, _)| *ok);
        let severity = groups
            .values()
            .filter(|(ok, _)| !ok)
            .map(|(_, sev)| *sev)
            .min()
            .unwrap_or(2);
        Verdict { ok, severity }
    }

    fn verdict(results: &[CheckResult], resilient: bool) -> Verdict {
        if resilient {
            Self::resilient_verdict(results)
        } else {
            Self::plain_verdict(results)
        }
    }

    /// Full aggregated envelope for `/__health` and `/`. `Err(())` iff none
    /// of the requested categories exist in the registry (spec.md §6: "400
    /// when no requested category exists"), mirroring `controller.go`'s
    /// `jsonHandler`/`htmlHandler` writing `StatusBadRequest` when
    /// `len(validCategories)==0`.
    pub async fn health_result(&self, categories: &[String], cache: bool) -> Result<HealthResult, ()> {
        let matching = self.registry.matching_categories(categories);
        if matching.is_empty() {
            return Err(());
        }

        let resilient = self.registry.are_resilient(&matching);
        let results = self.collect_results(&matching, cache).await;

        let mut checks: Vec<CheckResult> = results.iter().map(|(_, c)| c.clone()).collect();
        checks.sort_by(|a, b| a.name.cmp(&b.name));

        let verdict = Self::verdict(&checks, resilient);
        Ok(HealthResult {
            name: "cluster".to_string(),
            description: format!(
                "Aggregate health for environment \"{}\" ({}).",
                self.environment,
                if cache { "cache" } else { "live" }
            ),
            schema_version: 1,
            ok: verdict.ok,
            severity: verdict.severity,
            checks,
        })
    }

    /// §4.I "/__gtg specifics".
    pub async fn gtg(&self, categories: &[String], cache: bool) -> GtgOutcome {
        let matching = self.registry.matching_categories(categories);
        if matching.is_empty() {
            return GtgOutcome::BadRequest;
        }
        for cat in &matching {
            if self.registry.category_enabled(cat) == Some(false) {
                return GtgOutcome::Unavailable;
            }
        }

        let resilient = self.registry.are_resilient(&matching);
        let results = self.collect_results(&matching, cache).await;
        let checks: Vec<CheckResult> = results.iter().map(|(_, c)| c.clone()).collect();
        let verdict = Self::verdict(&checks, resilient);

        if verdict.ok {
            return GtgOutcome::Ok;
        }

        for cat in self.unhealthy_categories(&matching, &results) {
            self.registry.disable_category_if_sticky(&cat).await;
        }
        GtgOutcome::Unavailable
    }

    /// §4.I "Per-category verdict (for sticky-disable)".
    fn unhealthy_categories(&self, categories: &[String], results: &[(Service, CheckResult)]) -> Vec<String> {
        let mut unhealthy = Vec::new();
        for cat in categories {
            let subset: Vec<CheckResult> = results
                .iter()
                .filter(|(svc, _)| svc.categories.iter().any(|c| c == cat))
                .map(|(_, c)| c.clone())
                .collect();
            let resilient = self.registry.are_resilient(std::slice::from_ref(cat));
            if !Self::verdict(&subset, resilient).ok {
                unhealthy.push(cat.clone());
            }
        }
        unhealthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, severity: u8, ok: bool, ack: &str) -> CheckResult {
        let mut c = CheckResult::new(name, severity, ok, "");
        c.ack = ack.to_string();
        c
    }

    #[test]
    fn plain_verdict_is_ok_when_all_healthy() {
        let results = vec![check("a", 2, true, ""), check("b", 2, true, "")];
        let v = Aggregator::plain_verdict(&results);
        assert!(v.ok);
        assert_eq!(v.severity, 2);
    }

    #[test]
    fn plain_verdict_ack_masks_unhealthy_result() {
        let results = vec![check("a", 1, false, "investigating")];
        let v = Aggregator::plain_verdict(&results);
        assert!(v.ok, "acked failure must not break the verdict");
    }

    #[test]
    fn plain_verdict_severity_is_min_over_unacked_unhealthy() {
        let results = vec![check("a", 2, false, ""), check("b", 1, false, "")];
        let v = Aggregator::plain_verdict(&results);
        assert!(!v.ok);
        assert_eq!(v.severity, 1);
    }

    #[test]
    fn resilient_group_with_one_healthy_member_is_ok() {
        let results = vec![check("svc-1", 1, false, ""), check("svc-2", 2, true, "")];
        let v = Aggregator::resilient_verdict(&results);
        assert!(v.ok);
        assert_eq!(v.severity, 2);
    }

    #[test]
    fn resilient_group_all_unhealthy_is_not_ok() {
        let results = vec![check("svc-1", 1, false, ""), check("svc-2", 1, false, "")];
        let v = Aggregator::resilient_verdict(&results);
        assert!(!v.ok);
        assert_eq!(v.severity, 1);
    }

    #[test]
    fn resilient_group_membership_splits_on_last_dash() {
        let results = vec![check("svc-foo-1", 1, false, ""), check("svc-bar-1", 2, true, "")];
        // distinct groups ("svc-foo" and "svc-bar"): the second group's
        // health cannot rescue the first.
        let v = Aggregator::resilient_verdict(&results);
        assert!(!v.ok);
        assert_eq!(v.severity, 1);
    }
}
