//! Per-service scheduler (component G, §4.G).
//!
//! One task per [`MeasuredService`](crate::registry::MeasuredServiceHandle),
//! implementing the Waiting → Running → Publishing state machine. The first
//! iteration runs with zero wait; every subsequent wait is the minimum
//! period among the service's current categories, read fresh from the
//! registry each time so a category reload takes effect without respawning
//! the scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::domain::{CheckResult, HealthResult, Service};
use crate::registry::Registry;

pub struct Scheduler;

impl Scheduler {
    pub fn spawn(registry: Arc<Registry>, service: Service, mut terminate_rx: oneshot::Receiver<()>) {
        tokio::spawn(async move {
            let mut first_iteration = true;
            loop {
                let wait = if first_iteration {
                    first_iteration = false;
                    Duration::ZERO
                } else {
                    registry.min_period_for(&service.categories)
                };

                tokio::select! {
                    biased;
                    _ = &mut terminate_rx => return,
                    _ = tokio::time::sleep(wait) => {}
                }

                let probe = registry.checker();
                let (ok, output) = probe.check(&service).await;
                let severity = probe.severity_for(&service.name);
                let mut check = CheckResult::new(service.name.clone(), severity, ok, output);
                check.ack = service.ack.clone();
                let hr = HealthResult::single(check);

                if registry.update_cached_and_buffered_health(&service.name, hr).await.is_err() {
                    return;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configstore::MemoryConfigStore;
    use crate::probe::ProbeClient;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn scheduler_publishes_first_result_with_zero_wait() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/foo-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"checks": []})))
            .mount(&server)
            .await;

        // Driven through the registry's reload path (not private state) so
        // the scheduler is the real one the registry would spawn.
        let store = MemoryConfigStore::new();
        store.put("/ft/healthcheck/foo-1/path", "").await;
        let registry = Registry::new(Arc::new(store), Arc::new(ProbeClient::new(Duration::from_secs(5), Vec::new())), server.address().to_string());
        registry.bootstrap().await.unwrap();

        for _ in 0..50 {
            if let Some(ms) = registry.get_measured("foo-1") {
                let hr = ms.cache_reader.read().await;
                if !hr.checks.is_empty() {
                    assert!(hr.ok);
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("scheduler never published a result");
    }
}
