//! Registry (component F, §4.F) — the hardest component.
//!
//! Owns the service/category maps and the measured-service set, watches the
//! config store for changes, and reconciles per-service schedulers on
//! reload. Single-writer discipline: only the registry's own reload and
//! reconciliation code ever mutates the three maps; everything else reads
//! a snapshot through the accessors below, mirroring
//! `core::cache::cache_manager::CacheRegistry`'s `std::sync::RwLock` choice
//! for short, non-blocking critical sections.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::warn;

use crate::cache_cell::{CacheCell, CacheReader, CacheWriter};
use crate::configstore::{ConfigStore, GetOptions, WatchOptions};
use crate::domain::{Category, Service, DEFAULT_CATEGORY, DEFAULT_PERIOD_SECS};
use crate::error::AppError;
use crate::event_coalescer::EventCoalescer;
use crate::probe::ProbeClient;
use crate::sample_buffer::{self, BufferReader, BufferWriter};
use crate::scheduler::Scheduler;

pub const SERVICES_KEY: &str = "/ft/healthcheck";
pub const CATEGORIES_KEY: &str = "/ft/healthcheck-categories";

/// Snapshot handle for one observed service, cheap to clone (everything
/// inside is an `Arc` or a channel handle).
#[derive(Clone)]
pub struct MeasuredServiceHandle {
    pub service: Service,
    pub cache_reader: CacheReader,
    pub buffer_reader: Arc<AsyncMutex<BufferReader>>,
    /// Exposed so a consumer (the metric sink feeder) can re-enqueue a
    /// sample it failed to deliver, per §4.C/§4.H.
    pub buffer_writer: BufferWriter,
}

struct Entry {
    handle: MeasuredServiceHandle,
    cache_writer: CacheWriter,
    buffer_writer: BufferWriter,
    /// Keeps the cache cell's actor task alive; dropping this terminates it.
    _cache_cell: CacheCell,
    /// Fires exactly once, on deep-equal replacement or deletion.
    terminate_tx: Option<oneshot::Sender<()>>,
}

pub struct Registry {
    self_ref: Weak<Registry>,
    config_store: Arc<dyn ConfigStore>,
    probe: Arc<ProbeClient>,
    vulcand_host: String,
    services: RwLock<HashMap<String, Service>>,
    categories: RwLock<HashMap<String, Category>>,
    measured: RwLock<HashMap<String, Entry>>,
}

impl Registry {
    pub fn new(config_store: Arc<dyn ConfigStore>, probe: Arc<ProbeClient>, vulcand_host: String) -> Arc<Self> {
        let mut seeded = HashMap::new();
        seeded.insert(DEFAULT_CATEGORY.to_string(), Category::default_category());
        Arc::new_cyclic(|self_ref| Registry {
            self_ref: self_ref.clone(),
            config_store,
            probe,
            vulcand_host,
            services: RwLock::new(HashMap::new()),
            categories: RwLock::new(seeded),
            measured: RwLock::new(HashMap::new()),
        })
    }

    fn arc(&self) -> Arc<Registry> {
        self.self_ref.upgrade().expect("registry outlives its own weak self-reference")
    }

    /// Synchronous initial load, run once before serving traffic.
    pub async fn bootstrap(&self) -> Result<(), AppError> {
        self.reload_categories().await?;
        self.reload_services().await?;
        Ok(())
    }

    /// Spawn the two independent watch loops (§4.F "Watch loops").
    pub fn spawn_watch_loops(self: &Arc<Self>) {
        self.spawn_watch_loop(SERVICES_KEY, {
            let registry = self.clone();
            move || {
                let registry = registry.clone();
                async move {
                    if let Err(e) = registry.reload_services().await {
                        warn!(error = %e, "service reload failed");
                    }
                }
            }
        });
        self.spawn_watch_loop(CATEGORIES_KEY, {
            let registry = self.clone();
            move || {
                let registry = registry.clone();
                async move {
                    if let Err(e) = registry.reload_categories().await {
                        warn!(error = %e, "category reload failed");
                    }
                }
            }
        });
    }

    fn spawn_watch_loop<F, Fut>(self: &Arc<Self>, key: &'static str, reload: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let coalescer = EventCoalescer::spawn(Duration::from_secs(DEFAULT_PERIOD_SECS), reload);
        let registry = self.clone();
        tokio::spawn(async move {
            loop {
                match registry
                    .config_store
                    .watch(key, WatchOptions { from_index: 0, recursive: true })
                    .await
                {
                    Ok(mut watcher) => loop {
                        match watcher.next().await {
                            Ok(_) => coalescer.trigger(),
                            Err(e) => {
                                warn!(error = %e, key, "watch stream failed");
                                break;
                            }
                        }
                    },
                    Err(e) => warn!(error = %e, key, "could not open watch"),
                }
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
        });
    }

    // ---- reload ----------------------------------------------------

    pub async fn reload_services(&self) -> Result<(), AppError> {
        let fetched = self.fetch_services().await?;
        *self.services.write().unwrap() = fetched.clone();
        self.reconcile(&fetched);
        Ok(())
    }

    pub async fn reload_categories(&self) -> Result<(), AppError> {
        let fetched = self.fetch_categories().await?;
        *self.categories.write().unwrap() = fetched;
        Ok(())
    }

    async fn fetch_services(&self) -> Result<HashMap<String, Service>, AppError> {
        let node = self
            .config_store
            .get(SERVICES_KEY, GetOptions { recursive: true, sorted: true })
            .await?;

        let mut out = HashMap::new();
        for child in &node.children {
            if !child.is_dir {
                warn!(key = %child.key, "expected a service directory, found a leaf; skipping");
                continue;
            }
            let name = leaf_name(&child.key).to_string();
            let mut path_suffix = "/__health".to_string();
            let mut categories_raw = String::new();
            let mut ack = String::new();
            for field in &child.children {
                match leaf_name(&field.key) {
                    "path" => path_suffix = field.value.clone(),
                    "categories" => categories_raw = field.value.clone(),
                    "ack" => ack = field.value.clone(),
                    _ => {}
                }
            }

            let mut categories = vec![DEFAULT_CATEGORY.to_string()];
            for c in categories_raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if !categories.iter().any(|existing| existing == c) {
                    categories.push(c.to_string());
                }
            }

            let service = Service {
                path: Service::build_path(&name, &path_suffix),
                name: name.clone(),
                host: self.vulcand_host.clone(),
                categories,
                ack,
                service_key: name.clone(),
            };
            out.insert(name, service);
        }
        Ok(out)
    }

    async fn fetch_categories(&self) -> Result<HashMap<String, Category>, AppError> {
        let mut out = HashMap::new();
        out.insert(DEFAULT_CATEGORY.to_string(), Category::default_category());

        let node = self
            .config_store
            .get(CATEGORIES_KEY, GetOptions { recursive: true, sorted: true })
            .await?;

        for child in &node.children {
            if !child.is_dir {
                warn!(key = %child.key, "expected a category directory, found a leaf; skipping");
                continue;
            }
            let name = leaf_name(&child.key).to_string();
            let mut period_seconds = DEFAULT_PERIOD_SECS;
            let mut is_resilient = false;
            let mut enabled = true;
            let mut sticky = false;
            for field in &child.children {
                match leaf_name(&field.key) {
                    "period_seconds" => {
                        period_seconds = field.value.trim().parse().unwrap_or(DEFAULT_PERIOD_SECS)
                    }
                    "is_resilient" => is_resilient = field.value.trim().parse().unwrap_or(false),
                    "enabled" => enabled = field.value.trim().parse().unwrap_or(true),
                    "sticky" => sticky = field.value.trim().parse().unwrap_or(false),
                    _ => {}
                }
            }
            out.insert(
                name.clone(),
                Category { name, period_seconds, is_resilient, enabled, sticky },
            );
        }
        Ok(out)
    }

    /// §4.F "Measured-service reconciliation".
    fn reconcile(&self, new_services: &HashMap<String, Service>) {
        let registry = self.arc();
        let mut measured = self.measured.write().unwrap();

        for (name, svc) in new_services {
            let replace = match measured.get(name) {
                None => true,
                Some(entry) => &entry.handle.service != svc,
            };
            if !replace {
                continue;
            }
            if let Some(mut old) = measured.remove(name) {
                if let Some(tx) = old.terminate_tx.take() {
                    let _ = tx.send(());
                }
            }
            let (entry, terminate_rx) = Self::new_measured(svc.clone());
            measured.insert(name.clone(), entry);
            Scheduler::spawn(registry.clone(), svc.clone(), terminate_rx);
        }

        let stale: Vec<String> = measured
            .keys()
            .filter(|name| !new_services.contains_key(*name))
            .cloned()
            .collect();
        for name in stale {
            if let Some(mut old) = measured.remove(&name) {
                if let Some(tx) = old.terminate_tx.take() {
                    let _ = tx.send(());
                }
            }
        }
    }

    fn new_measured(service: Service) -> (Entry, oneshot::Receiver<()>) {
        let (cache_cell, cache_writer, cache_reader) = CacheCell::spawn();
        let (buffer_writer, buffer_reader) = sample_buffer::bounded();
        let (terminate_tx, terminate_rx) = oneshot::channel();
        let handle = MeasuredServiceHandle {
            service,
            cache_reader,
            buffer_reader: Arc::new(AsyncMutex::new(buffer_reader)),
            buffer_writer: buffer_writer.clone(),
        };
        (
            Entry {
                handle,
                cache_writer,
                buffer_writer,
                _cache_cell: cache_cell,
                terminate_tx: Some(terminate_tx),
            },
            terminate_rx,
        )
    }

    // ---- queries (§4.F "Queries used by the aggregator") -----------

    pub fn services(&self) -> HashMap<String, Service> {
        self.services.read().unwrap().clone()
    }

    pub fn categories(&self) -> HashMap<String, Category> {
        self.categories.read().unwrap().clone()
    }

    pub fn measured_services(&self) -> Vec<MeasuredServiceHandle> {
        self.measured.read().unwrap().values().map(|e| e.handle.clone()).collect()
    }

    pub fn get_measured(&self, name: &str) -> Option<MeasuredServiceHandle> {
        self.measured.read().unwrap().get(name).map(|e| e.handle.clone())
    }

    pub fn checker(&self) -> Arc<ProbeClient> {
        self.probe.clone()
    }

    pub fn get_ack(&self, service_key: &str) -> String {
        self.services
            .read()
            .unwrap()
            .get(service_key)
            .map(|s| s.ack.clone())
            .unwrap_or_default()
    }

    /// Input order preserved, unknown names dropped.
    pub fn matching_categories(&self, requested: &[String]) -> Vec<String> {
        let cats = self.categories.read().unwrap();
        requested.iter().filter(|c| cats.contains_key(c.as_str())).cloned().collect()
    }

    /// Vacuously true for an empty set (§8 invariant 6).
    pub fn are_resilient(&self, names: &[String]) -> bool {
        if names.is_empty() {
            return true;
        }
        let cats = self.categories.read().unwrap();
        names.iter().all(|n| cats.get(n).map(|c| c.is_resilient).unwrap_or(false))
    }

    pub fn category_enabled(&self, name: &str) -> Option<bool> {
        self.categories.read().unwrap().get(name).map(|c| c.enabled)
    }

    /// Minimum period among the named categories; unknown names ignored,
    /// `"default"` (60s) always part of the comparison (§9 tie-breaker).
    pub fn min_period_for(&self, categories: &[String]) -> Duration {
        let cats = self.categories.read().unwrap();
        let mut min = Duration::from_secs(DEFAULT_PERIOD_SECS);
        for name in categories {
            if let Some(cat) = cats.get(name) {
                let p = cat.period();
                if p < min {
                    min = p;
                }
            }
        }
        min
    }

    /// §4.F "Mutation: sticky disable". Idempotent: a second call against
    /// an already-disabled sticky category is a no-op (no config-store
    /// write), and a non-sticky category is always a no-op.
    pub async fn disable_category_if_sticky(&self, category: &str) {
        let should = {
            let cats = self.categories.read().unwrap();
            matches!(cats.get(category), Some(c) if c.sticky && c.enabled)
        };
        if !should {
            return;
        }
        let key = format!("{CATEGORIES_KEY}/{category}/enabled");
        if let Err(e) = self.config_store.set(&key, "false").await {
            warn!(error = %e, category, "failed to persist sticky-disable");
            return;
        }
        if let Some(c) = self.categories.write().unwrap().get_mut(category) {
            c.enabled = false;
        }
    }

    /// Pushes `hr` to the named service's cache cell (blocking rendezvous)
    /// and attempts a non-blocking send to its sample buffer. `Err` if the
    /// named service has no measured entry (already retired).
    pub async fn update_cached_and_buffered_health(&self, name: &str, hr: crate::domain::HealthResult) -> Result<(), ()> {
        let (cache_writer, buffer_writer) = {
            let measured = self.measured.read().unwrap();
            match measured.get(name) {
                Some(entry) => (entry.cache_writer.clone(), entry.buffer_writer.clone()),
                None => return Err(()),
            }
        };
        if let Some(check) = hr.checks.first().cloned() {
            buffer_writer.push(check);
        }
        cache_writer.write(hr).await.map_err(|_| ())
    }
}

fn leaf_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configstore::MemoryConfigStore;
    use std::time::Duration as StdDuration;

    fn probe() -> Arc<ProbeClient> {
        Arc::new(ProbeClient::new(StdDuration::from_secs(5), Vec::new()))
    }

    #[tokio::test]
    async fn reload_seeds_default_category_even_when_store_is_empty() {
        let store = Arc::new(MemoryConfigStore::new());
        let registry = Registry::new(store, probe(), "vulcand".to_string());
        registry.bootstrap().await.unwrap();
        let cats = registry.categories();
        assert!(cats.contains_key("default"));
        assert_eq!(cats["default"].period_seconds, 60);
    }

    #[tokio::test]
    async fn reload_builds_service_with_default_category_and_path() {
        let store = Arc::new(MemoryConfigStore::new());
        store.put("/ft/healthcheck/foo-1/ack", "").await;
        let registry = Registry::new(store, probe(), "vulcand".to_string());
        registry.bootstrap().await.unwrap();

        let services = registry.services();
        let svc = services.get("foo-1").expect("service present");
        assert_eq!(svc.categories, vec!["default".to_string()]);
        assert_eq!(svc.path, "/health/foo-1/__health");
        assert_eq!(registry.measured_services().len(), 1);
    }

    #[tokio::test]
    async fn identical_reload_does_not_recreate_the_measured_service() {
        let store = Arc::new(MemoryConfigStore::new());
        store.put("/ft/healthcheck/foo-1/path", "/health").await;
        let registry = Registry::new(store, probe(), "vulcand".to_string());
        registry.bootstrap().await.unwrap();
        let before = registry.get_measured("foo-1").unwrap();

        registry.reload_services().await.unwrap();
        let after = registry.get_measured("foo-1").unwrap();
        assert_eq!(before.service, after.service);
    }

    #[tokio::test]
    async fn service_removed_from_store_is_retired_from_measured_set() {
        let store = Arc::new(MemoryConfigStore::new());
        store.put("/ft/healthcheck/foo-1/path", "/health").await;
        let registry = Registry::new(store.clone(), probe(), "vulcand".to_string());
        registry.bootstrap().await.unwrap();
        assert_eq!(registry.measured_services().len(), 1);

        store.remove("/ft/healthcheck/foo-1/path").await;
        registry.reload_services().await.unwrap();
        assert!(registry.measured_services().is_empty());
    }

    #[tokio::test]
    async fn category_change_reshapes_min_period_without_touching_services() {
        let store = Arc::new(MemoryConfigStore::new());
        store.put("/ft/healthcheck-categories/fast/period_seconds", "5").await;
        let registry = Registry::new(store, probe(), "vulcand".to_string());
        registry.bootstrap().await.unwrap();

        let wait = registry.min_period_for(&["default".to_string(), "fast".to_string()]);
        assert_eq!(wait, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn matching_categories_preserves_input_order_and_drops_unknown() {
        let store = Arc::new(MemoryConfigStore::new());
        store.put("/ft/healthcheck-categories/bar/enabled", "true").await;
        let registry = Registry::new(store, probe(), "vulcand".to_string());
        registry.bootstrap().await.unwrap();

        let matched = registry.matching_categories(&[
            "bar".to_string(),
            "ghost".to_string(),
            "default".to_string(),
        ]);
        assert_eq!(matched, vec!["bar".to_string(), "default".to_string()]);
    }

    #[tokio::test]
    async fn are_resilient_is_vacuously_true_for_empty_set() {
        let store = Arc::new(MemoryConfigStore::new());
        let registry = Registry::new(store, probe(), "vulcand".to_string());
        registry.bootstrap().await.unwrap();
        assert!(registry.are_resilient(&[]));
    }

    #[tokio::test]
    async fn sticky_disable_writes_at_most_once_and_skips_non_sticky() {
        let store = Arc::new(MemoryConfigStore::new());
        store.put("/ft/healthcheck-categories/foo/sticky", "true").await;
        store.put("/ft/healthcheck-categories/foo/enabled", "true").await;
        let registry = Registry::new(store.clone(), probe(), "vulcand".to_string());
        registry.bootstrap().await.unwrap();

        registry.disable_category_if_sticky("foo").await;
        assert_eq!(registry.category_enabled("foo"), Some(false));

        // second call against an already-disabled sticky category is a no-op
        registry.disable_category_if_sticky("foo").await;
        assert_eq!(registry.category_enabled("foo"), Some(false));

        registry.disable_category_if_sticky("default").await;
        assert_eq!(registry.category_enabled("default"), Some(true));
    }
}
