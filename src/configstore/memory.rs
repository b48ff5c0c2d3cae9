//! In-memory config store used by tests and by anything driving the
//! registry without a live etcd.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use super::{ConfigStore, GetOptions, Node, WatchEvent, WatchOptions, Watcher};
use crate::error::AppError;

#[derive(Default)]
pub struct MemoryConfigStore {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
    changed: Arc<Notify>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.lock().await.insert(key.into(), value.into());
        self.changed.notify_waiters();
    }

    pub async fn remove(&self, key: &str) {
        self.inner.lock().await.remove(key);
        self.changed.notify_waiters();
    }

    /// Manually pulse watchers, useful when a test only changes structure
    /// (e.g. removes a whole subtree) rather than a single key's value.
    pub fn notify_change(&self) {
        self.changed.notify_waiters();
    }

    fn build_node(map: &BTreeMap<String, String>, prefix: &str) -> Node {
        let mut children = Vec::new();
        // A "directory" is any key that is a strict prefix of other keys,
        // or whose immediate child segment we can enumerate. For the small
        // fixed schema this store is used for (§6), we model one level of
        // nesting under `prefix/<name>/<field>`.
        let mut names = std::collections::BTreeSet::new();
        for key in map.keys() {
            if let Some(rest) = key.strip_prefix(&format!("{prefix}/")) {
                if let Some(name) = rest.split('/').next() {
                    names.insert(name.to_string());
                }
            }
        }
        for name in names {
            let child_prefix = format!("{prefix}/{name}");
            let field_prefix = format!("{child_prefix}/");
            let fields = map
                .iter()
                .filter(|(key, _)| key.starts_with(&field_prefix))
                .map(|(key, value)| Node {
                    key: key.clone(),
                    value: value.clone(),
                    is_dir: false,
                    children: Vec::new(),
                })
                .collect();
            children.push(Node {
                key: child_prefix,
                value: String::new(),
                is_dir: true,
                children: fields,
            });
        }
        Node {
            key: prefix.to_string(),
            value: String::new(),
            is_dir: true,
            children,
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, key: &str, _opts: GetOptions) -> Result<Node, AppError> {
        let map = self.inner.lock().await;
        if let Some(value) = map.get(key) {
            return Ok(Node {
                key: key.to_string(),
                value: value.clone(),
                is_dir: false,
                children: Vec::new(),
            });
        }
        Ok(Self::build_node(&map, key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.put(key, value).await;
        Ok(())
    }

    async fn watch(&self, _key: &str, _opts: WatchOptions) -> Result<Box<dyn Watcher>, AppError> {
        Ok(Box::new(MemoryWatcher {
            changed: self.changed.clone(),
            index: 0,
        }))
    }
}

struct MemoryWatcher {
    changed: Arc<Notify>,
    index: u64,
}

#[async_trait]
impl Watcher for MemoryWatcher {
    async fn next(&mut self) -> Result<WatchEvent, AppError> {
        self.changed.notified().await;
        self.index += 1;
        Ok(WatchEvent {
            modified_index: self.index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_on_missing_key_returns_empty_directory() {
        let store = MemoryConfigStore::new();
        let node = store
            .get("/ft/healthcheck", GetOptions::default())
            .await
            .unwrap();
        assert!(node.is_dir);
        assert!(node.children.is_empty());
    }

    #[tokio::test]
    async fn put_then_get_round_trips_a_leaf() {
        let store = MemoryConfigStore::new();
        store.put("/ft/healthcheck-categories/foo/sticky", "true").await;
        let node = store
            .get("/ft/healthcheck-categories/foo/sticky", GetOptions::default())
            .await
            .unwrap();
        assert_eq!(node.value, "true");
        assert!(!node.is_dir);
    }

    #[tokio::test]
    async fn directory_listing_groups_by_immediate_child() {
        let store = MemoryConfigStore::new();
        store.put("/ft/healthcheck/foo-1/path", "/__health").await;
        store.put("/ft/healthcheck/foo-1/ack", "").await;
        store.put("/ft/healthcheck/bar-1/path", "/health").await;
        let node = store.get("/ft/healthcheck", GetOptions::default()).await.unwrap();
        assert!(node.is_dir);
        assert_eq!(node.children.len(), 2);
    }

    #[tokio::test]
    async fn watcher_resolves_after_a_put() {
        let store = MemoryConfigStore::new();
        let mut watcher = store.watch("/ft/healthcheck", WatchOptions { from_index: 0, recursive: true }).await.unwrap();
        let store2 = &store;
        let (event, _) = tokio::join!(watcher.next(), async {
            store2.put("/ft/healthcheck/foo/path", "/x").await;
        });
        assert!(event.is_ok());
    }
}
