//! etcd v2 HTTP adapter. Grounded in the teacher's everything-is-`reqwest`
//! style (`core::auth::providers::entra` fetches JWKS over `reqwest` the
//! same way). The exact wire shape here is not spec-mandated — spec.md's
//! non-goals explicitly put the config store's network transport out of
//! scope — this exists so the crate is runnable end-to-end against a real
//! etcd cluster.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{ConfigStore, GetOptions, Node, WatchEvent, WatchOptions, Watcher};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
struct EtcdNode {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    dir: bool,
    #[serde(default)]
    nodes: Vec<EtcdNode>,
    #[serde(rename = "modifiedIndex", default)]
    modified_index: u64,
}

#[derive(Debug, Deserialize)]
struct EtcdResponse {
    node: EtcdNode,
}

impl From<EtcdNode> for Node {
    fn from(n: EtcdNode) -> Self {
        Node {
            key: n.key,
            value: n.value.unwrap_or_default(),
            is_dir: n.dir,
            children: n.nodes.into_iter().map(Node::from).collect(),
        }
    }
}

pub struct EtcdConfigStore {
    client: Client,
    /// First reachable peer; a production adapter would round-robin/retry
    /// across all of them, but that's transport detail spec.md excludes.
    peer: String,
}

impl EtcdConfigStore {
    pub fn new(peers: Vec<String>, timeout: Duration) -> Result<Self, AppError> {
        let peer = peers
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ConfigStoreError("no etcd peers configured".to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigStoreError(e.to_string()))?;
        Ok(Self { client, peer })
    }

    fn keys_url(&self, key: &str) -> String {
        format!("{}/v2/keys{}", self.peer.trim_end_matches('/'), key)
    }
}

#[async_trait]
impl ConfigStore for EtcdConfigStore {
    async fn get(&self, key: &str, opts: GetOptions) -> Result<Node, AppError> {
        let resp = self
            .client
            .get(self.keys_url(key))
            .query(&[
                ("recursive", opts.recursive.to_string()),
                ("sorted", opts.sorted.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::ConfigStoreError(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AppError::ConfigStoreError(format!(
                "etcd GET {key} returned {}",
                resp.status()
            )));
        }

        let parsed: EtcdResponse = resp
            .json()
            .await
            .map_err(|e| AppError::ConfigStoreError(e.to_string()))?;
        Ok(parsed.node.into())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let resp = self
            .client
            .put(self.keys_url(key))
            .form(&[("value", value)])
            .send()
            .await
            .map_err(|e| AppError::ConfigStoreError(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AppError::ConfigStoreError(format!(
                "etcd PUT {key} returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn watch(&self, key: &str, opts: WatchOptions) -> Result<Box<dyn Watcher>, AppError> {
        Ok(Box::new(EtcdWatcher {
            client: self.client.clone(),
            url: self.keys_url(key),
            recursive: opts.recursive,
            wait_index: opts.from_index,
        }))
    }
}

struct EtcdWatcher {
    client: Client,
    url: String,
    recursive: bool,
    wait_index: u64,
}

#[async_trait]
impl Watcher for EtcdWatcher {
    async fn next(&mut self) -> Result<WatchEvent, AppError> {
        let mut query = vec![
            ("wait", "true".to_string()),
            ("recursive", self.recursive.to_string()),
        ];
        if self.wait_index > 0 {
            query.push(("waitIndex", self.wait_index.to_string()));
        }

        let resp = self
            .client
            .get(&self.url)
            .query(&query)
            .send()
            .await
            .map_err(|e| AppError::ConfigStoreError(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AppError::ConfigStoreError(format!(
                "etcd watch on {} returned {}",
                self.url,
                resp.status()
            )));
        }

        let parsed: EtcdResponse = resp
            .json()
            .await
            .map_err(|e| AppError::ConfigStoreError(e.to_string()))?;

        self.wait_index = parsed.node.modified_index + 1;
        Ok(WatchEvent {
            modified_index: parsed.node.modified_index,
        })
    }
}
