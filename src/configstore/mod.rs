//! Config-store adapter (component E, §4.E).
//!
//! The registry depends only on this trait; which concrete store backs it
//! is out of scope for the tested core (spec.md's non-goals explicitly
//! exclude the config store's wire transport). Two implementations are
//! provided: [`etcd::EtcdConfigStore`] for running against a real etcd
//! cluster, and [`memory::MemoryConfigStore`] for tests and for driving the
//! registry without a live etcd.

mod etcd;
mod memory;

pub use etcd::EtcdConfigStore;
pub use memory::MemoryConfigStore;

use async_trait::async_trait;

use crate::error::AppError;

/// A node in the hierarchical key-value namespace.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub key: String,
    pub value: String,
    pub is_dir: bool,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    pub recursive: bool,
    pub sorted: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub from_index: u64,
    pub recursive: bool,
}

/// One change notification. The payload is intentionally opaque — callers
/// always reload the whole subtree after a `Next()`, per §4.F.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub modified_index: u64,
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str, opts: GetOptions) -> Result<Node, AppError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    async fn watch(&self, key: &str, opts: WatchOptions) -> Result<Box<dyn Watcher>, AppError>;
}

#[async_trait]
pub trait Watcher: Send {
    /// Blocks until the next change under the watched key. A transient
    /// error here is the caller's cue to back off and re-open (§4.F).
    async fn next(&mut self) -> Result<WatchEvent, AppError>;
}
