//! KV-Job-Store adapter (spec §4.A): namespaced operations on the watched,
//! strongly-consistent KV store backing the job queue.

pub mod etcd;
pub mod memory;

use async_trait::async_trait;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

#[derive(Debug, Error)]
pub enum KvError {
    /// Distinct from other failures so the scheduler can treat "already
    /// enqueued" as benign (spec §4.A).
    #[error("key already exists: {0}")]
    AlreadyExists(String),

    #[error("kv backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEventKind {
    Put,
    Delete,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub key: String,
    pub value: Option<Vec<u8>>,
    pub kind: WatchEventKind,
}

#[derive(Debug, Clone)]
pub struct KvEntry {
    pub key: String,
    pub value: Vec<u8>,
}

pub type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchEvent, KvError>> + Send>>;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<(), KvError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Overwrites unconditionally, used by handlers to bump the attempt
    /// counter on an existing job key.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;

    async fn list(&self, prefix: &str) -> Result<Vec<KvEntry>, KvError>;

    async fn watch_prefix(&self, prefix: &str) -> Result<WatchStream, KvError>;
}
