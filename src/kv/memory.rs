//! In-process fake `KvStore`, used by tests and by components that want to
//! exercise the coordinator loop without a real etcd cluster.

use super::{KvEntry, KvError, KvStore, WatchEvent, WatchEventKind, WatchStream};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Default)]
pub struct InMemoryKvStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Vec<u8>>,
    watchers: Vec<(String, mpsc::Sender<Result<WatchEvent, KvError>>)>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(inner: &mut Inner, event: WatchEvent) {
        inner
            .watchers
            .retain(|(prefix, tx)| !event.key.starts_with(prefix.as_str()) || tx.try_send(Ok(event.clone())).is_ok());
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.contains_key(key) {
            return Err(KvError::AlreadyExists(key.to_string()));
        }
        inner.entries.insert(key.to_string(), value.to_vec());
        Self::notify(
            &mut inner,
            WatchEvent {
                key: key.to_string(),
                value: Some(value.to_vec()),
                kind: WatchEventKind::Put,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.inner.lock().unwrap().entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.insert(key.to_string(), value.to_vec());
        Self::notify(
            &mut inner,
            WatchEvent {
                key: key.to_string(),
                value: Some(value.to_vec()),
                kind: WatchEventKind::Put,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.remove(key);
        Self::notify(
            &mut inner,
            WatchEvent {
                key: key.to_string(),
                value: None,
                kind: WatchEventKind::Delete,
            },
        );
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<KvEntry>, KvError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KvEntry {
                key: k.clone(),
                value: v.clone(),
            })
            .collect())
    }

    async fn watch_prefix(&self, prefix: &str) -> Result<WatchStream, KvError> {
        let (tx, rx) = mpsc::channel(256);
        self.inner
            .lock()
            .unwrap()
            .watchers
            .push((prefix.to_string(), tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn watch_prefix_observes_puts_and_deletes() {
        let store = InMemoryKvStore::new();
        let mut watch = store.watch_prefix("JOB__").await.unwrap();

        store.put_if_absent("JOB__A", b"1").await.unwrap();
        store.delete("JOB__A").await.unwrap();

        let first = watch.next().await.unwrap().unwrap();
        assert_eq!(first.kind, WatchEventKind::Put);
        let second = watch.next().await.unwrap().unwrap();
        assert_eq!(second.kind, WatchEventKind::Delete);
    }

    #[tokio::test]
    async fn watch_prefix_ignores_keys_outside_prefix() {
        let store = InMemoryKvStore::new();
        let mut watch = store.watch_prefix("JOB__").await.unwrap();

        store.put_if_absent("LOCK__A", b"1").await.unwrap();
        store.put_if_absent("JOB__A", b"1").await.unwrap();

        let event = watch.next().await.unwrap().unwrap();
        assert_eq!(event.key, "JOB__A");
    }
}
