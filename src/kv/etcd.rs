//! etcd-backed `KvStore`. `put_if_absent` is implemented as a single
//! transaction (create-revision == 0 guard) so the benign "already
//! enqueued" race never needs a read-then-write round trip.

use super::{KvEntry, KvError, KvStore, WatchEvent, WatchEventKind, WatchStream};
use async_trait::async_trait;
use etcd_client::{Client, Compare, CompareOp, EventType, GetOptions, TxnOp, WatchOptions};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

pub struct EtcdKvStore {
    client: Client,
}

impl EtcdKvStore {
    pub async fn connect(endpoints: &[String]) -> Result<Self, KvError> {
        let client = Client::connect(endpoints, None)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl KvStore for EtcdKvStore {
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let mut client = self.client.clone();
        let txn = etcd_client::Txn::new()
            .when(vec![Compare::create_revision(
                key,
                CompareOp::Equal,
                0,
            )])
            .and_then(vec![TxnOp::put(key, value, None)]);

        let response = client
            .txn(txn)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;

        if response.succeeded() {
            Ok(())
        } else {
            Err(KvError::AlreadyExists(key.to_string()))
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let mut client = self.client.clone();
        let response = client
            .get(key, None)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(response.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let mut client = self.client.clone();
        client
            .put(key, value, None)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut client = self.client.clone();
        client
            .delete(key, None)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<KvEntry>, KvError> {
        let mut client = self.client.clone();
        let response = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;

        Ok(response
            .kvs()
            .iter()
            .map(|kv| KvEntry {
                key: String::from_utf8_lossy(kv.key()).to_string(),
                value: kv.value().to_vec(),
            })
            .collect())
    }

    async fn watch_prefix(&self, prefix: &str) -> Result<WatchStream, KvError> {
        let mut client = self.client.clone();
        let (_watcher, mut stream) = client
            .watch(prefix, Some(WatchOptions::new().with_prefix()))
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;

        let (tx, rx) = tokio::sync::mpsc::channel(256);
        tokio::spawn(async move {
            // Keep the watcher handle alive for the lifetime of the forwarding task.
            let _watcher = _watcher;
            loop {
                match stream.message().await {
                    Ok(Some(resp)) => {
                        for event in resp.events() {
                            let Some(kv) = event.kv() else { continue };
                            let key = String::from_utf8_lossy(kv.key()).to_string();
                            let item = match event.event_type() {
                                EventType::Put => WatchEvent {
                                    key,
                                    value: Some(kv.value().to_vec()),
                                    kind: WatchEventKind::Put,
                                },
                                EventType::Delete => WatchEvent {
                                    key,
                                    value: None,
                                    kind: WatchEventKind::Delete,
                                },
                            };
                            if tx.send(Ok(item)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        warn!(error = %e, "etcd watch stream error");
                        let _ = tx.send(Err(KvError::Backend(e.to_string()))).await;
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
