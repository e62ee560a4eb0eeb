//! etcd-backed distributed lock: a lease kept alive in the background plus
//! etcd's own `Lock` RPC (fair, session-scoped mutual exclusion built in).

use super::{DistributedLock, LockError, Session};
use async_trait::async_trait;
use etcd_client::{Client, LockOptions};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct EtcdLock {
    client: Client,
    lease_ttl: Duration,
    /// Maps a held session id to the cancellation token for its keep-alive
    /// task, so `release` can stop keep-alives before revoking the lease.
    keep_alives: Mutex<std::collections::HashMap<String, CancellationToken>>,
}

impl EtcdLock {
    pub fn new(client: Client, lease_ttl: Duration) -> Self {
        Self {
            client,
            lease_ttl,
            keep_alives: Mutex::new(std::collections::HashMap::new()),
        }
    }

    async fn keep_alive_loop(mut client: Client, lease_id: i64, ttl: Duration, cancel: CancellationToken) {
        let (mut keeper, mut stream) = match client.lease_keep_alive(lease_id).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, lease_id, "failed to start lease keep-alive");
                return;
            }
        };
        let interval = ttl / 3;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {
                    if keeper.keep_alive().await.is_err() {
                        return;
                    }
                    if stream.message().await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl DistributedLock for EtcdLock {
    async fn acquire(&self, key: &str) -> Result<Session, LockError> {
        let mut client = self.client.clone();

        let lease = client
            .lease_grant(self.lease_ttl.as_secs() as i64, None)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;
        let lease_id = lease.id();

        let result = client
            .lock(key, Some(LockOptions::new().with_lease(lease_id)))
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let _ = client.lease_revoke(lease_id).await;
                // etcd's Lock RPC blocks until acquired rather than failing
                // fast on contention; a transport/cancellation error here
                // means the attempt didn't complete, which callers treat as
                // busy and retry via `crate::retry`.
                return Err(LockError::Busy(format!("{key}: {e}")));
            }
        };

        let id = String::from_utf8_lossy(response.key()).to_string();
        let cancel = CancellationToken::new();
        self.keep_alives
            .lock()
            .await
            .insert(id.clone(), cancel.clone());

        tokio::spawn(Self::keep_alive_loop(
            client,
            lease_id,
            self.lease_ttl,
            cancel,
        ));

        debug!(key, lease_id, "lock acquired");
        Ok(Session {
            key: key.to_string(),
            id,
        })
    }

    async fn release(&self, session: Session) -> Result<(), LockError> {
        if let Some(cancel) = self.keep_alives.lock().await.remove(&session.id) {
            cancel.cancel();
        }
        let mut client = self.client.clone();
        client
            .unlock(session.id.clone().into_bytes())
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;
        Ok(())
    }
}
