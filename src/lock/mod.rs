//! Distributed Lock (spec §4.B): session-scoped mutual exclusion on a
//! per-job key, released automatically on lease loss and idempotently on
//! explicit release.

pub mod etcd;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    /// Another coordinator session already holds this key; callers retry
    /// via [`crate::retry`] rather than treating this as fatal.
    #[error("lock busy: {0}")]
    Busy(String),

    #[error("lock backend error: {0}")]
    Backend(String),
}

/// A held lock. Dropping it without calling [`DistributedLock::release`]
/// leaves the sentinel in place until the lease expires (crash-safety);
/// well-behaved callers always release explicitly once done.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: String,
    pub id: String,
}

#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Establishes a keep-alive lease and writes a lock sentinel under
    /// `key`. Namespaced distinctly from the job key (`LOCK__<job-key>`,
    /// spec §6), so callers pass the already-prefixed lock key.
    async fn acquire(&self, key: &str) -> Result<Session, LockError>;

    /// Idempotent: releasing an already-released or expired session is not
    /// an error.
    async fn release(&self, session: Session) -> Result<(), LockError>;
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryLock;
    use super::*;

    #[tokio::test]
    async fn mutual_exclusion_for_a_single_key() {
        let lock = InMemoryLock::new();
        let session = lock.acquire("LOCK__JOB__A").await.unwrap();

        let busy = lock.acquire("LOCK__JOB__A").await;
        assert!(matches!(busy, Err(LockError::Busy(_))));

        lock.release(session).await.unwrap();
        assert!(lock.acquire("LOCK__JOB__A").await.is_ok());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let lock = InMemoryLock::new();
        let session = lock.acquire("LOCK__JOB__B").await.unwrap();
        lock.release(session.clone()).await.unwrap();
        lock.release(session).await.unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let lock = InMemoryLock::new();
        let a = lock.acquire("LOCK__JOB__A").await.unwrap();
        let b = lock.acquire("LOCK__JOB__B").await.unwrap();
        lock.release(a).await.unwrap();
        lock.release(b).await.unwrap();
    }
}
