//! In-process fake lock used by tests; a single held-sentinel map stands
//! in for the etcd lease.

use super::{DistributedLock, LockError, Session};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryLock {
    held: Mutex<HashMap<String, String>>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn acquire(&self, key: &str) -> Result<Session, LockError> {
        let mut held = self.held.lock().unwrap();
        if held.contains_key(key) {
            return Err(LockError::Busy(key.to_string()));
        }
        let id = Uuid::new_v4().to_string();
        held.insert(key.to_string(), id.clone());
        Ok(Session {
            key: key.to_string(),
            id,
        })
    }

    async fn release(&self, session: Session) -> Result<(), LockError> {
        let mut held = self.held.lock().unwrap();
        if held.get(&session.key) == Some(&session.id) {
            held.remove(&session.key);
        }
        Ok(())
    }
}
