//! Schedule Job loop (spec §3 "Schedule Job", §4.G): periodically re-drives
//! a resource on a cron schedule instead of waiting for a one-shot job key.
//!
//! Decision (Open Question — recurring schedule vs. one-shot job
//! semantics): a schedule job's lock is held for the whole run, not just
//! the claim. If the lock is still held when the next tick fires, that
//! tick is dropped rather than queued — a slow run absorbs its own next
//! trigger instead of piling up backlog.

use crate::errors::{CoordinatorError, SafeDisplay};
use crate::model::{ResourceId, ScheduleJobValue, StatusUpdate};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Services;

const SCHEDULE_PREFIX: &str = "SCHEDULEJOB__";

pub struct ScheduleLoop {
    services: Arc<Services>,
}

impl ScheduleLoop {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), CoordinatorError> {
        let mut ticker = tokio::time::interval(self.services.config.scheduling.schedule_poll_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(error = %e, "schedule poll failed");
                    }
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<(), CoordinatorError> {
        let entries = self
            .services
            .kv
            .list(SCHEDULE_PREFIX)
            .await
            .map_err(|e| CoordinatorError::KvStore(e.to_string()))?;
        let now = Utc::now();
        let window = self.services.config.scheduling.schedule_poll_interval;

        for entry in entries {
            let Some(resource) = ResourceId::parse_schedule_job_key(&entry.key) else {
                warn!(key = %entry.key, "unparseable schedule job key, ignoring");
                continue;
            };
            let value: ScheduleJobValue = match serde_json::from_slice(&entry.value) {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "malformed schedule job value, ignoring");
                    continue;
                }
            };
            let schedule = match Schedule::from_str(&value.schedule) {
                Ok(schedule) => schedule,
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "unparseable cron expression, ignoring");
                    continue;
                }
            };
            if !is_due(&schedule, now, window) {
                continue;
            }
            self.spawn_due_run(resource, entry.key, value);
        }
        Ok(())
    }

    fn spawn_due_run(&self, resource: ResourceId, key: String, value: ScheduleJobValue) {
        let services = self.services.clone();
        tokio::spawn(async move {
            run_due_schedule(&services, &resource, &key, value).await;
        });
    }
}

/// A tick is due if the schedule has an occurrence in `(now - window, now]`
/// — i.e. one landed since the last poll, so no tick is missed between polls.
fn is_due(schedule: &Schedule, now: DateTime<Utc>, window: std::time::Duration) -> bool {
    let window_start = now - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
    schedule.after(&window_start).take(1).any(|occurrence| occurrence <= now)
}

async fn run_due_schedule(services: &Arc<Services>, resource: &ResourceId, key: &str, value: ScheduleJobValue) {
    let lock_key = resource.lock_key();
    let session = match services.lock.acquire(&lock_key).await {
        Ok(session) => session,
        Err(_busy) => {
            debug!(%resource, "schedule tick dropped, a run is already in flight");
            return;
        }
    };

    let Some(handler) = services.handler_for(resource.kind) else {
        warn!(%resource, "no handler registered for a scheduled resource kind");
        let _ = services.lock.release(session).await;
        return;
    };

    match handler.handle(resource).await {
        Ok(()) => {
            if value.attempt != 0 {
                persist_attempt(services, key, &value, 0).await;
            }
        }
        // Upstream-not-ready retries unconditionally and never grows the
        // attempt counter (spec §4.F); only runner/spawn errors do.
        Err(e) if e.is_transient() && e.is_upstream_wait() => {
            debug!(%resource, error = %e, "scheduled run is waiting on an upstream, next tick will retry");
        }
        Err(e) if e.is_transient() => {
            warn!(%resource, error = %e, "scheduled run failed transiently, next tick will retry");
            persist_attempt(services, key, &value, value.attempt + 1).await;
        }
        Err(e) => {
            warn!(%resource, error = %e, "scheduled run failed permanently");
            if let Err(write_err) = services
                .metadata
                .set_status(StatusUpdate::failed(resource.clone(), e.to_safe_string()))
                .await
            {
                warn!(%resource, error = %write_err, "failed to write failed status for scheduled resource");
            }
        }
    }

    if let Err(e) = services.lock.release(session).await {
        warn!(%resource, error = %e, "failed to release schedule lock");
    }
}

async fn persist_attempt(services: &Arc<Services>, key: &str, value: &ScheduleJobValue, attempt: u32) {
    let updated = ScheduleJobValue {
        schedule: value.schedule.clone(),
        attempt,
    };
    match serde_json::to_vec(&updated) {
        Ok(bytes) => {
            if let Err(e) = services.kv.put(key, &bytes).await {
                warn!(key, error = %e, "failed to persist schedule job attempt counter");
            }
        }
        Err(e) => warn!(key, error = %e, "failed to serialize schedule job value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_minute_schedule_is_due_within_a_one_minute_window() {
        let schedule = Schedule::from_str("0 * * * * * *").unwrap();
        let now = Utc::now();
        assert!(is_due(&schedule, now, std::time::Duration::from_secs(65)));
    }

    #[test]
    fn far_future_schedule_is_not_due() {
        let schedule = Schedule::from_str("0 0 0 1 1 * 2099").unwrap();
        let now = Utc::now();
        assert!(!is_due(&schedule, now, std::time::Duration::from_secs(30)));
    }
}
