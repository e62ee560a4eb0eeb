//! Coordinator Loop (spec §4.G): watches the job-key prefix, claims
//! unlocked jobs, dispatches to the right handler, reports status back to
//! metadata, deletes the job key on success.
//!
//! ```text
//! DISCOVERED --acquire lock--> CLAIMED --fetch resource--> VALIDATING
//!   VALIDATING --precondition ok--> RUNNING
//!              --transient fail--> release lock, stay DISCOVERED
//!              --permanent fail--> mark failed, delete job, release lock
//!   RUNNING --runner.wait ok--> mark ready, delete job, release lock
//!           --runner fail--> transient/permanent branch
//! ```

pub mod schedule;

use crate::errors::{CoordinatorError, SafeDisplay};
use crate::kv::WatchEventKind;
use crate::model::{JobValue, ResourceId, StatusUpdate};
use crate::retry::{backoff_for_attempt, retry};
use crate::Services;
use chrono::Utc;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const JOB_PREFIX: &str = "JOB__";

pub struct Coordinator {
    services: Arc<Services>,
}

impl Coordinator {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// Runs until `shutdown` is cancelled. Discovery has two sources (spec
    /// §4.G): a watch stream on the job prefix and a startup catch-up scan.
    /// The loop is level-triggered — it never assumes the watch stream is
    /// complete, and re-scans if the stream ends.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), CoordinatorError> {
        self.catch_up_scan().await?;

        let mut watch = self
            .services
            .kv
            .watch_prefix(JOB_PREFIX)
            .await
            .map_err(|e| CoordinatorError::KvStore(e.to_string()))?;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("coordinator loop shutting down");
                    return Ok(());
                }
                event = watch.next() => {
                    match event {
                        Some(Ok(event)) if event.kind == WatchEventKind::Put => {
                            self.spawn_job_task(event.key);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => warn!(error = %e, "job watch stream error"),
                        None => {
                            warn!("job watch stream ended, re-scanning and re-subscribing");
                            self.catch_up_scan().await?;
                            watch = self
                                .services
                                .kv
                                .watch_prefix(JOB_PREFIX)
                                .await
                                .map_err(|e| CoordinatorError::KvStore(e.to_string()))?;
                        }
                    }
                }
            }
        }
    }

    async fn catch_up_scan(&self) -> Result<(), CoordinatorError> {
        let entries = self
            .services
            .kv
            .list(JOB_PREFIX)
            .await
            .map_err(|e| CoordinatorError::KvStore(e.to_string()))?;
        for entry in entries {
            self.spawn_job_task(entry.key);
        }
        Ok(())
    }

    /// Concurrency model (spec §5): unbounded concurrent job claims, one
    /// task per claimed job; lock ownership is the only admission gate.
    fn spawn_job_task(&self, key: String) {
        let services = self.services.clone();
        tokio::spawn(async move {
            if let Err(e) = process_job_key(&services, &key).await {
                warn!(key, error = %e, "job processing failed unexpectedly");
            }
        });
    }
}

async fn process_job_key(services: &Arc<Services>, key: &str) -> Result<(), CoordinatorError> {
    let Some(resource) = ResourceId::parse_job_key(key) else {
        warn!(key, "unparseable job key, ignoring");
        return Ok(());
    };

    let lock_key = resource.lock_key();
    let session = match retry("job-lock-acquire", &services.config.lock.retry, || {
        services.lock.acquire(&lock_key)
    })
    .await
    {
        Ok(session) => session,
        // Another coordinator session (or process) holds this job; the
        // watch/catch-up cycle will present it again later (spec §4.B).
        Err(_busy) => return Ok(()),
    };

    let result = run_claimed_job(services, &resource, key).await;

    if let Err(e) = services.lock.release(session).await {
        warn!(key, error = %e, "failed to release lock");
    }

    result
}

async fn run_claimed_job(
    services: &Arc<Services>,
    resource: &ResourceId,
    key: &str,
) -> Result<(), CoordinatorError> {
    let Some(raw_value) = services
        .kv
        .get(key)
        .await
        .map_err(|e| CoordinatorError::KvStore(e.to_string()))?
    else {
        // Raced with another coordinator that already finished and deleted it.
        return Ok(());
    };
    let job: JobValue =
        serde_json::from_slice(&raw_value).map_err(|e| CoordinatorError::KvStore(e.to_string()))?;

    // Starvation guard (spec §5): a job repeatedly failing its own
    // preconditions backs off proportionally to its own attempt counter
    // rather than spinning every watch/scan cycle.
    if job.attempt > 0 {
        let backoff = backoff_for_attempt(
            job.attempt,
            services.config.scheduling.starvation_backoff_base,
            services.config.scheduling.starvation_backoff_ceiling,
        );
        tokio::time::sleep(backoff).await;
    }

    // "pending" means claimed, not running (spec §5).
    if let Err(e) = services
        .metadata
        .set_status(StatusUpdate::pending(resource.clone()))
        .await
    {
        warn!(%resource, error = %e, "failed to mark resource pending");
    }

    let Some(handler) = services.handler_for(resource.kind) else {
        warn!(%resource, "no handler registered for this resource kind");
        return Ok(());
    };

    // Deadline (spec §5, Cancellation): past it the runner is signaled to
    // stop without being invoked; the job is marked transiently failed and
    // its attempt counter still advances.
    let outcome = if job.is_past_deadline(Utc::now()) {
        Err(CoordinatorError::RunnerFailure {
            resource: resource.to_string(),
            reason: "deadline exceeded before the job could run".to_string(),
        }
        .transient())
    } else {
        handler.handle(resource).await
    };

    match outcome {
        Ok(()) => {
            services
                .kv
                .delete(key)
                .await
                .map_err(|e| CoordinatorError::KvStore(e.to_string()))?;
            Ok(())
        }
        // Upstream-not-ready is retried unconditionally (spec §4.F: "the
        // scheduler leaves the job in place to retry" — no attempt bound).
        // Only runner/spawn failures ever escalate to permanent.
        Err(e) if e.is_transient() && e.is_upstream_wait() => {
            let updated = job.next_attempt();
            let value = serde_json::to_vec(&updated).map_err(|e| CoordinatorError::KvStore(e.to_string()))?;
            services
                .kv
                .put(key, &value)
                .await
                .map_err(|e| CoordinatorError::KvStore(e.to_string()))?;
            Ok(())
        }
        Err(e) if e.is_transient() => {
            if job.attempt + 1 >= services.config.scheduling.failure_threshold {
                fail_permanently(services, resource, key, &e).await
            } else {
                let updated = job.next_attempt();
                let value = serde_json::to_vec(&updated).map_err(|e| CoordinatorError::KvStore(e.to_string()))?;
                services
                    .kv
                    .put(key, &value)
                    .await
                    .map_err(|e| CoordinatorError::KvStore(e.to_string()))?;
                Ok(())
            }
        }
        Err(e) => fail_permanently(services, resource, key, &e).await,
    }
}

async fn fail_permanently(
    services: &Arc<Services>,
    resource: &ResourceId,
    key: &str,
    error: &CoordinatorError,
) -> Result<(), CoordinatorError> {
    if let Err(e) = services
        .metadata
        .set_status(StatusUpdate::failed(resource.clone(), error.to_safe_string()))
        .await
    {
        warn!(%resource, error = %e, "failed to write failed status");
    }
    services
        .kv
        .delete(key)
        .await
        .map_err(|e| CoordinatorError::KvStore(e.to_string()))?;
    Ok(())
}
