//! Error taxonomy shared across the coordinator (spec §7).

use thiserror::Error;

/// Errors implement `Display` for logs and `SafeDisplay` for the message
/// pushed back to the metadata service as a resource's failure reason.
/// The two can differ: `Display` may include internal detail (endpoints,
/// raw provider errors) that `to_safe_string` strips.
pub trait SafeDisplay {
    fn to_safe_string(&self) -> String;
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("unknown runner kind: {0}")]
    UnknownRunner(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("invalid resource {resource}: {reason}")]
    InvalidResource { resource: String, reason: String },

    #[error("provider kind mismatch for {resource}: expected {expected}, found {found}")]
    ProviderKindMismatch {
        resource: String,
        expected: String,
        found: String,
    },

    #[error("upstream missing for {resource}: {upstream}")]
    UpstreamMissing { resource: String, upstream: String },

    #[error("upstream not ready for {resource}: {upstream}")]
    UpstreamNotReady { resource: String, upstream: String },

    #[error("unresolved template key: {0}")]
    UnresolvedTemplateKey(String),

    #[error("already materialized: {0}")]
    AlreadyMaterialized(String),

    #[error("runner failure for {resource}: {reason}")]
    RunnerFailure { resource: String, reason: String },

    #[error("lock busy for {0}")]
    LockBusy(String),

    #[error("kv store error: {0}")]
    KvStore(String),

    #[error("metadata service error: {0}")]
    Metadata(String),

    /// Wraps any of the above to mark it as retryable rather than permanent
    /// (spec §7 "Transient"). The scheduler leaves the job key in place.
    #[error("transient: {0}")]
    Transient(Box<CoordinatorError>),
}

impl CoordinatorError {
    pub fn transient(self) -> CoordinatorError {
        CoordinatorError::Transient(Box::new(self))
    }

    /// Whether the scheduler should leave the job for a retry (true) or mark
    /// the resource permanently failed and delete the job key (false).
    pub fn is_transient(&self) -> bool {
        matches!(self, CoordinatorError::Transient(_))
    }

    /// Whether this (transient) error is "upstream not ready" rather than a
    /// runner/spawn failure. Spec §4.F gives the two different retry
    /// semantics: an upstream that hasn't materialized yet is retried
    /// unconditionally, while a runner/spawn error is only retried for the
    /// first *K* attempts before becoming permanent. Callers use this to
    /// keep upstream waits out of the attempt-counter escalation entirely.
    pub fn is_upstream_wait(&self) -> bool {
        match self {
            CoordinatorError::UpstreamNotReady { .. } => true,
            CoordinatorError::Transient(inner) => inner.is_upstream_wait(),
            _ => false,
        }
    }
}

impl SafeDisplay for CoordinatorError {
    fn to_safe_string(&self) -> String {
        match self {
            CoordinatorError::UnknownRunner(kind) => format!("unknown runner kind: {kind}"),
            CoordinatorError::UnknownResource(id) => format!("unknown resource: {id}"),
            CoordinatorError::InvalidResource { resource, reason } => {
                format!("invalid resource {resource}: {reason}")
            }
            CoordinatorError::ProviderKindMismatch {
                resource,
                expected,
                found,
            } => format!("provider kind mismatch for {resource}: expected {expected}, found {found}"),
            CoordinatorError::UpstreamMissing { resource, upstream } => {
                format!("upstream missing for {resource}: {upstream}")
            }
            CoordinatorError::UpstreamNotReady { resource, upstream } => {
                format!("upstream not ready for {resource}: {upstream}")
            }
            CoordinatorError::UnresolvedTemplateKey(key) => {
                format!("unresolved template key: {key}")
            }
            CoordinatorError::AlreadyMaterialized(id) => format!("already materialized: {id}"),
            CoordinatorError::RunnerFailure { resource, .. } => {
                format!("runner failed while materializing {resource}")
            }
            CoordinatorError::LockBusy(key) => format!("job {key} is already being worked on"),
            CoordinatorError::KvStore(_) => "internal coordinator error".to_string(),
            CoordinatorError::Metadata(_) => "metadata service is unavailable".to_string(),
            CoordinatorError::Transient(inner) => inner.to_safe_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
