//! Core data model (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Source,
    Feature,
    Label,
    TrainingSet,
    Provider,
    Entity,
    User,
}

impl ResourceKind {
    /// The four kinds that can own a job key (spec §3).
    pub fn is_schedulable(&self) -> bool {
        matches!(
            self,
            ResourceKind::Source
                | ResourceKind::Feature
                | ResourceKind::Label
                | ResourceKind::TrainingSet
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Source => "SOURCE",
            ResourceKind::Feature => "FEATURE",
            ResourceKind::Label => "LABEL",
            ResourceKind::TrainingSet => "TRAINING_SET",
            ResourceKind::Provider => "PROVIDER",
            ResourceKind::Entity => "ENTITY",
            ResourceKind::User => "USER",
        };
        write!(f, "{s}")
    }
}

/// `(name, variant, kind)`, unique within a kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub name: String,
    pub variant: String,
    pub kind: ResourceKind,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            variant: variant.into(),
        }
    }

    /// `"name.variant"`, the key used by the Template Replacements Map and
    /// by placeholders in templates (spec §3, §6).
    pub fn name_variant(&self) -> String {
        format!("{}.{}", self.name, self.variant)
    }

    /// Deterministic job key: `JOB__<kind>__<name>__<variant>` (spec §6).
    pub fn job_key(&self) -> String {
        format!("JOB__{}__{}__{}", self.kind, self.name, self.variant)
    }

    /// `SCHEDULEJOB__<kind>__<name>__<variant>` (spec §6).
    pub fn schedule_job_key(&self) -> String {
        format!(
            "SCHEDULEJOB__{}__{}__{}",
            self.kind, self.name, self.variant
        )
    }

    /// `LOCK__<job-key>` (spec §6).
    pub fn lock_key(&self) -> String {
        format!("LOCK__{}", self.job_key())
    }

    /// Parses a job key back into its `ResourceId`, the inverse of
    /// [`ResourceId::job_key`]. Used by the coordinator loop when a bare key
    /// arrives from a watch event or catch-up scan.
    pub fn parse_job_key(key: &str) -> Option<ResourceId> {
        let rest = key.strip_prefix("JOB__")?;
        Self::parse_parts(rest)
    }

    pub fn parse_schedule_job_key(key: &str) -> Option<ResourceId> {
        let rest = key.strip_prefix("SCHEDULEJOB__")?;
        Self::parse_parts(rest)
    }

    fn parse_parts(rest: &str) -> Option<ResourceId> {
        let mut parts = rest.splitn(3, "__");
        let kind = parts.next()?;
        let name = parts.next()?;
        let variant = parts.next()?;
        let kind = match kind {
            "SOURCE" => ResourceKind::Source,
            "FEATURE" => ResourceKind::Feature,
            "LABEL" => ResourceKind::Label,
            "TRAINING_SET" => ResourceKind::TrainingSet,
            "PROVIDER" => ResourceKind::Provider,
            "ENTITY" => ResourceKind::Entity,
            "USER" => ResourceKind::User,
            _ => return None,
        };
        Some(ResourceId::new(kind, name, variant))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name_variant())
    }
}

/// Value stored at a job key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobValue {
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    /// Optional deadline; past it the runner is signaled to stop and the
    /// job marked transiently failed (spec §5, Cancellation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl JobValue {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            enqueued_at: Utc::now(),
            deadline: None,
        }
    }

    pub fn with_attempt(attempt: u32) -> Self {
        Self {
            attempt,
            enqueued_at: Utc::now(),
            deadline: None,
        }
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            enqueued_at: self.enqueued_at,
            deadline: self.deadline,
        }
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline.map(|d| now > d).unwrap_or(false)
    }
}

impl Default for JobValue {
    fn default() -> Self {
        Self::new()
    }
}

/// Value stored at a schedule job key (spec §3 "Schedule Job").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleJobValue {
    pub schedule: String,
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
    Created,
    Pending,
    Ready,
    Failed,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceStatus::Created => "CREATED",
            ResourceStatus::Pending => "PENDING",
            ResourceStatus::Ready => "READY",
            ResourceStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// A status write-back to the metadata service, with an optional free-text
/// reason (spec §6).
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub resource: ResourceId,
    pub status: ResourceStatus,
    pub reason: Option<String>,
}

impl StatusUpdate {
    pub fn ready(resource: ResourceId) -> Self {
        Self {
            resource,
            status: ResourceStatus::Ready,
            reason: None,
        }
    }

    pub fn pending(resource: ResourceId) -> Self {
        Self {
            resource,
            status: ResourceStatus::Pending,
            reason: None,
        }
    }

    pub fn failed(resource: ResourceId, reason: impl Into<String>) -> Self {
        Self {
            resource,
            status: ResourceStatus::Failed,
            reason: Some(reason.into()),
        }
    }
}

/// Kind of provider a resource or transformation is backed by, consulted
/// when checking provider-kind preconditions (spec §4.F) and when
/// sanitizing template placeholders (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    OfflineGeneric,
    OfflineBigQuery,
    Online,
    FileStore,
}

impl ProviderKind {
    pub fn is_offline(&self) -> bool {
        matches!(self, ProviderKind::OfflineGeneric | ProviderKind::OfflineBigQuery)
    }

    pub fn is_online(&self) -> bool {
        matches!(self, ProviderKind::Online)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderKind::OfflineGeneric => "offline (generic)",
            ProviderKind::OfflineBigQuery => "offline (bigquery)",
            ProviderKind::Online => "online",
            ProviderKind::FileStore => "file store",
        };
        write!(f, "{s}")
    }
}

/// Tag distinguishing the two cases of a SOURCE resource (spec §9,
/// "Polymorphism over source kinds" — modeled as a tagged variant, not
/// subclassing).
#[derive(Debug, Clone)]
pub enum SourceDefinition {
    Primary {
        table_name: String,
    },
    Transformation {
        template: String,
        declared_sources: Vec<NameVariant>,
    },
}

/// A `"name.variant"` reference to another resource, as declared by a
/// transformation, feature, label, or training set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameVariant {
    pub name: String,
    pub variant: String,
}

impl NameVariant {
    pub fn new(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant: variant.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}.{}", self.name, self.variant)
    }
}

impl fmt::Display for NameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_key_round_trips_through_parse() {
        let id = ResourceId::new(ResourceKind::Source, "orders", "v3");
        let key = id.job_key();
        assert_eq!(key, "JOB__SOURCE__orders__v3");
        assert_eq!(ResourceId::parse_job_key(&key), Some(id));
    }

    #[test]
    fn lock_key_is_distinct_namespace_from_job_key() {
        let id = ResourceId::new(ResourceKind::Feature, "age", "default");
        assert!(id.lock_key().starts_with("LOCK__JOB__"));
        assert_ne!(id.lock_key(), id.job_key());
    }

    #[test]
    fn name_variant_with_empty_variant_is_valid() {
        let nv = NameVariant::new("clicks", "");
        assert_eq!(nv.key(), "clicks.");
    }
}
