//! Metadata service collaborator (spec §1): a remote RPC store of resource
//! definitions and statuses. Out of core scope — only this contract
//! matters; the actual service lives elsewhere.

pub mod memory;
pub mod remote;

use crate::errors::CoordinatorError;
use crate::model::{NameVariant, ResourceId, ResourceStatus, SourceDefinition, StatusUpdate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub id: ResourceId,
    pub provider: String,
    pub definition: SourceDefinition,
    pub status: ResourceStatus,
}

#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub id: ResourceId,
    pub source: NameVariant,
    pub offline_provider: String,
    pub online_provider: String,
    pub status: ResourceStatus,
    pub columns: FeatureColumns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureColumns {
    pub entity: String,
    pub value: String,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct LabelRecord {
    pub id: ResourceId,
    pub source: NameVariant,
    pub offline_provider: String,
    pub status: ResourceStatus,
    pub columns: FeatureColumns,
}

#[derive(Debug, Clone)]
pub struct TrainingSetRecord {
    pub id: ResourceId,
    pub label: NameVariant,
    pub features: Vec<NameVariant>,
    pub provider: String,
    pub status: ResourceStatus,
}

/// Thread-safe (spec §5, "The metadata client is thread-safe") and
/// long-lived; shared across all handler tasks via `Arc<dyn MetadataClient>`.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn get_source(&self, id: &ResourceId) -> Result<Option<SourceRecord>, CoordinatorError>;
    async fn get_feature(&self, id: &ResourceId) -> Result<Option<FeatureRecord>, CoordinatorError>;
    async fn get_label(&self, id: &ResourceId) -> Result<Option<LabelRecord>, CoordinatorError>;
    async fn get_training_set(&self, id: &ResourceId) -> Result<Option<TrainingSetRecord>, CoordinatorError>;

    /// Looks up the current status of any schedulable resource, used when
    /// checking an upstream's readiness (spec §4.F).
    async fn get_status(&self, id: &ResourceId) -> Result<Option<ResourceStatus>, CoordinatorError>;

    async fn set_status(&self, update: StatusUpdate) -> Result<(), CoordinatorError>;
}
