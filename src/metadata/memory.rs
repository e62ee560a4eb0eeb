//! In-memory fake of the metadata collaborator, used by handler and
//! coordinator tests so they never need a live RPC endpoint.

use super::{FeatureRecord, LabelRecord, MetadataClient, SourceRecord, TrainingSetRecord};
use crate::errors::CoordinatorError;
use crate::model::{ResourceId, ResourceStatus, StatusUpdate};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeMetadataClient {
    sources: Mutex<HashMap<String, SourceRecord>>,
    features: Mutex<HashMap<String, FeatureRecord>>,
    labels: Mutex<HashMap<String, LabelRecord>>,
    training_sets: Mutex<HashMap<String, TrainingSetRecord>>,
    statuses: Mutex<HashMap<String, ResourceStatus>>,
}

impl FakeMetadataClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(self, record: SourceRecord) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(record.id.job_key(), record.status);
        self.sources.lock().unwrap().insert(record.id.job_key(), record);
        self
    }

    pub fn with_feature(self, record: FeatureRecord) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(record.id.job_key(), record.status);
        self.features.lock().unwrap().insert(record.id.job_key(), record);
        self
    }

    pub fn with_label(self, record: LabelRecord) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(record.id.job_key(), record.status);
        self.labels.lock().unwrap().insert(record.id.job_key(), record);
        self
    }

    pub fn with_training_set(self, record: TrainingSetRecord) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(record.id.job_key(), record.status);
        self.training_sets
            .lock()
            .unwrap()
            .insert(record.id.job_key(), record);
        self
    }

    pub fn status_of(&self, id: &ResourceId) -> Option<ResourceStatus> {
        self.statuses.lock().unwrap().get(&id.job_key()).copied()
    }
}

#[async_trait]
impl MetadataClient for FakeMetadataClient {
    async fn get_source(&self, id: &ResourceId) -> Result<Option<SourceRecord>, CoordinatorError> {
        Ok(self.sources.lock().unwrap().get(&id.job_key()).cloned())
    }

    async fn get_feature(&self, id: &ResourceId) -> Result<Option<FeatureRecord>, CoordinatorError> {
        Ok(self.features.lock().unwrap().get(&id.job_key()).cloned())
    }

    async fn get_label(&self, id: &ResourceId) -> Result<Option<LabelRecord>, CoordinatorError> {
        Ok(self.labels.lock().unwrap().get(&id.job_key()).cloned())
    }

    async fn get_training_set(&self, id: &ResourceId) -> Result<Option<TrainingSetRecord>, CoordinatorError> {
        Ok(self.training_sets.lock().unwrap().get(&id.job_key()).cloned())
    }

    async fn get_status(&self, id: &ResourceId) -> Result<Option<ResourceStatus>, CoordinatorError> {
        Ok(self.statuses.lock().unwrap().get(&id.job_key()).copied())
    }

    async fn set_status(&self, update: StatusUpdate) -> Result<(), CoordinatorError> {
        let key = update.resource.job_key();
        self.statuses.lock().unwrap().insert(key.clone(), update.status);

        // Keep each per-kind record's own `status` field in sync so a later
        // `get_source`/`get_feature`/... in the same test sees the update,
        // not just `get_status`.
        match update.resource.kind {
            crate::model::ResourceKind::Source => {
                if let Some(record) = self.sources.lock().unwrap().get_mut(&key) {
                    record.status = update.status;
                }
            }
            crate::model::ResourceKind::Feature => {
                if let Some(record) = self.features.lock().unwrap().get_mut(&key) {
                    record.status = update.status;
                }
            }
            crate::model::ResourceKind::Label => {
                if let Some(record) = self.labels.lock().unwrap().get_mut(&key) {
                    record.status = update.status;
                }
            }
            crate::model::ResourceKind::TrainingSet => {
                if let Some(record) = self.training_sets.lock().unwrap().get_mut(&key) {
                    record.status = update.status;
                }
            }
            crate::model::ResourceKind::Provider | crate::model::ResourceKind::Entity | crate::model::ResourceKind::User => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceKind, SourceDefinition};

    #[tokio::test]
    async fn set_status_is_visible_through_get_status() {
        let id = ResourceId::new(ResourceKind::Source, "orders", "v1");
        let client = FakeMetadataClient::new().with_source(SourceRecord {
            id: id.clone(),
            provider: "bq".to_string(),
            definition: SourceDefinition::Primary {
                table_name: "orders_raw".to_string(),
            },
            status: ResourceStatus::Created,
        });

        client
            .set_status(StatusUpdate::ready(id.clone()))
            .await
            .unwrap();

        assert_eq!(client.get_status(&id).await.unwrap(), Some(ResourceStatus::Ready));
    }

    #[tokio::test]
    async fn set_status_updates_the_record_itself_not_just_the_status_map() {
        let id = ResourceId::new(ResourceKind::Source, "orders", "v1");
        let client = FakeMetadataClient::new().with_source(SourceRecord {
            id: id.clone(),
            provider: "bq".to_string(),
            definition: SourceDefinition::Primary {
                table_name: "orders_raw".to_string(),
            },
            status: ResourceStatus::Created,
        });

        client.set_status(StatusUpdate::ready(id.clone())).await.unwrap();

        let record = client.get_source(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ResourceStatus::Ready);
    }
}
