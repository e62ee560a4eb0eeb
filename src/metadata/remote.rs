//! HTTP-backed `MetadataClient`, used when the coordinator is wired against
//! a live metadata service rather than the in-memory fake.
//!
//! The metadata service's own schema is out of scope (spec §1); this talks
//! a minimal JSON contract over it and is the one place that contract is
//! assumed.

use super::{FeatureColumns, FeatureRecord, LabelRecord, MetadataClient, SourceRecord, TrainingSetRecord};
use crate::errors::CoordinatorError;
use crate::model::{NameVariant, ResourceId, ResourceKind, ResourceStatus, SourceDefinition, StatusUpdate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub struct RemoteMetadataClient {
    base_url: String,
    http: reqwest::Client,
}

impl RemoteMetadataClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    fn resource_url(&self, kind: &str, id: &ResourceId) -> String {
        format!(
            "{}/resources/{kind}/{}/{}",
            self.base_url, id.name, id.variant
        )
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: String) -> Result<Option<T>, CoordinatorError> {
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CoordinatorError::Metadata(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| CoordinatorError::Metadata(e.to_string()))?;
        resp.json::<T>()
            .await
            .map(Some)
            .map_err(|e| CoordinatorError::Metadata(e.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SourceWire {
    provider: String,
    status: ResourceStatus,
    #[serde(default)]
    table_name: Option<String>,
    #[serde(default)]
    template: Option<String>,
    #[serde(default)]
    declared_sources: Vec<NameVariantWire>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NameVariantWire {
    name: String,
    variant: String,
}

impl From<NameVariantWire> for NameVariant {
    fn from(w: NameVariantWire) -> Self {
        NameVariant::new(w.name, w.variant)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FeatureWire {
    source_name: String,
    source_variant: String,
    offline_provider: String,
    online_provider: String,
    status: ResourceStatus,
    columns: FeatureColumns,
}

#[derive(Debug, Serialize, Deserialize)]
struct LabelWire {
    source_name: String,
    source_variant: String,
    offline_provider: String,
    status: ResourceStatus,
    columns: FeatureColumns,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrainingSetWire {
    label_name: String,
    label_variant: String,
    features: Vec<NameVariantWire>,
    provider: String,
    status: ResourceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusWire {
    status: ResourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[async_trait]
impl MetadataClient for RemoteMetadataClient {
    async fn get_source(&self, id: &ResourceId) -> Result<Option<SourceRecord>, CoordinatorError> {
        let wire: Option<SourceWire> = self.get_json(self.resource_url("sources", id)).await?;
        Ok(wire.map(|w| {
            let definition = match w.table_name {
                Some(table_name) => SourceDefinition::Primary { table_name },
                None => SourceDefinition::Transformation {
                    template: w.template.unwrap_or_default(),
                    declared_sources: w.declared_sources.into_iter().map(Into::into).collect(),
                },
            };
            SourceRecord {
                id: id.clone(),
                provider: w.provider,
                definition,
                status: w.status,
            }
        }))
    }

    async fn get_feature(&self, id: &ResourceId) -> Result<Option<FeatureRecord>, CoordinatorError> {
        let wire: Option<FeatureWire> = self.get_json(self.resource_url("features", id)).await?;
        Ok(wire.map(|w| FeatureRecord {
            id: id.clone(),
            source: NameVariant::new(w.source_name, w.source_variant),
            offline_provider: w.offline_provider,
            online_provider: w.online_provider,
            status: w.status,
            columns: w.columns,
        }))
    }

    async fn get_label(&self, id: &ResourceId) -> Result<Option<LabelRecord>, CoordinatorError> {
        let wire: Option<LabelWire> = self.get_json(self.resource_url("labels", id)).await?;
        Ok(wire.map(|w| LabelRecord {
            id: id.clone(),
            source: NameVariant::new(w.source_name, w.source_variant),
            offline_provider: w.offline_provider,
            status: w.status,
            columns: w.columns,
        }))
    }

    async fn get_training_set(&self, id: &ResourceId) -> Result<Option<TrainingSetRecord>, CoordinatorError> {
        let wire: Option<TrainingSetWire> = self.get_json(self.resource_url("training-sets", id)).await?;
        Ok(wire.map(|w| TrainingSetRecord {
            id: id.clone(),
            label: NameVariant::new(w.label_name, w.label_variant),
            features: w.features.into_iter().map(Into::into).collect(),
            provider: w.provider,
            status: w.status,
        }))
    }

    async fn get_status(&self, id: &ResourceId) -> Result<Option<ResourceStatus>, CoordinatorError> {
        let path = match id.kind {
            ResourceKind::Source => "sources",
            ResourceKind::Feature => "features",
            ResourceKind::Label => "labels",
            ResourceKind::TrainingSet => "training-sets",
            ResourceKind::Provider => "providers",
            ResourceKind::Entity => "entities",
            ResourceKind::User => "users",
        };
        let wire: Option<StatusWire> = self
            .get_json(format!("{}/status", self.resource_url(path, id)))
            .await?;
        Ok(wire.map(|w| w.status))
    }

    async fn set_status(&self, update: StatusUpdate) -> Result<(), CoordinatorError> {
        let path = match update.resource.kind {
            ResourceKind::Source => "sources",
            ResourceKind::Feature => "features",
            ResourceKind::Label => "labels",
            ResourceKind::TrainingSet => "training-sets",
            ResourceKind::Provider => "providers",
            ResourceKind::Entity => "entities",
            ResourceKind::User => "users",
        };
        let url = format!("{}/status", self.resource_url(path, &update.resource));
        self.http
            .put(&url)
            .json(&StatusWire {
                status: update.status,
                reason: update.reason,
            })
            .send()
            .await
            .map_err(|e| CoordinatorError::Metadata(e.to_string()))?
            .error_for_status()
            .map_err(|e| CoordinatorError::Metadata(e.to_string()))?;
        Ok(())
    }
}
