//! Run-Feature-Materialization handler (spec §4.F): copies a feature's
//! offline column mapping into the online store.

use super::{serialize_config, ResourceHandler};
use crate::errors::CoordinatorError;
use crate::metadata::{FeatureColumns, MetadataClient};
use crate::model::{ResourceId, ResourceKind, ResourceStatus, StatusUpdate};
use crate::providers::ProviderRegistry;
use crate::retry::{retry, RetryConfig};
use crate::spawner::{kinds, Spawner};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

pub struct FeatureHandler {
    metadata: Arc<dyn MetadataClient>,
    providers: Arc<dyn ProviderRegistry>,
    spawner: Arc<dyn Spawner>,
    retry: RetryConfig,
}

impl FeatureHandler {
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        providers: Arc<dyn ProviderRegistry>,
        spawner: Arc<dyn Spawner>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            metadata,
            providers,
            spawner,
            retry,
        }
    }
}

#[derive(Serialize)]
struct MaterializeConfig<'a> {
    source_table: &'a str,
    columns: &'a FeatureColumns,
}

#[async_trait]
impl ResourceHandler for FeatureHandler {
    async fn handle(&self, resource: &ResourceId) -> Result<(), CoordinatorError> {
        let record = self
            .metadata
            .get_feature(resource)
            .await?
            .ok_or_else(|| CoordinatorError::UnknownResource(resource.to_string()))?;

        if record.status == ResourceStatus::Ready {
            return Ok(());
        }

        let source_id = ResourceId::new(ResourceKind::Source, &record.source.name, &record.source.variant);
        let source = self
            .metadata
            .get_source(&source_id)
            .await?
            .ok_or_else(|| CoordinatorError::UpstreamMissing {
                resource: resource.to_string(),
                upstream: record.source.key(),
            })?;

        if source.status != ResourceStatus::Ready {
            return Err(CoordinatorError::UpstreamNotReady {
                resource: resource.to_string(),
                upstream: record.source.key(),
            }
            .transient());
        }

        let offline_handle = retry("resolve-provider", &self.retry, || self.providers.resolve(&record.offline_provider)).await?;
        let offline = offline_handle.as_offline().ok_or_else(|| {
            CoordinatorError::ProviderKindMismatch {
                resource: resource.to_string(),
                expected: "offline".to_string(),
                found: offline_handle.kind().to_string(),
            }
        })?;

        let online_handle = retry("resolve-provider", &self.retry, || self.providers.resolve(&record.online_provider)).await?;
        let online = online_handle.as_online().ok_or_else(|| {
            CoordinatorError::ProviderKindMismatch {
                resource: resource.to_string(),
                expected: "online".to_string(),
                found: online_handle.kind().to_string(),
            }
        })?;

        if !online.supports_feature_tables() {
            return Err(CoordinatorError::ProviderKindMismatch {
                resource: resource.to_string(),
                expected: "online provider with feature-table support".to_string(),
                found: "online provider without feature-table support".to_string(),
            });
        }

        let source_table = retry("get-resource-table", &self.retry, || offline.get_resource_table(&source_id))
            .await?
            .ok_or_else(|| CoordinatorError::UpstreamMissing {
                resource: resource.to_string(),
                upstream: record.source.key(),
            })?;

        let runner = self
            .spawner
            .get_runner(
                kinds::COPY_TO_ONLINE,
                serialize_config(&MaterializeConfig {
                    source_table: &source_table,
                    columns: &record.columns,
                })?,
                resource,
            )
            .await?;
        runner.run().await.wait().await?;

        self.metadata
            .set_status(StatusUpdate::ready(resource.clone()))
            .await?;

        Ok(())
    }
}
