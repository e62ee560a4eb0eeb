//! Register-Label handler (spec §4.F): symmetric to feature registration,
//! but materializes only the offline side.

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

pub struct LabelHandler {
    metadata: Arc<dyn MetadataClient>,
    providers: Arc<dyn ProviderRegistry>,
    spawner: Arc<dyn Spawner>,
    retry: RetryConfig,
}

impl LabelHandler {
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
struct LabelMaterializeConfig<'a> {
    source_table: &'a str,
    columns: &'a FeatureColumns,
}

#[async_trait]
impl ResourceHandler for LabelHandler {
    async fn handle(&self, resource: &ResourceId) -> Result<(), CoordinatorError> {
        let record = self
            .metadata
            .get_label(resource)
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

        let source_table = retry("get-resource-table", &self.retry, || offline.get_resource_table(&source_id))
            .await?
            .ok_or_else(|| CoordinatorError::UpstreamMissing {
                resource: resource.to_string(),
                upstream: record.source.key(),
            })?;

        let runner = self
            .spawner
            .get_runner(
                kinds::MATERIALIZE,
                serialize_config(&LabelMaterializeConfig {
                    source_table: &source_table,
                    columns: &record.columns,
                })?,
                resource,
            )
            .await?;
        runner.run().await.wait().await?;

        let label_table = format!("{}_{}_label", resource.name, resource.variant);
        retry("register-table", &self.retry, || offline.register_table(resource, &label_table)).await?;
        self.metadata
            .set_status(StatusUpdate::ready(resource.clone()))
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::memory::FakeMetadataClient;
    use crate::metadata::{LabelRecord, SourceRecord};
    use crate::model::{NameVariant, SourceDefinition};
    use crate::providers::memory::{FakeOfflineProvider, FakeProviderRegistry};
    use crate::providers::ProviderHandle;
    use crate::spawner::in_process::{FnRunner, InProcessSpawner};
    use crate::spawner::registry::{RunnerFactory, RunnerRegistry};
    use std::collections::HashMap;

    struct AlwaysOkFactory;
    impl RunnerFactory for AlwaysOkFactory {
        fn create(&self, _config: Vec<u8>, _resource: &ResourceId) -> Box<dyn crate::spawner::Runner> {
            Box::new(FnRunner(|| Ok(())))
        }
    }

    fn spawner() -> Arc<dyn Spawner> {
        let registry = Arc::new(RunnerRegistry::new());
        registry.register(kinds::MATERIALIZE, Arc::new(AlwaysOkFactory)).unwrap();
        Arc::new(InProcessSpawner::new(registry))
    }

    #[tokio::test]
    async fn label_materializes_when_source_ready() {
        let label_id = ResourceId::new(ResourceKind::Label, "churn", "default");
        let source_id = ResourceId::new(ResourceKind::Source, "orders", "v1");

        let metadata = Arc::new(
            FakeMetadataClient::new()
                .with_label(LabelRecord {
                    id: label_id.clone(),
                    source: NameVariant::new("orders", "v1"),
                    offline_provider: "bq".to_string(),
                    status: ResourceStatus::Created,
                    columns: FeatureColumns {
                        entity: "user_id".to_string(),
                        value: "churned".to_string(),
                        timestamp: "event_ts".to_string(),
                    },
                })
                .with_source(SourceRecord {
                    id: source_id.clone(),
                    provider: "bq".to_string(),
                    definition: SourceDefinition::Primary {
                        table_name: "orders_raw".to_string(),
                    },
                    status: ResourceStatus::Ready,
                }),
        );
        let mut map = HashMap::new();
        map.insert(
            "bq".to_string(),
            ProviderHandle::Offline(Arc::new(
                FakeOfflineProvider::new().with_registered_table(&source_id, "orders_raw"),
            )),
        );
        let providers = Arc::new(FakeProviderRegistry::new(map));
        let handler = LabelHandler::new(
            metadata.clone(),
            providers,
            spawner(),
            RetryConfig::fixed(1, std::time::Duration::from_millis(1)),
        );

        handler.handle(&label_id).await.unwrap();
        assert_eq!(metadata.status_of(&label_id), Some(ResourceStatus::Ready));
    }

    #[tokio::test]
    async fn already_ready_label_is_a_no_op() {
        let label_id = ResourceId::new(ResourceKind::Label, "churn", "default");
        let metadata = Arc::new(FakeMetadataClient::new().with_label(LabelRecord {
            id: label_id.clone(),
            source: NameVariant::new("orders", "v1"),
            offline_provider: "bq".to_string(),
            status: ResourceStatus::Ready,
            columns: FeatureColumns {
                entity: "user_id".to_string(),
                value: "churned".to_string(),
                timestamp: "event_ts".to_string(),
            },
        }));
        let providers = Arc::new(FakeProviderRegistry::new(HashMap::new()));
        let handler = LabelHandler::new(
            metadata,
            providers,
            spawner(),
            RetryConfig::fixed(1, std::time::Duration::from_millis(1)),
        );

        handler.handle(&label_id).await.unwrap();
    }
}
