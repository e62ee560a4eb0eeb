//! Register-Source handler (spec §4.F): registers a primary SOURCE
//! resource's backing table with its offline provider.

use super::{serialize_config, ResourceHandler};
use crate::errors::CoordinatorError;
use crate::metadata::MetadataClient;
use crate::model::{ResourceId, SourceDefinition, StatusUpdate};
use crate::providers::ProviderRegistry;
use crate::retry::{retry, RetryConfig};
use crate::spawner::{kinds, Spawner};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

pub struct RegisterSourceHandler {
    metadata: Arc<dyn MetadataClient>,
    providers: Arc<dyn ProviderRegistry>,
    spawner: Arc<dyn Spawner>,
    retry: RetryConfig,
}

impl RegisterSourceHandler {
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
struct RegisterSourceConfig<'a> {
    table_name: &'a str,
}

#[async_trait]
impl ResourceHandler for RegisterSourceHandler {
    async fn handle(&self, resource: &ResourceId) -> Result<(), CoordinatorError> {
        let record = self
            .metadata
            .get_source(resource)
            .await?
            .ok_or_else(|| CoordinatorError::UnknownResource(resource.to_string()))?;

        let table_name = match &record.definition {
            SourceDefinition::Primary { table_name } => table_name,
            SourceDefinition::Transformation { .. } => {
                return Err(CoordinatorError::InvalidResource {
                    resource: resource.to_string(),
                    reason: "not a primary source".to_string(),
                })
            }
        };

        if table_name.is_empty() {
            return Err(CoordinatorError::InvalidResource {
                resource: resource.to_string(),
                reason: "empty source table name".to_string(),
            });
        }

        let provider_handle = retry("resolve-provider", &self.retry, || self.providers.resolve(&record.provider)).await?;
        let offline = provider_handle.as_offline().ok_or_else(|| {
            CoordinatorError::ProviderKindMismatch {
                resource: resource.to_string(),
                expected: "offline".to_string(),
                found: provider_handle.kind().to_string(),
            }
        })?;

        if !retry("table-exists", &self.retry, || offline.table_exists(table_name)).await? {
            return Err(CoordinatorError::UpstreamMissing {
                resource: resource.to_string(),
                upstream: table_name.clone(),
            });
        }

        let runner = self
            .spawner
            .get_runner(
                kinds::REGISTER_SOURCE,
                serialize_config(&RegisterSourceConfig { table_name })?,
                resource,
            )
            .await?;
        runner.run().await.wait().await?;

        retry("register-table", &self.retry, || offline.register_table(resource, table_name)).await?;
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
    use crate::metadata::SourceRecord;
    use crate::model::{ResourceKind, ResourceStatus};
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

    fn source_id() -> ResourceId {
        ResourceId::new(ResourceKind::Source, "orders", "v1")
    }

    fn spawner() -> Arc<dyn Spawner> {
        let registry = Arc::new(RunnerRegistry::new());
        registry.register(kinds::REGISTER_SOURCE, Arc::new(AlwaysOkFactory)).unwrap();
        Arc::new(InProcessSpawner::new(registry))
    }

    #[tokio::test]
    async fn empty_table_name_is_invalid_resource() {
        let id = source_id();
        let metadata = Arc::new(FakeMetadataClient::new().with_source(SourceRecord {
            id: id.clone(),
            provider: "bq".to_string(),
            definition: SourceDefinition::Primary {
                table_name: String::new(),
            },
            status: ResourceStatus::Created,
        }));
        let providers = Arc::new(FakeProviderRegistry::new(HashMap::new()));
        let handler = RegisterSourceHandler::new(metadata, providers, spawner(), RetryConfig::fixed(1, std::time::Duration::from_millis(1)));

        let err = handler.handle(&id).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidResource { .. }));
    }

    #[tokio::test]
    async fn missing_table_is_upstream_missing() {
        let id = source_id();
        let metadata = Arc::new(FakeMetadataClient::new().with_source(SourceRecord {
            id: id.clone(),
            provider: "bq".to_string(),
            definition: SourceDefinition::Primary {
                table_name: "orders_raw".to_string(),
            },
            status: ResourceStatus::Created,
        }));
        let mut map = HashMap::new();
        map.insert(
            "bq".to_string(),
            ProviderHandle::Offline(Arc::new(FakeOfflineProvider::new())),
        );
        let providers = Arc::new(FakeProviderRegistry::new(map));
        let handler = RegisterSourceHandler::new(metadata, providers, spawner(), RetryConfig::fixed(1, std::time::Duration::from_millis(1)));

        let err = handler.handle(&id).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::UpstreamMissing { .. }));
    }

    #[tokio::test]
    async fn existing_table_registers_and_marks_ready() {
        let id = source_id();
        let metadata = Arc::new(FakeMetadataClient::new().with_source(SourceRecord {
            id: id.clone(),
            provider: "bq".to_string(),
            definition: SourceDefinition::Primary {
                table_name: "orders_raw".to_string(),
            },
            status: ResourceStatus::Created,
        }));
        let mut map = HashMap::new();
        map.insert(
            "bq".to_string(),
            ProviderHandle::Offline(Arc::new(
                FakeOfflineProvider::new().with_existing_raw_table("orders_raw"),
            )),
        );
        let providers = Arc::new(FakeProviderRegistry::new(map));
        let handler = RegisterSourceHandler::new(metadata.clone(), providers, spawner(), RetryConfig::fixed(1, std::time::Duration::from_millis(1)));

        handler.handle(&id).await.unwrap();
        assert_eq!(metadata.status_of(&id), Some(ResourceStatus::Ready));
    }
}
