//! Run-SQL-Transformation handler (spec §4.F): resolves a transformation
//! SOURCE's template against its declared upstream sources and materializes
//! the result as a new registered table.

use super::{serialize_config, ResourceHandler};
use crate::errors::CoordinatorError;
use crate::metadata::MetadataClient;
use crate::model::{ResourceId, ResourceKind, ResourceStatus, SourceDefinition, StatusUpdate};
use crate::providers::ProviderRegistry;
use crate::retry::{retry, RetryConfig};
use crate::spawner::{kinds, Spawner};
use crate::template::{get_ordered_source_mappings, template_replace, SourceMapping};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

pub struct TransformationHandler {
    metadata: Arc<dyn MetadataClient>,
    providers: Arc<dyn ProviderRegistry>,
    spawner: Arc<dyn Spawner>,
    retry: RetryConfig,
}

impl TransformationHandler {
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

    fn output_table_name(resource: &ResourceId) -> String {
        format!("{}_{}", resource.name, resource.variant)
    }
}

#[derive(Serialize)]
struct TransformationConfig<'a> {
    resolved_sql: &'a str,
    source_mappings: &'a [SourceMapping],
    output_table: &'a str,
}

#[async_trait]
impl ResourceHandler for TransformationHandler {
    async fn handle(&self, resource: &ResourceId) -> Result<(), CoordinatorError> {
        let record = self
            .metadata
            .get_source(resource)
            .await?
            .ok_or_else(|| CoordinatorError::UnknownResource(resource.to_string()))?;

        let (template, declared_sources) = match &record.definition {
            SourceDefinition::Transformation {
                template,
                declared_sources,
            } => (template, declared_sources),
            SourceDefinition::Primary { .. } => {
                return Err(CoordinatorError::InvalidResource {
                    resource: resource.to_string(),
                    reason: "not a transformation source".to_string(),
                })
            }
        };

        let provider_handle = retry("resolve-provider", &self.retry, || self.providers.resolve(&record.provider)).await?;
        let offline = provider_handle.as_offline().ok_or_else(|| {
            CoordinatorError::ProviderKindMismatch {
                resource: resource.to_string(),
                expected: "offline".to_string(),
                found: provider_handle.kind().to_string(),
            }
        })?;

        let mut replacements = HashMap::new();
        for declared in declared_sources {
            let upstream_id = ResourceId::new(ResourceKind::Source, &declared.name, &declared.variant);

            let upstream = self
                .metadata
                .get_source(&upstream_id)
                .await?
                .ok_or_else(|| CoordinatorError::UpstreamMissing {
                    resource: resource.to_string(),
                    upstream: declared.key(),
                })?;

            if upstream.status != ResourceStatus::Ready {
                return Err(CoordinatorError::UpstreamNotReady {
                    resource: resource.to_string(),
                    upstream: declared.key(),
                }
                .transient());
            }

            if upstream.provider != record.provider {
                return Err(CoordinatorError::ProviderKindMismatch {
                    resource: declared.key(),
                    expected: record.provider.clone(),
                    found: upstream.provider,
                });
            }

            let table = retry("get-resource-table", &self.retry, || offline.get_resource_table(&upstream_id))
                .await?
                .ok_or_else(|| CoordinatorError::UpstreamMissing {
                    resource: resource.to_string(),
                    upstream: declared.key(),
                })?;

            replacements.insert(declared.key(), table);
        }

        let resolved_sql = template_replace(template, &replacements, offline.quoter())
            .map_err(|e| CoordinatorError::UnresolvedTemplateKey(e.to_string()))?;
        let mappings = get_ordered_source_mappings(declared_sources, &replacements, offline.quoter())
            .map_err(|e| CoordinatorError::UnresolvedTemplateKey(e.to_string()))?;

        let output_table = Self::output_table_name(resource);

        let runner = self
            .spawner
            .get_runner(
                kinds::CREATE_TRANSFORMATION,
                serialize_config(&TransformationConfig {
                    resolved_sql: &resolved_sql,
                    source_mappings: &mappings,
                    output_table: &output_table,
                })?,
                resource,
            )
            .await?;
        runner.run().await.wait().await?;

        retry("register-table", &self.retry, || offline.register_table(resource, &output_table)).await?;
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
    use crate::model::NameVariant;
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
        registry
            .register(kinds::CREATE_TRANSFORMATION, Arc::new(AlwaysOkFactory))
            .unwrap();
        Arc::new(InProcessSpawner::new(registry))
    }

    #[tokio::test]
    async fn upstream_not_ready_is_transient() {
        let transform_id = ResourceId::new(ResourceKind::Source, "clean_orders", "v1");
        let upstream_id = ResourceId::new(ResourceKind::Source, "orders", "v1");

        let metadata = Arc::new(
            FakeMetadataClient::new()
                .with_source(SourceRecord {
                    id: transform_id.clone(),
                    provider: "bq".to_string(),
                    definition: SourceDefinition::Transformation {
                        template: "SELECT * FROM {{orders.v1}}".to_string(),
                        declared_sources: vec![NameVariant::new("orders", "v1")],
                    },
                    status: ResourceStatus::Created,
                })
                .with_source(SourceRecord {
                    id: upstream_id,
                    provider: "bq".to_string(),
                    definition: SourceDefinition::Primary {
                        table_name: "orders_raw".to_string(),
                    },
                    status: ResourceStatus::Pending,
                }),
        );
        let mut map = HashMap::new();
        map.insert(
            "bq".to_string(),
            ProviderHandle::Offline(Arc::new(FakeOfflineProvider::new())),
        );
        let providers = Arc::new(FakeProviderRegistry::new(map));
        let handler = TransformationHandler::new(metadata, providers, spawner(), RetryConfig::fixed(1, std::time::Duration::from_millis(1)));

        let err = handler.handle(&transform_id).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn ready_upstream_resolves_sql_and_marks_ready() {
        let transform_id = ResourceId::new(ResourceKind::Source, "clean_orders", "v1");
        let upstream_id = ResourceId::new(ResourceKind::Source, "orders", "v1");

        let metadata = Arc::new(
            FakeMetadataClient::new()
                .with_source(SourceRecord {
                    id: transform_id.clone(),
                    provider: "bq".to_string(),
                    definition: SourceDefinition::Transformation {
                        template: "SELECT * FROM {{orders.v1}}".to_string(),
                        declared_sources: vec![NameVariant::new("orders", "v1")],
                    },
                    status: ResourceStatus::Created,
                })
                .with_source(SourceRecord {
                    id: upstream_id.clone(),
                    provider: "bq".to_string(),
                    definition: SourceDefinition::Primary {
                        table_name: "orders_raw".to_string(),
                    },
                    status: ResourceStatus::Ready,
                }),
        );
        let offline = Arc::new(
            FakeOfflineProvider::new().with_registered_table(&upstream_id, "orders_raw"),
        );
        let mut map = HashMap::new();
        map.insert("bq".to_string(), ProviderHandle::Offline(offline));
        let providers = Arc::new(FakeProviderRegistry::new(map));
        let handler = TransformationHandler::new(metadata.clone(), providers, spawner(), RetryConfig::fixed(1, std::time::Duration::from_millis(1)));

        handler.handle(&transform_id).await.unwrap();
        assert_eq!(metadata.status_of(&transform_id), Some(ResourceStatus::Ready));
    }
}
