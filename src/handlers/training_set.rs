//! Run-Training-Set handler (spec §4.F): joins one ready label with N ready
//! features, all on the same offline provider, into a persisted training set.

use super::{serialize_config, ResourceHandler};
use crate::errors::CoordinatorError;
use crate::metadata::MetadataClient;
use crate::model::{NameVariant, ResourceId, ResourceKind, ResourceStatus, StatusUpdate};
use crate::providers::ProviderRegistry;
use crate::retry::{retry, RetryConfig};
use crate::spawner::{kinds, Spawner};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

pub struct TrainingSetHandler {
    metadata: Arc<dyn MetadataClient>,
    providers: Arc<dyn ProviderRegistry>,
    spawner: Arc<dyn Spawner>,
    retry: RetryConfig,
}

impl TrainingSetHandler {
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

    fn output_location(resource: &ResourceId) -> String {
        format!("{}_{}_training_set", resource.name, resource.variant)
    }
}

#[derive(Serialize)]
struct CreateTrainingSetConfig<'a> {
    label: &'a NameVariant,
    features: &'a [NameVariant],
    output_location: &'a str,
}

#[async_trait]
impl ResourceHandler for TrainingSetHandler {
    async fn handle(&self, resource: &ResourceId) -> Result<(), CoordinatorError> {
        let record = self
            .metadata
            .get_training_set(resource)
            .await?
            .ok_or_else(|| CoordinatorError::UnknownResource(resource.to_string()))?;

        let provider_handle = retry("resolve-provider", &self.retry, || self.providers.resolve(&record.provider)).await?;
        let offline = provider_handle.as_offline().ok_or_else(|| {
            CoordinatorError::ProviderKindMismatch {
                resource: resource.to_string(),
                expected: "offline".to_string(),
                found: provider_handle.kind().to_string(),
            }
        })?;

        if retry("get-materialization", &self.retry, || offline.get_materialization(resource))
            .await?
            .is_some()
        {
            return Err(CoordinatorError::AlreadyMaterialized(resource.to_string()));
        }

        let label_id = ResourceId::new(ResourceKind::Label, &record.label.name, &record.label.variant);
        let label = self
            .metadata
            .get_label(&label_id)
            .await?
            .ok_or_else(|| CoordinatorError::UpstreamMissing {
                resource: resource.to_string(),
                upstream: record.label.key(),
            })?;

        if label.status != ResourceStatus::Ready {
            return Err(CoordinatorError::UpstreamNotReady {
                resource: resource.to_string(),
                upstream: record.label.key(),
            }
            .transient());
        }
        if label.offline_provider != record.provider {
            return Err(CoordinatorError::ProviderKindMismatch {
                resource: record.label.key(),
                expected: record.provider.clone(),
                found: label.offline_provider,
            });
        }

        for feature_nv in &record.features {
            let feature_id = ResourceId::new(ResourceKind::Feature, &feature_nv.name, &feature_nv.variant);
            let feature = self
                .metadata
                .get_feature(&feature_id)
                .await?
                .ok_or_else(|| CoordinatorError::UpstreamMissing {
                    resource: resource.to_string(),
                    upstream: feature_nv.key(),
                })?;

            if feature.status != ResourceStatus::Ready {
                return Err(CoordinatorError::UpstreamNotReady {
                    resource: resource.to_string(),
                    upstream: feature_nv.key(),
                }
                .transient());
            }
            if feature.offline_provider != record.provider {
                return Err(CoordinatorError::ProviderKindMismatch {
                    resource: feature_nv.key(),
                    expected: record.provider.clone(),
                    found: feature.offline_provider,
                });
            }
        }

        let output_location = Self::output_location(resource);

        let runner = self
            .spawner
            .get_runner(
                kinds::CREATE_TRAINING_SET,
                serialize_config(&CreateTrainingSetConfig {
                    label: &record.label,
                    features: &record.features,
                    output_location: &output_location,
                })?,
                resource,
            )
            .await?;
        runner.run().await.wait().await?;

        retry("register-materialization", &self.retry, || {
            offline.register_materialization(resource, &output_location)
        })
        .await?;
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
    use crate::metadata::{FeatureColumns, FeatureRecord, LabelRecord, TrainingSetRecord};
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
            .register(kinds::CREATE_TRAINING_SET, Arc::new(AlwaysOkFactory))
            .unwrap();
        Arc::new(InProcessSpawner::new(registry))
    }

    fn columns() -> FeatureColumns {
        FeatureColumns {
            entity: "user_id".to_string(),
            value: "v".to_string(),
            timestamp: "ts".to_string(),
        }
    }

    fn setup(
        ts_id: &ResourceId,
        label_status: ResourceStatus,
        feature_status: ResourceStatus,
    ) -> (Arc<FakeMetadataClient>, Arc<FakeProviderRegistry>) {
        let label_id = ResourceId::new(ResourceKind::Label, "churn", "default");
        let feature_id = ResourceId::new(ResourceKind::Feature, "spend", "default");

        let metadata = Arc::new(
            FakeMetadataClient::new()
                .with_training_set(TrainingSetRecord {
                    id: ts_id.clone(),
                    label: NameVariant::new("churn", "default"),
                    features: vec![NameVariant::new("spend", "default")],
                    provider: "bq".to_string(),
                    status: ResourceStatus::Created,
                })
                .with_label(LabelRecord {
                    id: label_id,
                    source: NameVariant::new("orders", "v1"),
                    offline_provider: "bq".to_string(),
                    status: label_status,
                    columns: columns(),
                })
                .with_feature(FeatureRecord {
                    id: feature_id,
                    source: NameVariant::new("orders", "v1"),
                    offline_provider: "bq".to_string(),
                    online_provider: "redis".to_string(),
                    status: feature_status,
                    columns: columns(),
                }),
        );

        let mut map = HashMap::new();
        map.insert(
            "bq".to_string(),
            ProviderHandle::Offline(Arc::new(FakeOfflineProvider::new())),
        );
        let providers = Arc::new(FakeProviderRegistry::new(map));

        (metadata, providers)
    }

    #[tokio::test]
    async fn all_ready_marks_training_set_ready() {
        let ts_id = ResourceId::new(ResourceKind::TrainingSet, "churn_model", "v1");
        let (metadata, providers) = setup(&ts_id, ResourceStatus::Ready, ResourceStatus::Ready);
        let handler = TrainingSetHandler::new(
            metadata.clone(),
            providers,
            spawner(),
            RetryConfig::fixed(1, std::time::Duration::from_millis(1)),
        );

        handler.handle(&ts_id).await.unwrap();
        assert_eq!(metadata.status_of(&ts_id), Some(ResourceStatus::Ready));
    }

    #[tokio::test]
    async fn pending_feature_is_transient() {
        let ts_id = ResourceId::new(ResourceKind::TrainingSet, "churn_model", "v1");
        let (metadata, providers) = setup(&ts_id, ResourceStatus::Ready, ResourceStatus::Pending);
        let handler = TrainingSetHandler::new(
            metadata,
            providers,
            spawner(),
            RetryConfig::fixed(1, std::time::Duration::from_millis(1)),
        );

        let err = handler.handle(&ts_id).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn already_materialized_training_set_fails_permanently() {
        let ts_id = ResourceId::new(ResourceKind::TrainingSet, "churn_model", "v1");
        let (metadata, _providers) = setup(&ts_id, ResourceStatus::Ready, ResourceStatus::Ready);

        let mut map = HashMap::new();
        map.insert(
            "bq".to_string(),
            ProviderHandle::Offline(Arc::new(
                FakeOfflineProvider::new().with_materialization(&ts_id, "existing_location"),
            )),
        );
        let providers = Arc::new(FakeProviderRegistry::new(map));
        let handler = TrainingSetHandler::new(
            metadata,
            providers,
            spawner(),
            RetryConfig::fixed(1, std::time::Duration::from_millis(1)),
        );

        let err = handler.handle(&ts_id).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::AlreadyMaterialized(_)));
        assert!(!err.is_transient());
    }
}
