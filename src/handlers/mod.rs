//! Resource Handlers (spec §4.F): one workflow per resource kind, each
//! shaped fetch → validate preconditions → resolve dependencies → spawn
//! runner → wait → set status.

mod feature;
mod label;
mod register_source;
mod training_set;
mod transformation;

pub use feature::FeatureHandler;
pub use label::LabelHandler;
pub use register_source::RegisterSourceHandler;
pub use training_set::TrainingSetHandler;
pub use transformation::TransformationHandler;

use crate::errors::CoordinatorError;
use crate::metadata::MetadataClient;
use crate::model::{ResourceId, SourceDefinition};
use async_trait::async_trait;
use std::sync::Arc;

/// Common shape every per-kind handler implements; the coordinator loop
/// dispatches on `ResourceId::kind` to pick one (spec §4.G).
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Runs the full fetch-validate-spawn-wait workflow for `resource`. The
    /// caller (the coordinator loop) is responsible for translating a
    /// transient error into "leave job, release lock" and a permanent one
    /// into "mark failed, delete job" — this method only needs to return
    /// the right error shape (`CoordinatorError::Transient` wrapping, or not).
    async fn handle(&self, resource: &ResourceId) -> Result<(), CoordinatorError>;
}

pub(crate) fn serialize_config<T: serde::Serialize>(config: &T) -> Result<Vec<u8>, CoordinatorError> {
    serde_json::to_vec(config).map_err(|e| CoordinatorError::InvalidResource {
        resource: "<serialized-config>".to_string(),
        reason: e.to_string(),
    })
}

/// SOURCE resources dispatch on their definition tag rather than subclassing
/// (spec §9): fetches once, then delegates to [`RegisterSourceHandler`] or
/// [`TransformationHandler`] depending on whether the tag is `Primary` or
/// `Transformation`.
pub struct SourceHandler {
    metadata: Arc<dyn MetadataClient>,
    register_source: Arc<RegisterSourceHandler>,
    transformation: Arc<TransformationHandler>,
}

impl SourceHandler {
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        register_source: Arc<RegisterSourceHandler>,
        transformation: Arc<TransformationHandler>,
    ) -> Self {
        Self {
            metadata,
            register_source,
            transformation,
        }
    }
}

#[async_trait]
impl ResourceHandler for SourceHandler {
    async fn handle(&self, resource: &ResourceId) -> Result<(), CoordinatorError> {
        let record = self
            .metadata
            .get_source(resource)
            .await?
            .ok_or_else(|| CoordinatorError::UnknownResource(resource.to_string()))?;

        match record.definition {
            SourceDefinition::Primary { .. } => self.register_source.handle(resource).await,
            SourceDefinition::Transformation { .. } => self.transformation.handle(resource).await,
        }
    }
}
