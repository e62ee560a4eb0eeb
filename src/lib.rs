pub mod config;
pub mod coordinator;
pub mod errors;
pub mod handlers;
pub mod http;
pub mod kv;
pub mod lock;
pub mod metadata;
pub mod model;
pub mod providers;
pub mod retry;
pub mod spawner;
pub mod template;
pub mod tracing_setup;

use config::CoordinatorConfig;
use handlers::{
    FeatureHandler, LabelHandler, RegisterSourceHandler, ResourceHandler, SourceHandler, TrainingSetHandler,
    TransformationHandler,
};
use kv::KvStore;
use lock::DistributedLock;
use metadata::MetadataClient;
use model::ResourceKind;
use providers::ProviderRegistry;
use spawner::Spawner;
use std::sync::Arc;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bootstrap bag of every collaborator the coordinator loop needs, built
/// once at process startup and shared (via `Arc`) across all job tasks.
pub struct Services {
    pub config: CoordinatorConfig,
    pub kv: Arc<dyn KvStore>,
    pub lock: Arc<dyn DistributedLock>,
    pub metadata: Arc<dyn MetadataClient>,
    pub providers: Arc<dyn ProviderRegistry>,
    pub spawner: Arc<dyn Spawner>,
    pub register_source: Arc<RegisterSourceHandler>,
    pub transformation: Arc<TransformationHandler>,
    pub feature: Arc<FeatureHandler>,
    pub label: Arc<LabelHandler>,
    pub training_set: Arc<TrainingSetHandler>,
    pub source: Arc<SourceHandler>,
}

impl Services {
    pub fn new(
        config: CoordinatorConfig,
        kv: Arc<dyn KvStore>,
        lock: Arc<dyn DistributedLock>,
        metadata: Arc<dyn MetadataClient>,
        providers: Arc<dyn ProviderRegistry>,
        spawner: Arc<dyn Spawner>,
    ) -> Self {
        let register_source = Arc::new(RegisterSourceHandler::new(
            metadata.clone(),
            providers.clone(),
            spawner.clone(),
            config.retry.clone(),
        ));
        let transformation = Arc::new(TransformationHandler::new(
            metadata.clone(),
            providers.clone(),
            spawner.clone(),
            config.retry.clone(),
        ));
        let feature = Arc::new(FeatureHandler::new(
            metadata.clone(),
            providers.clone(),
            spawner.clone(),
            config.retry.clone(),
        ));
        let label = Arc::new(LabelHandler::new(
            metadata.clone(),
            providers.clone(),
            spawner.clone(),
            config.retry.clone(),
        ));
        let training_set = Arc::new(TrainingSetHandler::new(
            metadata.clone(),
            providers.clone(),
            spawner.clone(),
            config.retry.clone(),
        ));
        let source = Arc::new(SourceHandler::new(
            metadata.clone(),
            register_source.clone(),
            transformation.clone(),
        ));

        Self {
            config,
            kv,
            lock,
            metadata,
            providers,
            spawner,
            register_source,
            transformation,
            feature,
            label,
            training_set,
            source,
        }
    }

    /// Resolves the handler to dispatch to for a schedulable resource kind
    /// (spec §4.G). `Provider`/`Entity`/`User` are never scheduled
    /// (`ResourceKind::is_schedulable`) and have no handler.
    pub fn handler_for(&self, kind: ResourceKind) -> Option<Arc<dyn ResourceHandler>> {
        match kind {
            ResourceKind::Source => Some(self.source.clone() as Arc<dyn ResourceHandler>),
            ResourceKind::Feature => Some(self.feature.clone() as Arc<dyn ResourceHandler>),
            ResourceKind::Label => Some(self.label.clone() as Arc<dyn ResourceHandler>),
            ResourceKind::TrainingSet => Some(self.training_set.clone() as Arc<dyn ResourceHandler>),
            ResourceKind::Provider | ResourceKind::Entity | ResourceKind::User => None,
        }
    }
}
