//! Process-global registry of runner factories (spec §4.D, "Registration of
//! runner factories is process-global; double-registration of the same
//! name fails").

use super::Runner;
use crate::errors::CoordinatorError;
use crate::model::ResourceId;
use scc::HashMap as ConcurrentHashMap;
use std::sync::Arc;

pub trait RunnerFactory: Send + Sync {
    fn create(&self, serialized_config: Vec<u8>, resource_id: &ResourceId) -> Box<dyn Runner>;
}

/// Shared via `Arc` between the in-process spawner and whatever bootstrap
/// code registers the built-in runner kinds at startup.
#[derive(Default)]
pub struct RunnerRegistry {
    factories: ConcurrentHashMap<String, Arc<dyn RunnerFactory>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self {
            factories: ConcurrentHashMap::new(),
        }
    }

    pub fn register(
        &self,
        kind: impl Into<String>,
        factory: Arc<dyn RunnerFactory>,
    ) -> Result<(), CoordinatorError> {
        let kind = kind.into();
        self.factories
            .insert(kind.clone(), factory)
            .map_err(|_| CoordinatorError::InvalidResource {
                resource: kind,
                reason: "runner kind already registered".to_string(),
            })
    }

    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn RunnerFactory>> {
        self.factories.read(kind, |_, factory| factory.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubRunner;

    #[async_trait::async_trait]
    impl Runner for StubRunner {
        async fn run(self: Box<Self>) -> Box<dyn super::super::Completion> {
            unimplemented!("not exercised by these tests")
        }
    }

    struct StubFactory;

    impl RunnerFactory for StubFactory {
        fn create(&self, _serialized_config: Vec<u8>, _resource_id: &ResourceId) -> Box<dyn Runner> {
            Box::new(StubRunner)
        }
    }

    #[test]
    fn double_registration_of_the_same_kind_fails() {
        let registry = RunnerRegistry::new();
        registry.register("MATERIALIZE", Arc::new(StubFactory)).unwrap();
        let second = registry.register("MATERIALIZE", Arc::new(StubFactory));
        assert!(second.is_err());
    }

    #[test]
    fn unregistered_kind_resolves_to_none() {
        let registry = RunnerRegistry::new();
        assert!(registry.resolve("MATERIALIZE").is_none());
    }
}
