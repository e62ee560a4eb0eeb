//! In-process spawner (spec §4.D): invokes a registered factory in the same
//! process; completion resolves synchronously. Used for tests and for
//! providers whose materialization is local.

use super::registry::RunnerRegistry;
use super::{Completion, Runner, Spawner};
use crate::errors::CoordinatorError;
use crate::model::ResourceId;
use async_trait::async_trait;
use std::sync::Arc;

pub struct InProcessSpawner {
    registry: Arc<RunnerRegistry>,
}

impl InProcessSpawner {
    pub fn new(registry: Arc<RunnerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Spawner for InProcessSpawner {
    async fn get_runner(
        &self,
        kind: &str,
        serialized_config: Vec<u8>,
        resource_id: &ResourceId,
    ) -> Result<Box<dyn Runner>, CoordinatorError> {
        let factory = self
            .registry
            .resolve(kind)
            .ok_or_else(|| CoordinatorError::UnknownRunner(kind.to_string()))?;
        Ok(factory.create(serialized_config, resource_id))
    }
}

/// A `Runner` built directly from a closure, for built-in runner kinds and
/// tests that don't need a real process boundary.
pub struct FnRunner<F>(pub F)
where
    F: FnOnce() -> Result<(), CoordinatorError> + Send + 'static;

#[async_trait]
impl<F> Runner for FnRunner<F>
where
    F: FnOnce() -> Result<(), CoordinatorError> + Send + 'static,
{
    async fn run(self: Box<Self>) -> Box<dyn Completion> {
        Box::new(ImmediateCompletion((self.0)()))
    }
}

/// A `Completion` that has already resolved by the time it's returned,
/// matching the in-process spawner's synchronous-completion contract.
pub struct ImmediateCompletion(pub Result<(), CoordinatorError>);

#[async_trait]
impl Completion for ImmediateCompletion {
    async fn wait(self: Box<Self>) -> Result<(), CoordinatorError> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::super::registry::RunnerFactory;
    use super::*;
    use crate::model::ResourceKind;

    struct AlwaysSucceedsFactory;

    impl RunnerFactory for AlwaysSucceedsFactory {
        fn create(&self, _serialized_config: Vec<u8>, _resource_id: &ResourceId) -> Box<dyn Runner> {
            Box::new(FnRunner(|| Ok(())))
        }
    }

    struct AlwaysFailsFactory;

    impl RunnerFactory for AlwaysFailsFactory {
        fn create(&self, _serialized_config: Vec<u8>, resource_id: &ResourceId) -> Box<dyn Runner> {
            let resource = resource_id.to_string();
            Box::new(FnRunner(move || {
                Err(CoordinatorError::RunnerFailure {
                    resource,
                    reason: "boom".to_string(),
                })
            }))
        }
    }

    fn resource() -> ResourceId {
        ResourceId::new(ResourceKind::Feature, "age", "default")
    }

    #[tokio::test]
    async fn unknown_runner_kind_is_an_error() {
        let spawner = InProcessSpawner::new(Arc::new(RunnerRegistry::new()));
        let err = spawner
            .get_runner("NOPE", vec![], &resource())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::UnknownRunner(_)));
    }

    #[tokio::test]
    async fn successful_run_resolves_completion_ok() {
        let registry = Arc::new(RunnerRegistry::new());
        registry
            .register(super::super::kinds::MATERIALIZE, Arc::new(AlwaysSucceedsFactory))
            .unwrap();
        let spawner = InProcessSpawner::new(registry);

        let runner = spawner
            .get_runner(super::super::kinds::MATERIALIZE, vec![], &resource())
            .await
            .unwrap();
        runner.run().await.wait().await.unwrap();
    }

    #[tokio::test]
    async fn failed_run_resolves_completion_err() {
        let registry = Arc::new(RunnerRegistry::new());
        registry
            .register(super::super::kinds::MATERIALIZE, Arc::new(AlwaysFailsFactory))
            .unwrap();
        let spawner = InProcessSpawner::new(registry);

        let runner = spawner
            .get_runner(super::super::kinds::MATERIALIZE, vec![], &resource())
            .await
            .unwrap();
        let err = runner.run().await.wait().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::RunnerFailure { .. }));
    }
}
