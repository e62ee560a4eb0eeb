//! Job Spawner (spec §4.D): turns a runner kind + serialized config into a
//! live `Runner`, and the `Runner` into a `Completion` the caller awaits.
//! The core never knows what a runner actually does — these three traits
//! are the entire contract.

pub mod container;
pub mod in_process;
pub mod registry;

use crate::errors::CoordinatorError;
use crate::model::ResourceId;
use async_trait::async_trait;

/// Runner kinds, passed as opaque strings so the core never needs to know
/// the full set (spec §6); the five the original system ships are kept as
/// associated constants for call sites that need a literal.
pub mod kinds {
    pub const CREATE_TRAINING_SET: &str = "CREATE_TRAINING_SET";
    pub const MATERIALIZE: &str = "MATERIALIZE";
    pub const COPY_TO_ONLINE: &str = "COPY_TO_ONLINE";
    pub const CREATE_TRANSFORMATION: &str = "CREATE_TRANSFORMATION";
    pub const REGISTER_SOURCE: &str = "REGISTER_SOURCE";
}

/// A one-shot worker that executes a specific job kind.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(self: Box<Self>) -> Box<dyn Completion>;
}

/// A handle to a running (or already-finished) `Runner`.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Blocks until the runner reaches a terminal state. `Ok(())` on
    /// success, `Err` on non-zero completion (spec §7 `RunnerFailure`).
    async fn wait(self: Box<Self>) -> Result<(), CoordinatorError>;
}

/// Factory that produces a `Runner` for a given kind and config (spec §6).
#[async_trait]
pub trait Spawner: Send + Sync {
    /// Fails with [`CoordinatorError::UnknownRunner`] for an unrecognized
    /// `kind` (spec §4.D).
    async fn get_runner(
        &self,
        kind: &str,
        serialized_config: Vec<u8>,
        resource_id: &ResourceId,
    ) -> Result<Box<dyn Runner>, CoordinatorError>;
}
