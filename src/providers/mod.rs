//! Provider drivers (spec §1, §4.F): opaque capability objects exposing
//! `GetResourceTable`, `CreateTransformation`, `CreateTrainingSet`,
//! `GetMaterialization`. The core never executes SQL or copies bytes
//! itself — these traits are the contract it orchestrates against.

pub mod memory;

use crate::errors::CoordinatorError;
use crate::model::{ProviderKind, ResourceId};
use crate::template::TableQuoter;
use async_trait::async_trait;
use std::sync::Arc;

/// An offline warehouse: backs primary sources, transformations, the
/// source side of features/labels, and training sets.
#[async_trait]
pub trait OfflineProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn quoter(&self) -> &dyn TableQuoter;

    /// Backing table name for an already-registered resource, or `None` if
    /// it has never been registered.
    async fn get_resource_table(&self, resource: &ResourceId) -> Result<Option<String>, CoordinatorError>;

    async fn table_exists(&self, table_name: &str) -> Result<bool, CoordinatorError>;

    /// Registers `resource` as backed by `table_name` (register-source and
    /// the post-transformation registration step, spec §4.F).
    async fn register_table(&self, resource: &ResourceId, table_name: &str) -> Result<(), CoordinatorError>;

    /// `Some(location)` if a training set/label artifact already exists for
    /// `resource` (drives the `AlreadyMaterialized` check).
    async fn get_materialization(&self, resource: &ResourceId) -> Result<Option<String>, CoordinatorError>;

    /// Records that `resource`'s materialization runner finished and its
    /// artifact now lives at `location`, so a later `get_materialization`
    /// call observes it.
    async fn register_materialization(&self, resource: &ResourceId, location: &str) -> Result<(), CoordinatorError>;
}

/// An online key-value store: destination for feature materialization.
#[async_trait]
pub trait OnlineProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn supports_feature_tables(&self) -> bool;

    async fn get_materialization(&self, resource: &ResourceId) -> Result<Option<String>, CoordinatorError>;
}

/// A blob-backed file store; out of core scope beyond kind-checking, kept
/// as its own capability object rather than folded into offline/online so
/// provider-kind mismatches on it are distinguishable (spec §1).
pub trait FileProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
}

#[derive(Clone)]
pub enum ProviderHandle {
    Offline(Arc<dyn OfflineProvider>),
    Online(Arc<dyn OnlineProvider>),
    File(Arc<dyn FileProvider>),
}

impl ProviderHandle {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderHandle::Offline(p) => p.kind(),
            ProviderHandle::Online(p) => p.kind(),
            ProviderHandle::File(p) => p.kind(),
        }
    }

    pub fn as_offline(&self) -> Option<&Arc<dyn OfflineProvider>> {
        match self {
            ProviderHandle::Offline(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_online(&self) -> Option<&Arc<dyn OnlineProvider>> {
        match self {
            ProviderHandle::Online(p) => Some(p),
            _ => None,
        }
    }
}

/// Resolves a provider resource's name to a live capability object. Modeled
/// as its own trait (rather than folding resolution into the metadata
/// client) so tests can swap in fakes without standing up a fake RPC
/// client, mirroring the `*Service` trait-plus-fake split used throughout
/// this codebase.
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    async fn resolve(&self, provider_name: &str) -> Result<ProviderHandle, CoordinatorError>;
}
