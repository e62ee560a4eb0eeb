//! In-process fakes for the provider traits, used by handler tests.

use super::{OfflineProvider, OnlineProvider, ProviderHandle, ProviderRegistry};
use crate::errors::CoordinatorError;
use crate::model::{ProviderKind, ResourceId};
use crate::template::{GenericOfflineQuoter, TableQuoter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeOfflineProvider {
    tables: Mutex<HashMap<String, String>>,
    existing_raw_tables: Mutex<std::collections::HashSet<String>>,
    materializations: Mutex<HashMap<String, String>>,
}

impl FakeOfflineProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registered_table(self, resource: &ResourceId, table: &str) -> Self {
        self.tables
            .lock()
            .unwrap()
            .insert(resource.job_key(), table.to_string());
        self.existing_raw_tables
            .lock()
            .unwrap()
            .insert(table.to_string());
        self
    }

    pub fn with_existing_raw_table(self, table: &str) -> Self {
        self.existing_raw_tables
            .lock()
            .unwrap()
            .insert(table.to_string());
        self
    }
}

#[async_trait]
impl OfflineProvider for FakeOfflineProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OfflineGeneric
    }

    fn quoter(&self) -> &dyn TableQuoter {
        &GenericOfflineQuoter
    }

    async fn get_resource_table(&self, resource: &ResourceId) -> Result<Option<String>, CoordinatorError> {
        Ok(self.tables.lock().unwrap().get(&resource.job_key()).cloned())
    }

    async fn table_exists(&self, table_name: &str) -> Result<bool, CoordinatorError> {
        Ok(self.existing_raw_tables.lock().unwrap().contains(table_name))
    }

    async fn register_table(&self, resource: &ResourceId, table_name: &str) -> Result<(), CoordinatorError> {
        self.tables
            .lock()
            .unwrap()
            .insert(resource.job_key(), table_name.to_string());
        self.existing_raw_tables
            .lock()
            .unwrap()
            .insert(table_name.to_string());
        Ok(())
    }

    async fn get_materialization(&self, resource: &ResourceId) -> Result<Option<String>, CoordinatorError> {
        Ok(self
            .materializations
            .lock()
            .unwrap()
            .get(&resource.job_key())
            .cloned())
    }

    async fn register_materialization(&self, resource: &ResourceId, location: &str) -> Result<(), CoordinatorError> {
        self.mark_materialized(resource, location);
        Ok(())
    }
}

impl FakeOfflineProvider {
    pub fn mark_materialized(&self, resource: &ResourceId, location: &str) {
        self.materializations
            .lock()
            .unwrap()
            .insert(resource.job_key(), location.to_string());
    }

    pub fn with_materialization(self, resource: &ResourceId, location: &str) -> Self {
        self.mark_materialized(resource, location);
        self
    }
}

#[derive(Default)]
pub struct FakeOnlineProvider {
    supports_feature_tables: bool,
    materializations: Mutex<HashMap<String, String>>,
}

impl FakeOnlineProvider {
    pub fn new(supports_feature_tables: bool) -> Self {
        Self {
            supports_feature_tables,
            materializations: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl OnlineProvider for FakeOnlineProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Online
    }

    fn supports_feature_tables(&self) -> bool {
        self.supports_feature_tables
    }

    async fn get_materialization(&self, resource: &ResourceId) -> Result<Option<String>, CoordinatorError> {
        Ok(self
            .materializations
            .lock()
            .unwrap()
            .get(&resource.job_key())
            .cloned())
    }
}

/// Resolves provider names from a fixed map handed in at construction time.
pub struct FakeProviderRegistry {
    providers: HashMap<String, ProviderHandle>,
}

impl FakeProviderRegistry {
    pub fn new(providers: HashMap<String, ProviderHandle>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl ProviderRegistry for FakeProviderRegistry {
    async fn resolve(&self, provider_name: &str) -> Result<ProviderHandle, CoordinatorError> {
        self.providers
            .get(provider_name)
            .cloned()
            .ok_or_else(|| CoordinatorError::UnknownResource(provider_name.to_string()))
    }
}
