//! Configuration (ambient stack): TOML file + environment-variable
//! overrides via `figment`, grounded on `cloud-common/src/config.rs`'s
//! `MergedConfigLoader`/`RemoteCloudServiceConfig` and
//! `cloud-component-service/src/config.rs`'s `make_config_loader`. The
//! corpus builds these two on top of `golem_common::config::ConfigLoader`,
//! whose source wasn't retrieved into the pack, so the loader itself is
//! reimplemented directly on `figment` here rather than through that type.

use crate::retry::RetryConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub environment: String,
    pub kv: KvConfig,
    pub lock: LockConfig,
    pub metadata: MetadataConfig,
    pub spawner: SpawnerConfig,
    pub scheduling: SchedulingConfig,
    /// Shared with lock-acquire contention (spec §4.C): "used both for lock
    /// acquisition and for transient provider errors." Handlers thread this
    /// into every `OfflineProvider`/`OnlineProvider`/`ProviderRegistry` call.
    pub retry: RetryConfig,
    pub http_port: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KvConfig {
    pub endpoints: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(with = "humantime_serde")]
    pub lease_ttl: Duration,
    pub retry: RetryConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub base_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpawnerConfig {
    /// "in-process" or "container".
    pub kind: String,
    pub container_namespace: String,
    pub container_image: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Permanent-failure threshold for a job's attempt counter (spec §9
    /// Open Questions: fixed at 5, within the suggested [3, 10]).
    pub failure_threshold: u32,
    #[serde(with = "humantime_serde")]
    pub starvation_backoff_base: Duration,
    #[serde(with = "humantime_serde")]
    pub starvation_backoff_ceiling: Duration,
    #[serde(with = "humantime_serde")]
    pub schedule_poll_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            environment: "dev".to_string(),
            kv: KvConfig {
                endpoints: vec!["http://localhost:2379".to_string()],
            },
            lock: LockConfig {
                lease_ttl: Duration::from_secs(15),
                retry: RetryConfig::fixed(5, Duration::from_millis(200)),
            },
            metadata: MetadataConfig {
                base_url: "http://localhost:8080".to_string(),
            },
            spawner: SpawnerConfig {
                kind: "in-process".to_string(),
                container_namespace: "default".to_string(),
                container_image: "coordinator-runner:latest".to_string(),
            },
            scheduling: SchedulingConfig {
                failure_threshold: 5,
                starvation_backoff_base: Duration::from_secs(1),
                starvation_backoff_ceiling: Duration::from_secs(60),
                schedule_poll_interval: Duration::from_secs(30),
            },
            retry: RetryConfig::fixed(3, Duration::from_millis(250)),
            http_port: 8082,
        }
    }
}

/// Mirrors the corpus's `HasConfigExamples` pattern so `--dump-config`
/// output can show annotated alternative configurations; unused here
/// beyond the default, since no alternative topology needs documenting yet.
pub trait HasConfigExamples: Sized {
    fn examples() -> Vec<(&'static str, Self)> {
        Vec::new()
    }
}

impl HasConfigExamples for CoordinatorConfig {}

pub fn config_file_name() -> PathBuf {
    PathBuf::from("config/coordinator.toml")
}

/// Loads [`CoordinatorConfig`] by layering environment variables
/// (`COORDINATOR_*`, double-underscore nested) over `config/coordinator.toml`
/// over the compiled-in default.
pub fn load_config() -> figment::Result<CoordinatorConfig> {
    Figment::from(Serialized::defaults(CoordinatorConfig::default()))
        .merge(Toml::file(config_file_name()))
        .merge(Env::prefixed("COORDINATOR_").split("__"))
        .extract()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_internally_consistent() {
        let config = CoordinatorConfig::default();
        assert!(config.scheduling.failure_threshold >= 3);
        assert!(config.scheduling.failure_threshold <= 10);
    }
}
