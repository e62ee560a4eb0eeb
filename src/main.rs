use coordinator::config::{load_config, CoordinatorConfig};
use coordinator::coordinator::schedule::ScheduleLoop;
use coordinator::coordinator::Coordinator;
use coordinator::kv::etcd::EtcdKvStore;
use coordinator::kv::KvStore;
use coordinator::lock::etcd::EtcdLock;
use coordinator::lock::DistributedLock;
use coordinator::metadata::remote::RemoteMetadataClient;
use coordinator::metadata::MetadataClient;
use coordinator::providers::memory::FakeProviderRegistry;
use coordinator::providers::ProviderRegistry;
use coordinator::spawner::container::ContainerSpawner;
use coordinator::spawner::in_process::InProcessSpawner;
use coordinator::spawner::registry::RunnerRegistry;
use coordinator::spawner::Spawner;
use coordinator::Services;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

fn main() -> std::io::Result<()> {
    if std::env::args().any(|arg| arg == "--dump-config") {
        let config = CoordinatorConfig::default();
        println!("{}", toml::to_string_pretty(&config).expect("default config always serializes"));
        return Ok(());
    }

    let config = load_config().map_err(std::io::Error::other)?;
    coordinator::tracing_setup::init(&config.environment);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(config))
}

async fn async_main(config: CoordinatorConfig) -> std::io::Result<()> {
    info!(environment = %config.environment, http_port = config.http_port, "starting coordinator");

    let kv: Arc<dyn KvStore> = Arc::new(
        EtcdKvStore::connect(&config.kv.endpoints)
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?,
    );

    let etcd_client = etcd_client::Client::connect(&config.kv.endpoints, None)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let lock: Arc<dyn DistributedLock> = Arc::new(EtcdLock::new(etcd_client, config.lock.lease_ttl));

    let metadata: Arc<dyn MetadataClient> = Arc::new(RemoteMetadataClient::new(config.metadata.base_url.clone()));

    // Concrete provider drivers (the SQL warehouse / online store clients
    // behind each provider name) are an opaque collaborator out of scope
    // here, same as the metadata service's own schema; a real deployment
    // plugs its driver set in where this empty registry sits.
    let providers: Arc<dyn ProviderRegistry> = Arc::new(FakeProviderRegistry::new(HashMap::new()));

    let spawner: Arc<dyn Spawner> = match config.spawner.kind.as_str() {
        "container" => {
            let kube_client = kube::Client::try_default()
                .await
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            Arc::new(ContainerSpawner::new(
                kube_client,
                config.spawner.container_namespace.clone(),
                config.spawner.container_image.clone(),
            ))
        }
        _ => Arc::new(InProcessSpawner::new(Arc::new(RunnerRegistry::new()))),
    };

    let services = Arc::new(Services::new(config.clone(), kv, lock, metadata, providers, spawner));

    let shutdown = CancellationToken::new();

    let coordinator_loop = {
        let services = services.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = Coordinator::new(services).run(shutdown).await {
                error!(error = %e, "coordinator loop exited with an error");
            }
        })
    };

    let schedule_loop = {
        let services = services.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = ScheduleLoop::new(services).run(shutdown).await {
                error!(error = %e, "schedule loop exited with an error");
            }
        })
    };

    let registry = prometheus::Registry::new();
    let http_port = config.http_port;
    let http_server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let app = coordinator::http::routes(registry);
            let listener = poem::listener::TcpListener::bind(format!("0.0.0.0:{http_port}"));
            let result = poem::Server::new(listener)
                .run_with_graceful_shutdown(app, shutdown.cancelled_owned(), None)
                .await;
            if let Err(e) = result {
                error!(error = %e, "http server exited with an error");
            }
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = coordinator_loop => {
            error!("coordinator loop exited unexpectedly");
        }
    }

    shutdown.cancel();
    let _ = schedule_loop.await;
    let _ = http_server.await;

    Ok(())
}
