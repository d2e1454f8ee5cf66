use std::sync::Arc;

use anyhow::Result;
use client::HttpClientFactory;
use docker::DockerCli;
use envconfig::Envconfig;
use service::StoreImpl;
use store::{
    balance::PostgresBalanceRepository,
    beacon::PostgresBeaconRepository,
    effectiveness::PostgresEffectivenessRepository,
    metric::PostgresMetricRepository,
    schema,
    validator::{PostgresBeaconNodeRepository, PostgresValidatorRepository},
    DbConfig,
};
use supervisor::{
    bootstrap::{bootstrap, Dispatcher},
    bus::EventBus,
    lifecycle::ValidatorLifecycle,
    metrics::StoreMetricsSink,
    orchestrator::LocalNodeOrchestrator,
    registry::{spawn_apply, BeaconRegistry, ValidatorRegistry},
    signing::{InMemorySlashingProtection, LoggingSignerFactory},
    Supervisor,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let db_config = DbConfig::init_from_env()?;
    let pool = store::connect(db_config).await?;
    schema::migrate(&pool).await?;

    let store: Arc<dyn service::Store> = Arc::new(StoreImpl::new(
        Arc::new(PostgresBeaconRepository::new(pool.clone())),
        Arc::new(PostgresValidatorRepository::new(pool.clone())),
        Arc::new(PostgresBeaconNodeRepository::new(pool.clone())),
        Arc::new(PostgresMetricRepository::new(pool.clone())),
        Arc::new(PostgresBalanceRepository::new(pool.clone())),
        Arc::new(PostgresEffectivenessRepository::new(pool)),
    ));

    let bus = EventBus::new();
    let beacons = Arc::new(BeaconRegistry::new());
    let validators = Arc::new(ValidatorRegistry::new());
    let registry_task = spawn_apply(&bus, beacons.clone(), validators.clone());

    let metrics = Arc::new(StoreMetricsSink::new(store.clone()));
    let clients: Arc<dyn client::ClientFactory> =
        Arc::new(HttpClientFactory::with_metrics(metrics));
    let runtime: Arc<dyn docker::ContainerRuntime> = Arc::new(DockerCli::new());

    let lifecycle = Arc::new(ValidatorLifecycle::new(
        bus.clone(),
        validators.clone(),
        clients.clone(),
        store.clone(),
        Arc::new(InMemorySlashingProtection::default()),
        Arc::new(LoggingSignerFactory),
    ));
    let orchestrator = Arc::new(LocalNodeOrchestrator::new(bus.clone(), runtime.clone()));

    let deps = Arc::new(Supervisor {
        bus,
        beacons,
        validators,
        clients,
        runtime,
        store,
        lifecycle,
        orchestrator,
    });

    let dispatcher = Dispatcher::new(deps.clone());
    let dispatcher_task = tokio::spawn(dispatcher.run());

    bootstrap(&deps).await?;
    log::info!("Supervisor is running");

    tokio::select! {
        _ = dispatcher_task => log::error!("Dispatcher stopped unexpectedly"),
        _ = registry_task => log::error!("Registry task stopped unexpectedly"),
        result = tokio::signal::ctrl_c() => {
            result?;
            log::info!("Shutting down");
        }
    }
    Ok(())
}
