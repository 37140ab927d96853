use kubefleet_api::config::FleetConfig;
use kubefleet_api::kubernetes::KubeConnector;
use kubefleet_api::logging::LoggingConfig;
use kubefleet_api::shutdown::ShutdownCoordinator;
use kubefleet_api::AppState;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::args().nth(1).as_deref() == Some("--print-config") {
        println!("{}", FleetConfig::generate_sample());
        return Ok(());
    }

    let config = FleetConfig::load().map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    // Keep the guard alive so buffered file output is flushed on exit
    let _log_guard = LoggingConfig::from(&config.logging).init()?;
    info!("Configuration loaded successfully");

    let connector = Arc::new(KubeConnector::new(
        config.registry.connect_timeout(),
        config.registry.read_timeout(),
    ));

    let (state, report) = AppState::initialize(config, connector).await?;
    info!(
        clusters = state.registry.len(),
        unhealthy = report.unhealthy.len(),
        skipped = report.skipped.len(),
        "kubefleet core started"
    );

    let coordinator = ShutdownCoordinator::new();
    coordinator
        .run(|| async move {
            state.shutdown().await;
        })
        .await;

    Ok(())
}
