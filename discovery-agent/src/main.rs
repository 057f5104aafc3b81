use anyhow::{Context, Result};
use apigee_discovery::config::resolve_config;
use apigee_discovery::CredentialManager;
use discovery_agent::connectors::apigee::ApigeeClient;
use discovery_agent::jobs::ProxyValidator;
use discovery_agent::registry::{build, Wiring};
use discovery_agent::LoggingConsumer;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "discovery_agent=info,apigee_discovery=info".into()),
        )
        .init();

    info!("Discovery agent starting...");

    let config_path = std::env::var("APIGEE_DISCOVERY_CONFIG")
        .unwrap_or_else(|_| "discovery.toml".to_string());
    let config = resolve_config(&config_path)?;

    info!(
        config = %config_path,
        organization = %config.organization,
        url = %config.url,
        data_url = %config.data_url,
        developer_id = %config.developer_id,
        page_size = config.page_size,
        "Configuration loaded"
    );

    let wiring = Wiring {
        credentials: CredentialManager::from_config(&config.auth),
        fetcher: Arc::new(ApigeeClient::new()),
        consumer: Arc::new(LoggingConsumer),
        register_validator: Arc::new(|validator: ProxyValidator| {
            info!(
                proxies = validator.discovered_count(),
                "API validator registered"
            );
        }),
    };

    let mut discovery = build(&config, wiring).context("Failed to build discovery jobs")?;
    let started = discovery.manager.start();
    info!(jobs_started = started, "Discovery manager started");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    discovery.manager.shutdown().await;
    info!("Discovery agent stopped");

    Ok(())
}
