use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use smcp_auth::{DcrBootstrapper, KeySourceClient, MemoryKeyStore, TokenValidator, ValidatorConfig};
use smcp_server::config::{Config, LogFormat};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);

    config.validate().context("invalid configuration")?;

    let key_source = Arc::new(KeySourceClient::new(
        config.issuer.clone(),
        Duration::from_secs(config.key_source_timeout_secs),
        Duration::from_secs(config.key_cache_ttl_secs),
        Duration::from_secs(config.discovery_cache_ttl_secs),
    )?);

    if config.use_dcr {
        let bootstrapper = DcrBootstrapper::new(
            key_source.clone(),
            config.app_name.clone(),
            config.resource.clone(),
            config.dcr_client_file.clone(),
            Duration::from_secs(config.key_source_timeout_secs),
        )?;
        let client = bootstrapper
            .bootstrap(config.dcr_initial_access_token.as_deref())
            .await
            .context("dynamic client registration failed")?;
        tracing::info!(client_id = %client.client_id, "client identity ready");
    }

    let validator_config = ValidatorConfig {
        issuer: config.issuer.clone(),
        audience: config.audience.clone(),
        allowed_algorithms: config.parsed_algorithms()?,
        leeway: Duration::from_secs(config.clock_skew_leeway_secs),
        azp_fallback: config.azp_fallback,
    };
    let validator = TokenValidator::new(validator_config, MemoryKeyStore::new(), key_source);

    let app = smcp_server::build_router(&config, validator);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(address = %config.bind, issuer = %config.issuer, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to install shutdown handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
