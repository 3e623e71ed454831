use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediarelay_server::config::Config;
use mediarelay_server::factory::TransportFactory;
use mediarelay_server::http::{create_router, AppState};
use mediarelay_server::metrics::PrometheusMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediarelay_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting media relay...");

    let config = Config::load()?;

    let registry = Arc::new(prometheus::Registry::new());
    let metrics = Arc::new(PrometheusMetrics::new(&registry)?);

    let factory = Arc::new(TransportFactory::new(&config, metrics)?);
    tracing::info!(
        "Transport factory ready with {} ICE servers, channel capacity {}",
        factory.ice_servers().len(),
        config.channel_capacity
    );

    let app = create_router(AppState { registry, factory });

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Listening on {}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
