use std::{net::SocketAddr, sync::Arc};
use stream_dashboard::{
    assets::load_logo,
    auth::{Authenticator, SessionStore},
    metrics::MetricsAggregator,
    router, warehouse, AppState, RefreshScheduler, Refresher, Settings,
};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let settings = Settings::load()?;
    let warehouse = warehouse::build(&settings.warehouse)?;
    info!(source = warehouse.name(), "warehouse configured");

    let aggregator = Arc::new(MetricsAggregator::new(warehouse, settings.cache_ttl()));
    let sessions = Arc::new(Mutex::new(SessionStore::new(settings.session_idle_ttl())));
    let refresher = Refresher::new(aggregator, sessions.clone());
    let scheduler = RefreshScheduler::new(refresher.clone(), settings.refresh_interval()).spawn();

    let logo = match &settings.logo_path {
        Some(path) => load_logo(path).await,
        None => None,
    };
    let state = AppState::new(
        settings.title.clone(),
        logo,
        settings.refresh_interval_secs,
        Authenticator::new(settings.dashboard_password.clone(), settings.tv_token.clone()),
        sessions,
        refresher,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.abort();
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
    }
}
