use std::env;
use std::sync::Arc;

use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use driver_dispatch::config::Config;
use driver_dispatch::error::DispatchError;
use driver_dispatch::geo::GeoPoint;
use driver_dispatch::location::StaticPositionSource;
use driver_dispatch::session::FileTokenStore;
use driver_dispatch::state::DriverRuntime;

/// Headless driver agent: restores (or creates) a session, goes online and
/// logs snapshot changes until interrupted. Useful for exercising a backend
/// without the driver app.
#[tokio::main]
async fn main() -> Result<(), DispatchError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let driver_id = env::var("DRIVER_ID")
        .map_err(|_| DispatchError::Internal("DRIVER_ID is required".to_string()))?
        .parse::<Uuid>()
        .map_err(|err| DispatchError::Internal(format!("invalid DRIVER_ID: {err}")))?;
    let district = env::var("DRIVER_DISTRICT").ok();

    let store = Arc::new(FileTokenStore::new(config.token_path.clone()));
    let position = agent_position();
    let source = Arc::new(StaticPositionSource::new(
        position.unwrap_or(GeoPoint { lat: 0.0, lng: 0.0 }),
    ));

    let runtime = DriverRuntime::new(config, driver_id, district, store, source)?;

    if !runtime.session.restore().await? {
        let phone = env::var("DRIVER_PHONE")
            .map_err(|_| DispatchError::Internal("DRIVER_PHONE is required".to_string()))?;
        let password = env::var("DRIVER_PASSWORD")
            .map_err(|_| DispatchError::Internal("DRIVER_PASSWORD is required".to_string()))?;
        runtime.session.login(&phone, &password).await?;
    }

    runtime.cache.set_online(true).await;
    tracing::info!(driver_id = %driver_id, "driver online");

    if position.is_some() && runtime.tracker.start().await {
        tracing::info!("location tracking active");
    }

    let mut updates = runtime.cache.updates();
    tokio::spawn(async move {
        while let Some(snapshot) = updates.next().await {
            tracing::info!(
                immediate = snapshot.immediate.len(),
                scheduled = snapshot.scheduled.len(),
                "visible orders refreshed"
            );
        }
    });

    shutdown_signal().await;

    runtime.shutdown().await;
    if let Ok(report) = runtime.metrics.encode() {
        tracing::debug!(report = %report, "session counters");
    }
    tracing::info!("driver offline");
    Ok(())
}

fn agent_position() -> Option<GeoPoint> {
    let lat = env::var("AGENT_LAT").ok()?.parse().ok()?;
    let lng = env::var("AGENT_LNG").ok()?.parse().ok()?;
    Some(GeoPoint { lat, lng })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
