// Campus Meetup Server - group capacity, waitlists, stats and badges

use axum::Router;
use std::path::Path;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use campus_meetup::{api::create_meetup_router, app_state::AppState, config::Config};

/// Make sure the directory of a file-backed SQLite url exists
fn ensure_database_dir(url: &str) -> anyhow::Result<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    ensure_database_dir(&config.database.url)?;

    let app_state = AppState::new(config.clone()).await?;

    // Runs one sweep immediately, then on the configured interval
    let _sweeper = app_state.sweeper.clone().spawn(config.sweep_interval());

    let app = Router::new()
        .nest("/api/v1", create_meetup_router(app_state))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = config.server_address();
    info!(%addr, "Campus meetup server starting");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
