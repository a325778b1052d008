mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use manifest_api::password_reset::{ResetDelivery, ResetSettings};
use manifest_api::{AppState, AppStateInner, JwtSettings};
use manifest_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "manifestlife=debug,manifest_api=debug,manifest_db=info,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.reset_delivery == ResetDelivery::InResponse {
        warn!("Reset tokens are returned in API responses; do not enable this in production");
    }

    // Init database
    let db = Database::open(&config.db_path)?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt: JwtSettings {
            secret: config.jwt_secret,
            ttl: config.jwt_ttl,
        },
        resets: ResetSettings {
            ttl: config.reset_token_ttl,
            delivery: config.reset_delivery,
        },
    });

    let app = manifest_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("ManifestLife API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and with it the last handle to the database) is dropped
    // when serve returns.
    info!("Server stopped, database closed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
