use std::{net::SocketAddr, str::FromStr, time::Duration};

use payment_receiver::{
    reconcile::SqliteStore, routes::build_router, state::AppState, webhook::WebhookConfig,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let webhook = WebhookConfig::from_env()?;
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:receiver.db".to_string());
    let bind_addr =
        std::env::var("RECEIVER_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3001".to_string());
    let inspector_api_token = std::env::var("RECEIVER_INSPECTOR_API_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty());

    let options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    if inspector_api_token.is_none() {
        tracing::warn!("RECEIVER_INSPECTOR_API_TOKEN not set, inspector routes are unauthenticated");
    }

    let state = AppState::new(
        pool.clone(),
        SqliteStore::new(pool),
        webhook,
        inspector_api_token,
    );
    let app = build_router(state);

    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "payment receiver listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
