mod bangumi;
mod cache;
mod config;
mod db;
mod error;
mod handlers;
mod ics;
mod routes;
mod schema;
mod services;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bangumi::Client;
use crate::cache::{Cache, MemoryCache, PostgresCache};
use crate::config::AppConfig;
use crate::routes::{create_app, AppState};
use crate::services::CalendarService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "episode_calendar=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenv::dotenv().ok();
    let config = AppConfig::from_env()?;

    tracing::info!("Starting Bangumi episode calendar server");

    let cache = create_cache(&config).await?;
    let client = Client::new(&config.bangumi_base_url, config.upstream_timeout())
        .context("Failed to build upstream client")?;
    let calendar = CalendarService::new(Arc::new(client), cache, config.max_concurrency);

    let app = create_app(AppState { calendar }, &config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid listen address")?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn create_cache(config: &AppConfig) -> Result<Cache> {
    match &config.database_url {
        Some(database_url) => {
            let pool = db::establish_connection_pool(database_url)?;
            db::ensure_schema(&pool).await?;
            tracing::info!("Using Postgres cache store");

            let store = PostgresCache::new(pool);
            spawn_postgres_sweeper(store.clone(), config.cache_sweep_interval());
            Ok(Cache::new(Arc::new(store)))
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory cache store");
            let store = MemoryCache::new();
            store.spawn_sweeper(config.cache_sweep_interval());
            Ok(Cache::new(Arc::new(store)))
        }
    }
}

fn spawn_postgres_sweeper(store: PostgresCache, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired cache rows"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge expired cache rows"),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
