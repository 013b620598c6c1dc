use anyhow::Context;
use parkir_api::{app, AppState};
use parkir_store::app_config::{Config, StorageBackend};
use parkir_store::{DbClient, MemoryStore, PgStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Used markers outlive the QR validity window by this much.
const USED_TOKEN_TTL_MARGIN_SECONDS: u64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parkir_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Parkir API on port {}", config.server.port);

    // Redis Connection
    let redis = match &config.redis.url {
        Some(url) => {
            let client = RedisClient::new(url, config.qr.validity_seconds + USED_TOKEN_TTL_MARGIN_SECONDS)
                .context("Failed to create Redis client")?;
            if let Err(err) = client.ping().await {
                tracing::warn!("Redis not reachable yet, rate limiting fails open: {}", err);
            }
            Some(client)
        }
        None => {
            tracing::info!("No Redis configured; rate limiting disabled, QR replay guard kept in the store");
            None
        }
    };

    let app_state = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            AppState::build(Arc::new(MemoryStore::new()), redis, &config)
        }
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            AppState::build(Arc::new(PgStore::new(db.pool.clone())), redis, &config)
        }
    }
    .context("Failed to build services")?;

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
