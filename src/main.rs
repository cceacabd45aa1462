use lead_intent_api::config::Config;
use lead_intent_api::db::Database;
use lead_intent_api::db_storage::PgDatastore;
use lead_intent_api::handlers::{self, AppState};
use lead_intent_api::service::LeadIntentService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point: tracing, configuration, database pool, service wiring,
/// then the axum server with its middleware stack.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_intent_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    let db = Database::new(&config).await?;
    tracing::info!(
        "Database connection pool established (max {} connections)",
        config.db_max_connections
    );

    let store = Arc::new(PgDatastore::new(db.pool.clone()));
    let service = LeadIntentService::new(store, &config);

    let app_state = Arc::new(AppState { service });

    // 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    // Health check bypasses rate limiting
    let app = handlers::app_router(
        app_state,
        Duration::from_secs(config.request_timeout_secs),
        |api| {
            api.layer(GovernorLayer {
                config: governor_conf,
            })
        },
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
