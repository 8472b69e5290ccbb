//! chatdesk-api binary

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use chatdesk_api::{routes::create_router, AppState, Config};
use chatdesk_core::{
    sweeper::spawn_sweeper, ConversationService, CoreConfig, PgDirectory, PgStore,
};
use chatdesk_shared::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let directory = Arc::new(PgDirectory::new(pool));

    let core_config = CoreConfig {
        typing_ttl: config.typing_ttl,
        presence_window: config.presence_window,
        sweep_interval: config.sweep_interval,
        ..CoreConfig::default()
    };
    let service = Arc::new(ConversationService::new(store, directory, core_config));

    // Background eviction for stale typing/presence entries
    spawn_sweeper(service.presence(), service.typing(), config.sweep_interval);

    let bind_address = config.bind_address.clone();
    let state = AppState::new(service, config);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "chatdesk-api listening");
    axum::serve(listener, router).await?;

    Ok(())
}
