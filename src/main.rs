use social_network_back::app::{Stores, build_router};
use social_network_back::core::auth::TokenService;
use social_network_back::core::config::Config;
use social_network_back::core::db::{DbConfig, create_pool_with_migrations};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "social_network_back=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let token_service = TokenService::from_env()?;

    tracing::info!("Config loaded: {:?}", config);

    let stores = if config.has_database() {
        let pool = create_pool_with_migrations(&DbConfig::from_env()?).await?;
        tracing::info!("Connected to PostgreSQL, migrations applied");
        Stores::postgres(pool)
    } else {
        tracing::warn!("DATABASE_URL not set, keeping all state in memory");
        Stores::in_memory()
    };

    let app = build_router(&config, stores, token_service);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
