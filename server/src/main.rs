use chrono::Duration;
use hangar_server::{create_router, AppState, Config, Database, TokenService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!(?config, "configuration loaded");

    // A store that cannot be opened is fatal; nothing is served unverified.
    let db = Database::open(&config.db_path)?;
    db.ping()?;
    tracing::info!(path = %config.db_path, "database ready");

    let tokens = TokenService::new(&config.jwt_secret, Duration::hours(config.token_ttl_hours));
    let app = create_router(AppState::new(db, tokens));

    let addr = config.server_address();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
