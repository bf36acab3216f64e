//! Stavitel API server entrypoint

use anyhow::Context;
use stavitel_api::{routes, AppState, Config};
use stavitel_billing::{StripeClient, StripeConfig};
use stavitel_shared::db;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; production reads the real environment
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let stripe_config = StripeConfig::from_env().context("Failed to load Stripe configuration")?;
    let stripe = StripeClient::new(stripe_config);

    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, stripe, pool);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
