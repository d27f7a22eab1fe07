mod api;
mod bootstrap;
mod config;
mod error;
mod ledger;
mod middleware;
mod payouts;
mod provider;
mod server;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,payout_engine=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting payout engine");

    let config = config::Config::from_env().context("failed to load configuration")?;

    let state = bootstrap::initialize_app_state(&config)
        .await
        .context("failed to initialize application state")?;

    let app = server::create_app(state, &config).await;

    server::run_server(app, &config.bind_address).await?;

    Ok(())
}
