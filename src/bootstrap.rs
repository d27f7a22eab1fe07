use std::{sync::Arc, time::Duration};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;
use crate::{
    api::AppState,
    config::Config,
    error::AppResult,
    ledger::{LedgerRepository, PayoutLedger},
    payouts::{resolver::InstitutionCodes, PayoutEngine},
    provider::PaystackClient,
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    // Database pool
    let pool = initialize_database(&config.database_url, config.max_db_connections).await?;

    // Core components
    let ledger: Arc<dyn PayoutLedger> = Arc::new(LedgerRepository::new(pool));

    let provider = Arc::new(PaystackClient::new(
        &config.paystack_base_url,
        &config.paystack_secret_key,
        config.provider_timeout(),
    )?);
    info!(
        "✅ Paystack client ready ({}, {}s per call)",
        config.paystack_base_url, config.provider_timeout_secs
    );

    let payout_config = config.payout_config();
    info!(
        "✅ Payout engine: currency {}, batch deadline {:?}",
        payout_config.currency, payout_config.batch_deadline
    );
    let engine = Arc::new(PayoutEngine::new(
        ledger.clone(),
        provider,
        InstitutionCodes::default(),
        payout_config,
    ));

    Ok(AppState {
        engine,
        ledger,
        webhook_secret: Arc::new(config.paystack_secret_key.clone()),
        stale_claim_minutes: config.stale_claim_minutes,
    })
}

async fn initialize_database(database_url: &str, max_connections: u32) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: {} max connections", max_connections);

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
