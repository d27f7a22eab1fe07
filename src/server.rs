use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    api::{
        handlers::{
            create_bulk_payout, create_payout, health_check, list_pending_payouts, payout_history,
            provider_balance, stale_claims, AppState,
        },
        webhook::payment_webhook,
    },
    config::Config,
    middleware::{create_cors_layer, rate_limit_middleware, RateLimitLayer},
};

pub async fn create_app(state: AppState, config: &Config) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let admin_limit = RateLimitLayer::per_minute(config.admin_rate_limit_per_minute);

    // Admin payout routes, rate limited as a group
    let admin = Router::new()
        .route("/", get(list_pending_payouts).post(create_payout))
        .route("/bulk", post(create_bulk_payout))
        .route("/history", get(payout_history))
        .route("/balance", get(provider_balance))
        .route("/stale-claims", get(stale_claims))
        .layer(from_fn_with_state(admin_limit, rate_limit_middleware));

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        .nest("/api/admin/payouts", admin)
        // Provider webhook, authenticated by its HMAC signature
        .route("/api/payments/webhook", post(payment_webhook))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(create_cors_layer(&config.origins())),
        )
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
