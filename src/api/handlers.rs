use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use std::{future::Future, sync::Arc};
use tracing::info;

use super::models::*;
use crate::{
    error::{AppError, AppResult, PayoutError},
    ledger::{models::PayoutStatus, PayoutLedger},
    middleware::ValidatedJson,
    payouts::{
        models::{BalanceView, BulkPayoutReport, SinglePayoutReceipt},
        PayoutEngine, PendingPayouts,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PayoutEngine>,
    pub ledger: Arc<dyn PayoutLedger>,
    /// Shared secret the provider signs webhooks with
    pub webhook_secret: Arc<String>,
    pub stale_claim_minutes: i64,
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
    })
}

/// GET /api/admin/payouts - released earnings, for one teacher or grouped by teacher
pub async fn list_pending_payouts(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> AppResult<Json<PendingPayoutsResponse>> {
    let response = match state.engine.pending_payouts(query.teacher_id).await? {
        PendingPayouts::ForPayee(earnings) => PendingPayoutsResponse::ForTeacher { earnings },
        PendingPayouts::ByPayee(teachers) => PendingPayoutsResponse::AllTeachers { teachers },
    };
    Ok(Json(response))
}

/// POST /api/admin/payouts - pay one teacher for specific earnings
pub async fn create_payout(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreatePayoutRequest>,
) -> AppResult<Json<SinglePayoutReceipt>> {
    let request = request.into_request()?;
    info!(
        "💰 Single payout requested: {} earnings for teacher {}",
        request.earning_ids.len(),
        request.payee_id
    );

    let engine = state.engine.clone();
    let receipt = detach(async move { engine.pay_single(request).await }).await?;
    Ok(Json(receipt))
}

/// POST /api/admin/payouts/bulk - pay every teacher with released earnings
pub async fn create_bulk_payout(State(state): State<AppState>) -> AppResult<Json<BulkPayoutReport>> {
    info!("💰 Bulk payout requested");
    let engine = state.engine.clone();
    let report = detach(async move { engine.run_bulk().await }).await?;
    Ok(Json(report))
}

/// Run a payout on its own task so a dropped connection cannot cancel it
/// between dispatch and settlement.
async fn detach<T, F>(fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| AppError::Internal(format!("payout task failed: {}", e)))?
}

/// GET /api/admin/payouts/history
pub async fn payout_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<PayoutHistoryResponse>> {
    let status = PayoutStatus::parse_filter(query.status.as_deref()).map_err(PayoutError::Validation)?;
    let (page, limit) = query.page_and_limit();

    let (payouts, summary) = state.engine.history(status, page, limit).await?;

    Ok(Json(PayoutHistoryResponse {
        pagination: Pagination::new(page, limit, payouts.total),
        payouts: payouts.payouts,
        summary,
    }))
}

/// GET /api/admin/payouts/balance
pub async fn provider_balance(State(state): State<AppState>) -> AppResult<Json<BalanceView>> {
    Ok(Json(state.engine.balance().await?))
}

/// GET /api/admin/payouts/stale-claims - earnings stuck in processing
pub async fn stale_claims(State(state): State<AppState>) -> AppResult<Json<StaleClaimsResponse>> {
    let claims = state.engine.stale_claims().await?;
    Ok(Json(StaleClaimsResponse {
        threshold_minutes: state.stale_claim_minutes,
        claims,
    }))
}
