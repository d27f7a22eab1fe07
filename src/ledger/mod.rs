pub mod models;
pub mod repository;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use models::*;

pub use repository::LedgerRepository;

/// Which earnings a payout run wants to claim
#[derive(Debug, Clone, Copy)]
pub enum ClaimScope<'a> {
    /// Every `released` earning in the system
    AllReleased,
    /// Exactly these earnings, and only if they belong to this payee
    Earnings {
        payee_id: Uuid,
        earning_ids: &'a [Uuid],
    },
}

/// Ledger access used by the payout engine and the webhook.
///
/// INVARIANTS:
/// - `claim_released` is a compare-and-set: a row is returned to at most one
///   run, and only while it is `released`
/// - `settle` writes the payout, flips the claimed earnings to `paid` and
///   queues the notification as one unit, or writes nothing
/// - Nothing here deletes rows or moves an earning backwards past `released`
#[async_trait]
pub trait PayoutLedger: Send + Sync {
    /// Released earnings, oldest first. Read-only.
    async fn released_earnings(&self, payee_id: Option<Uuid>) -> AppResult<Vec<Earning>>;

    /// Move released earnings to `processing` under `run_id` and return them
    async fn claim_released(&self, run_id: Uuid, scope: ClaimScope<'_>) -> AppResult<Vec<Earning>>;

    /// Give claimed earnings back (`processing` → `released`). `None` releases the whole run.
    async fn release_claims(&self, run_id: Uuid, earning_ids: Option<&[Uuid]>) -> AppResult<u64>;

    async fn get_payee(&self, payee_id: Uuid) -> AppResult<Option<Payee>>;

    async fn get_payees(&self, payee_ids: &[Uuid]) -> AppResult<Vec<Payee>>;

    /// Persist a recipient handle unless one is already stored.
    /// Returns the handle that is stored afterwards.
    async fn store_recipient_code(&self, payee_id: Uuid, code: &str) -> AppResult<String>;

    async fn settle(&self, payout: NewPayout, notification: NewNotification) -> AppResult<Payout>;

    async fn payout_history(
        &self,
        status: Option<PayoutStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<PayoutPage>;

    async fn payout_summary(&self) -> AppResult<PayoutSummary>;

    async fn stale_claims(&self, claimed_before: DateTime<Utc>) -> AppResult<Vec<StaleClaim>>;

    /// Returns false when no payout carries the reference
    async fn apply_transfer_update(&self, update: &TransferStatusUpdate) -> AppResult<bool>;

    async fn apply_charge_event(&self, event: &ChargeEvent) -> AppResult<()>;
}
