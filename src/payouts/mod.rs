pub mod dispatcher;
pub mod guard;
pub mod models;
pub mod reader;
pub mod resolver;
pub mod settlement;

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, PayoutError};
use crate::ledger::{
    models::{Earning, Payee, PayoutPage, PayoutStatus, PayoutSummary, StaleClaim},
    ClaimScope, PayoutLedger,
};
use crate::provider::{PaymentProvider, TransferReceipt};

use dispatcher::Dispatcher;
use guard::BalanceGuard;
use models::*;
use reader::group_by_payee;
use resolver::{InstitutionCodes, PayeeResolver, ResolveFailure};
use settlement::SettlementWriter;

/// Payout engine configuration
#[derive(Debug, Clone)]
pub struct PayoutConfig {
    /// Operating currency; balances and transfers use only this one
    pub currency: String,
    /// Everything before dispatch must finish within this window
    pub batch_deadline: Duration,
    /// Claims older than this show up in the stale-claims report
    pub stale_claim_age: chrono::Duration,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            currency: "GHS".to_string(),
            batch_deadline: Duration::from_secs(120),
            stale_claim_age: chrono::Duration::minutes(30),
        }
    }
}

/// Pending earnings, either for one payee or grouped for all
#[derive(Debug, Clone)]
pub enum PendingPayouts {
    ForPayee(Vec<Earning>),
    ByPayee(Vec<PendingPayee>),
}

struct Resolved {
    payees: Vec<ResolvedPayee>,
    skipped: Vec<SkippedPayee>,
    warnings: Vec<String>,
}

/// Payout engine - claims, resolves, guards, dispatches and settles
///
/// Flow: claim → resolve → balance guard → dispatch → settle.
/// Any failure before the provider accepts a dispatch gives the claimed
/// earnings back; failures after that keep them claimed for reconciliation.
pub struct PayoutEngine {
    ledger: Arc<dyn PayoutLedger>,
    provider: Arc<dyn PaymentProvider>,
    codes: InstitutionCodes,
    config: PayoutConfig,
    bulk_lock: Mutex<()>,
}

impl PayoutEngine {
    pub fn new(
        ledger: Arc<dyn PayoutLedger>,
        provider: Arc<dyn PaymentProvider>,
        codes: InstitutionCodes,
        config: PayoutConfig,
    ) -> Self {
        Self {
            ledger,
            provider,
            codes,
            config,
            bulk_lock: Mutex::new(()),
        }
    }

    // ========== BULK ==========

    /// Pay every payee with released earnings in one batched transfer
    pub async fn run_bulk(&self) -> AppResult<BulkPayoutReport> {
        let _running = self.bulk_lock.try_lock().map_err(|_| {
            warn!("Bulk payout requested while another run is active");
            PayoutError::BatchInProgress
        })?;

        let run_id = Uuid::new_v4();
        let result = self.bulk_run(run_id).await;
        if let Err(e) = &result {
            self.after_failure(run_id, e).await;
        }
        result
    }

    #[instrument(skip_all, fields(run_id = %run_id))]
    async fn bulk_run(&self, run_id: Uuid) -> AppResult<BulkPayoutReport> {
        let deadline = Instant::now() + self.config.batch_deadline;
        info!("🚀 Starting bulk payout run {}", run_id);

        let claimed = self
            .before_deadline(
                deadline,
                "claim",
                self.ledger.claim_released(run_id, ClaimScope::AllReleased),
            )
            .await?;

        if claimed.is_empty() {
            info!("No released earnings to pay");
            return Ok(BulkPayoutReport::nothing_to_pay());
        }

        let Resolved {
            payees: resolved,
            mut skipped,
            warnings,
        } = self.resolve_groups(run_id, claimed, deadline).await?;

        if resolved.is_empty() {
            warn!("❌ Every payee was skipped ({})", skipped.len());
            return Err(PayoutError::NoValidTransfers { skipped }.into());
        }

        let required: Decimal = resolved.iter().map(|r| r.group.total).sum();
        let guard = BalanceGuard::new(self.provider.as_ref(), &self.config.currency);
        self.before_deadline(deadline, "balance", async {
            guard.check(required, &skipped).await.map_err(AppError::from)
        })
        .await?;

        check_deadline(deadline, "dispatch")?;

        let instructions = dispatcher::bulk_instructions(&resolved, dispatcher::reference_stamp())?;
        let receipts = Dispatcher::new(self.provider.as_ref(), &self.config.currency)
            .bulk(run_id, &instructions)
            .await?;

        // Past this point money has moved; nothing below gives claims back wholesale
        let receipts: HashMap<String, TransferReceipt> = receipts
            .into_iter()
            .map(|r| (r.reference.clone(), r))
            .collect();

        let writer = SettlementWriter::new(self.ledger.as_ref(), &self.config.currency);
        let mut settled = Vec::new();
        let mut unsettled = Vec::new();

        for (payee, instruction) in resolved.iter().zip(&instructions) {
            let receipt = receipts.get(&instruction.reference);

            if receipt.map_or(false, TransferReceipt::is_failed) {
                warn!(
                    "Provider rejected transfer {} for payee {}",
                    instruction.reference, payee.payee.id
                );
                self.release_earnings(run_id, &payee.group.earning_ids()).await;
                skipped.push(SkippedPayee {
                    payee_id: payee.payee.id,
                    payee_name: payee.payee.full_name.clone(),
                    reason: "Transfer rejected by provider".to_string(),
                });
                continue;
            }

            let transfer_code = receipt.and_then(|r| r.transfer_code.clone());
            match writer
                .settle(run_id, payee, &instruction.reference, transfer_code)
                .await
            {
                Ok(record) => settled.push(record),
                Err(u) => unsettled.push(u),
            }
        }

        if !unsettled.is_empty() {
            return Err(PayoutError::PartialSettlementInconsistency {
                run_id,
                settled: settled.len(),
                unsettled,
            }
            .into());
        }

        if settled.is_empty() {
            return Err(PayoutError::ProviderDispatchFailed(
                "Provider rejected every transfer in the batch".to_string(),
            )
            .into());
        }

        let total_amount: Decimal = settled.iter().map(|p| p.amount).sum();
        info!(
            "✅ Run {} complete: {} transfers, {} {}",
            run_id,
            settled.len(),
            self.config.currency,
            total_amount
        );

        Ok(BulkPayoutReport {
            success: true,
            message: format!("Successfully initiated {} transfers", settled.len()),
            run_id: Some(run_id),
            total_amount,
            transfers_count: settled.len(),
            references: settled.into_iter().map(|p| p.reference).collect(),
            skipped,
            warnings,
        })
    }

    /// Resolve every claimed group. Skipped payees get their claims back here.
    ///
    /// The deadline is checked between payees so a recipient handle is never
    /// created without the chance to save it.
    async fn resolve_groups(
        &self,
        run_id: Uuid,
        claimed: Vec<Earning>,
        deadline: Instant,
    ) -> AppResult<Resolved> {
        let groups = group_by_payee(claimed);
        let payee_ids: Vec<Uuid> = groups.iter().map(|g| g.payee_id).collect();
        let payees: HashMap<Uuid, Payee> = self
            .before_deadline(deadline, "resolve", self.ledger.get_payees(&payee_ids))
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let resolver = PayeeResolver::new(
            self.ledger.as_ref(),
            self.provider.as_ref(),
            &self.codes,
            &self.config.currency,
        );

        let mut resolved = Resolved {
            payees: Vec::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
        };
        let mut returned: Vec<Uuid> = Vec::new();

        for group in groups {
            check_deadline(deadline, "resolve")?;

            let Some(payee) = payees.get(&group.payee_id) else {
                warn!("Earnings reference unknown payee {}", group.payee_id);
                returned.extend(group.earning_ids());
                resolved.skipped.push(SkippedPayee {
                    payee_id: group.payee_id,
                    payee_name: "Unknown".to_string(),
                    reason: "Teacher not found".to_string(),
                });
                continue;
            };

            match resolver.resolve(payee).await {
                Ok(resolution) => {
                    resolved.warnings.extend(resolution.warning);
                    resolved.payees.push(ResolvedPayee {
                        payee: payee.clone(),
                        details: resolution.details,
                        recipient_code: resolution.recipient_code,
                        group,
                    });
                }
                Err(failure) => {
                    info!("⏭️  Skipping {}: {}", payee.full_name, failure.reason());
                    returned.extend(group.earning_ids());
                    resolved.skipped.push(SkippedPayee {
                        payee_id: payee.id,
                        payee_name: payee.full_name.clone(),
                        reason: failure.reason(),
                    });
                }
            }
        }

        if !returned.is_empty() {
            self.ledger.release_claims(run_id, Some(&returned)).await?;
        }

        Ok(resolved)
    }

    // ========== SINGLE ==========

    /// Pay one payee for exactly the given earnings
    pub async fn pay_single(&self, request: SinglePayoutRequest) -> AppResult<SinglePayoutReceipt> {
        if request.earning_ids.is_empty() {
            return Err(PayoutError::Validation(
                "Missing required fields: teacher_id, amount, earnings_ids".to_string(),
            )
            .into());
        }
        if request.amount <= Decimal::ZERO {
            return Err(PayoutError::Validation("Amount must be greater than zero".to_string()).into());
        }

        let payee = self
            .ledger
            .get_payee(request.payee_id)
            .await?
            .ok_or(PayoutError::PayeeNotFound(request.payee_id))?;

        payee
            .disbursement_details()
            .map_err(|reason| PayoutError::PayeeDetailIncomplete {
                payee: payee.full_name.clone(),
                reason: reason.to_string(),
            })?;

        let run_id = Uuid::new_v4();
        let result = self.single_run(run_id, &payee, request).await;
        if let Err(e) = &result {
            self.after_failure(run_id, e).await;
        }
        result
    }

    #[instrument(skip_all, fields(run_id = %run_id, payee_id = %payee.id))]
    async fn single_run(
        &self,
        run_id: Uuid,
        payee: &Payee,
        request: SinglePayoutRequest,
    ) -> AppResult<SinglePayoutReceipt> {
        let deadline = Instant::now() + self.config.batch_deadline;

        let mut earning_ids = request.earning_ids;
        earning_ids.sort();
        earning_ids.dedup();

        let claimed = self
            .before_deadline(
                deadline,
                "claim",
                self.ledger.claim_released(
                    run_id,
                    ClaimScope::Earnings {
                        payee_id: payee.id,
                        earning_ids: &earning_ids,
                    },
                ),
            )
            .await?;

        if claimed.len() != earning_ids.len() {
            return Err(PayoutError::EarningsUnavailable {
                requested: earning_ids.len(),
                claimable: claimed.len(),
            }
            .into());
        }

        let group = PayeeGroup {
            payee_id: payee.id,
            total: claimed.iter().map(|e| e.amount).sum(),
            earnings: claimed,
        };
        if group.total != request.amount {
            return Err(PayoutError::AmountMismatch {
                requested: request.amount,
                outstanding: group.total,
            }
            .into());
        }

        let resolver = PayeeResolver::new(
            self.ledger.as_ref(),
            self.provider.as_ref(),
            &self.codes,
            &self.config.currency,
        );
        check_deadline(deadline, "resolve")?;
        let resolution = resolver
            .resolve(payee)
            .await
            .map_err(|failure| match failure {
                ResolveFailure::Incomplete(reason) => PayoutError::PayeeDetailIncomplete {
                    payee: payee.full_name.clone(),
                    reason: reason.to_string(),
                },
                ResolveFailure::RecipientRejected(reason) => PayoutError::RecipientCreationFailed {
                    payee: payee.full_name.clone(),
                    reason,
                },
            })?;

        let guard = BalanceGuard::new(self.provider.as_ref(), &self.config.currency);
        self.before_deadline(deadline, "balance", async {
            guard.check(group.total, &[]).await.map_err(AppError::from)
        })
        .await?;

        check_deadline(deadline, "dispatch")?;

        let resolved = ResolvedPayee {
            payee: payee.clone(),
            details: resolution.details,
            recipient_code: resolution.recipient_code,
            group,
        };
        let instruction = dispatcher::single_instruction(&resolved, dispatcher::reference_stamp())?;
        let receipt = Dispatcher::new(self.provider.as_ref(), &self.config.currency)
            .single(run_id, &instruction)
            .await?;

        let writer = SettlementWriter::new(self.ledger.as_ref(), &self.config.currency);
        if let Err(unsettled) = writer
            .settle(run_id, &resolved, &instruction.reference, receipt.transfer_code.clone())
            .await
        {
            return Err(PayoutError::PartialSettlementInconsistency {
                run_id,
                settled: 0,
                unsettled: vec![unsettled],
            }
            .into());
        }

        Ok(SinglePayoutReceipt {
            success: true,
            message: "Transfer initiated successfully".to_string(),
            run_id,
            transfer_code: receipt.transfer_code,
            reference: instruction.reference,
            status: receipt.status,
            warnings: resolution.warning.into_iter().collect(),
        })
    }

    // ========== READ-ONLY ==========

    pub async fn balance(&self) -> AppResult<BalanceView> {
        let available = BalanceGuard::new(self.provider.as_ref(), &self.config.currency)
            .available()
            .await?;

        Ok(BalanceView {
            balance: available,
            currency: self.config.currency.clone(),
            available,
        })
    }

    pub async fn pending_payouts(&self, payee_id: Option<Uuid>) -> AppResult<PendingPayouts> {
        let earnings = self.ledger.released_earnings(payee_id).await?;
        if payee_id.is_some() {
            return Ok(PendingPayouts::ForPayee(earnings));
        }

        let groups = group_by_payee(earnings);
        let ids: Vec<Uuid> = groups.iter().map(|g| g.payee_id).collect();
        let payees: HashMap<Uuid, Payee> = self
            .ledger
            .get_payees(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let pending = groups
            .into_iter()
            .filter_map(|group| {
                payees
                    .get(&group.payee_id)
                    .map(|payee| PendingPayee::new(payee, group))
            })
            .collect();

        Ok(PendingPayouts::ByPayee(pending))
    }

    pub async fn history(
        &self,
        status: Option<PayoutStatus>,
        page: i64,
        limit: i64,
    ) -> AppResult<(PayoutPage, PayoutSummary)> {
        let offset = page.saturating_sub(1).max(0).saturating_mul(limit);
        let payouts = self.ledger.payout_history(status, limit, offset).await?;
        let summary = self.ledger.payout_summary().await?;
        Ok((payouts, summary))
    }

    pub async fn stale_claims(&self) -> AppResult<Vec<StaleClaim>> {
        let cutoff = Utc::now() - self.config.stale_claim_age;
        let claims = self.ledger.stale_claims(cutoff).await?;
        if !claims.is_empty() {
            warn!("⚠️  {} stale payout claims need reconciliation", claims.len());
        }
        Ok(claims)
    }

    // ========== HELPERS ==========

    async fn before_deadline<T, F>(&self, deadline: Instant, stage: &'static str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("⏱️  Payout deadline hit during {}", stage);
                Err(PayoutError::DeadlineExceeded { stage }.into())
            }
        }
    }

    /// Give claims back when nothing can have moved; otherwise leave them for reconciliation
    async fn after_failure(&self, run_id: Uuid, err: &AppError) {
        if !err.retry_safe() {
            error!(
                "🚨 Run {} needs manual reconciliation, claims kept: {}",
                run_id, err
            );
            return;
        }

        match self.ledger.release_claims(run_id, None).await {
            Ok(0) => {}
            Ok(n) => info!("↩️  Released {} claimed earnings for run {}", n, run_id),
            Err(e) => error!(
                "Failed to release claims for run {}: {}. They will appear as stale claims",
                run_id, e
            ),
        }
    }

    async fn release_earnings(&self, run_id: Uuid, earning_ids: &[Uuid]) {
        if let Err(e) = self.ledger.release_claims(run_id, Some(earning_ids)).await {
            error!(
                "Failed to release {} earnings for run {}: {}",
                earning_ids.len(),
                run_id,
                e
            );
        }
    }
}

fn check_deadline(deadline: Instant, stage: &'static str) -> AppResult<()> {
    if Instant::now() >= deadline {
        warn!("⏱️  Payout deadline passed before {}", stage);
        return Err(PayoutError::DeadlineExceeded { stage }.into());
    }
    Ok(())
}
