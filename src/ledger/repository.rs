use super::{models::*, ClaimScope, PayoutLedger};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

const EARNING_COLUMNS: &str =
    "id, payee_id, booking_id, amount, status, payout_run_id, payout_reference, created_at, paid_at";

const PAYEE_COLUMNS: &str = r#"
    id, full_name, avatar_url, payout_method,
    bank_name, bank_account_number, bank_account_name,
    momo_provider, momo_number, momo_name, recipient_code
"#;

const PAYOUT_COLUMNS: &str = r#"
    id, payee_id, run_id, amount, reference, transfer_code, status,
    earnings_ids, payout_method, payout_details, created_at
"#;

/// Ledger repository - THE source of truth for earnings and payouts
pub struct LedgerRepository {
    pub pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin_tx(&self) -> AppResult<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    async fn insert_payout(
        tx: &mut Transaction<'_, Postgres>,
        payout: &NewPayout,
    ) -> AppResult<Payout> {
        let query = format!(
            r#"
            INSERT INTO payouts (
                payee_id, run_id, amount, reference, transfer_code, status,
                earnings_ids, payout_method, payout_details
            )
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8)
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        );

        let row = sqlx::query_as::<_, Payout>(&query)
            .bind(payout.payee_id)
            .bind(payout.run_id)
            .bind(payout.amount)
            .bind(&payout.reference)
            .bind(&payout.transfer_code)
            .bind(&payout.earnings_ids)
            .bind(payout.payout_method)
            .bind(&payout.payout_details)
            .fetch_one(&mut **tx)
            .await?;

        Ok(row)
    }

    async fn insert_notification(
        tx: &mut Transaction<'_, Postgres>,
        notification: &NewNotification,
    ) -> AppResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO notifications (user_id, kind, title, message, action_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.action_url)
        .fetch_one(&mut **tx)
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl PayoutLedger for LedgerRepository {
    // ========== EARNINGS OPERATIONS ==========

    async fn released_earnings(&self, payee_id: Option<Uuid>) -> AppResult<Vec<Earning>> {
        let query = format!(
            r#"
            SELECT {}
            FROM earnings
            WHERE status = 'released' AND ($1::uuid IS NULL OR payee_id = $1)
            ORDER BY created_at ASC
            "#,
            EARNING_COLUMNS
        );

        let earnings = sqlx::query_as::<_, Earning>(&query)
            .bind(payee_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(earnings)
    }

    async fn claim_released(&self, run_id: Uuid, scope: ClaimScope<'_>) -> AppResult<Vec<Earning>> {
        // The status predicate on the UPDATE itself is what makes this a
        // compare-and-set; SKIP LOCKED only avoids waiting on a rival run.
        let mut earnings = match scope {
            ClaimScope::AllReleased => {
                let query = format!(
                    r#"
                    UPDATE earnings
                    SET status = 'processing', payout_run_id = $1, claimed_at = NOW()
                    WHERE id IN (
                        SELECT id FROM earnings
                        WHERE status = 'released'
                        FOR UPDATE SKIP LOCKED
                    )
                    AND status = 'released'
                    RETURNING {}
                    "#,
                    EARNING_COLUMNS
                );

                sqlx::query_as::<_, Earning>(&query)
                    .bind(run_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            ClaimScope::Earnings { payee_id, earning_ids } => {
                let query = format!(
                    r#"
                    UPDATE earnings
                    SET status = 'processing', payout_run_id = $1, claimed_at = NOW()
                    WHERE id = ANY($2) AND payee_id = $3 AND status = 'released'
                    RETURNING {}
                    "#,
                    EARNING_COLUMNS
                );

                sqlx::query_as::<_, Earning>(&query)
                    .bind(run_id)
                    .bind(earning_ids)
                    .bind(payee_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        earnings.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        info!("🔒 Run {} claimed {} earnings", run_id, earnings.len());
        Ok(earnings)
    }

    async fn release_claims(&self, run_id: Uuid, earning_ids: Option<&[Uuid]>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE earnings
            SET status = 'released', payout_run_id = NULL, claimed_at = NULL
            WHERE payout_run_id = $1
              AND status = 'processing'
              AND ($2::uuid[] IS NULL OR id = ANY($2))
            "#,
        )
        .bind(run_id)
        .bind(earning_ids.map(|ids| ids.to_vec()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ========== PAYEE OPERATIONS ==========

    async fn get_payee(&self, payee_id: Uuid) -> AppResult<Option<Payee>> {
        let query = format!("SELECT {} FROM payees WHERE id = $1", PAYEE_COLUMNS);

        let payee = sqlx::query_as::<_, Payee>(&query)
            .bind(payee_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payee)
    }

    async fn get_payees(&self, payee_ids: &[Uuid]) -> AppResult<Vec<Payee>> {
        let query = format!(
            "SELECT {} FROM payees WHERE id = ANY($1) ORDER BY id",
            PAYEE_COLUMNS
        );

        let payees = sqlx::query_as::<_, Payee>(&query)
            .bind(payee_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(payees)
    }

    async fn store_recipient_code(&self, payee_id: Uuid, code: &str) -> AppResult<String> {
        let stored: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE payees
            SET recipient_code = $2, updated_at = NOW()
            WHERE id = $1 AND recipient_code IS NULL
            RETURNING recipient_code
            "#,
        )
        .bind(payee_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(code) = stored {
            return Ok(code);
        }

        // Another run stored a handle first; keep using that one
        let existing: Option<String> =
            sqlx::query_scalar("SELECT recipient_code FROM payees WHERE id = $1")
                .bind(payee_id)
                .fetch_optional(&self.pool)
                .await?
                .flatten();

        match existing {
            Some(existing) => {
                warn!(
                    "Payee {} already had recipient {}, discarding {}",
                    payee_id, existing, code
                );
                Ok(existing)
            }
            None => Err(AppError::NotFound(format!("payee {}", payee_id))),
        }
    }

    // ========== SETTLEMENT OPERATIONS ==========

    async fn settle(&self, payout: NewPayout, notification: NewNotification) -> AppResult<Payout> {
        let mut tx = self.begin_tx().await?;

        let record = Self::insert_payout(&mut tx, &payout).await?;

        let result = sqlx::query(
            r#"
            UPDATE earnings
            SET status = 'paid', paid_at = NOW(), payout_reference = $3
            WHERE id = ANY($1) AND payout_run_id = $2 AND status = 'processing'
            "#,
        )
        .bind(&payout.earnings_ids)
        .bind(payout.run_id)
        .bind(&payout.reference)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != payout.earnings_ids.len() as u64 {
            tx.rollback().await?;
            return Err(AppError::Internal(format!(
                "Payout {} covers {} earnings but only {} were still claimed by run {}",
                payout.reference,
                payout.earnings_ids.len(),
                result.rows_affected(),
                payout.run_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO payout_earnings (earning_id, payout_id)
            SELECT UNNEST($1::uuid[]), $2
            "#,
        )
        .bind(&payout.earnings_ids)
        .bind(record.id)
        .execute(&mut *tx)
        .await?;

        Self::insert_notification(&mut tx, &notification).await?;

        tx.commit().await?;

        info!(
            "✓ Payout {} settled: {} earnings for payee {}",
            record.reference,
            record.earnings_ids.len(),
            record.payee_id
        );
        Ok(record)
    }

    // ========== HISTORY ==========

    async fn payout_history(
        &self,
        status: Option<PayoutStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<PayoutPage> {
        let payouts = sqlx::query_as::<_, PayoutWithPayee>(
            r#"
            SELECT
                p.id, p.payee_id, p.amount, p.reference, p.transfer_code, p.status,
                p.earnings_ids, p.payout_method, p.payout_details, p.created_at,
                t.full_name AS teacher_name, t.avatar_url AS teacher_avatar_url
            FROM payouts p
            LEFT JOIN payees t ON t.id = p.payee_id
            WHERE ($1::payout_status IS NULL OR p.status = $1)
            ORDER BY p.created_at DESC, p.id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payouts WHERE ($1::payout_status IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok(PayoutPage { payouts, total })
    }

    async fn payout_summary(&self) -> AppResult<PayoutSummary> {
        let summary = sqlx::query_as::<_, PayoutSummary>(
            r#"
            SELECT
                COUNT(*) AS total_payouts,
                COALESCE(SUM(amount), 0) AS total_amount,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'success') AS success,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM payouts
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(summary)
    }

    async fn stale_claims(&self, claimed_before: DateTime<Utc>) -> AppResult<Vec<StaleClaim>> {
        let claims = sqlx::query_as::<_, StaleClaim>(
            r#"
            SELECT
                payout_run_id AS run_id,
                payee_id,
                COUNT(*) AS earnings_count,
                SUM(amount) AS amount,
                MIN(claimed_at) AS claimed_at
            FROM earnings
            WHERE status = 'processing' AND claimed_at < $1
            GROUP BY payout_run_id, payee_id
            ORDER BY MIN(claimed_at) ASC
            "#,
        )
        .bind(claimed_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(claims)
    }

    // ========== WEBHOOK SUPPORT ==========

    async fn apply_transfer_update(&self, update: &TransferStatusUpdate) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payouts
            SET status = $2, transfer_code = COALESCE($3, transfer_code), updated_at = NOW()
            WHERE reference = $1
            "#,
        )
        .bind(&update.reference)
        .bind(update.status)
        .bind(&update.transfer_code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn apply_charge_event(&self, event: &ChargeEvent) -> AppResult<()> {
        match event {
            ChargeEvent::Succeeded {
                booking_id,
                reference,
                amount,
                currency,
                paid_at,
            } => {
                let mut tx = self.begin_tx().await?;

                let updated = sqlx::query(
                    r#"
                    UPDATE bookings
                    SET status = 'confirmed', payment_reference = $2, paid_at = $3
                    WHERE id = $1
                    "#,
                )
                .bind(booking_id)
                .bind(reference)
                .bind(paid_at)
                .execute(&mut *tx)
                .await?;

                if updated.rows_affected() == 0 {
                    warn!("Charge {} references unknown booking {}", reference, booking_id);
                    tx.rollback().await?;
                    return Ok(());
                }

                sqlx::query(
                    r#"
                    INSERT INTO payments (booking_id, amount, currency, status, provider_reference, paid_at)
                    VALUES ($1, $2, $3, 'success', $4, $5)
                    ON CONFLICT (provider_reference)
                    DO UPDATE SET status = 'success', paid_at = EXCLUDED.paid_at
                    "#,
                )
                .bind(booking_id)
                .bind(amount)
                .bind(currency)
                .bind(reference)
                .bind(paid_at)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                info!("Payment confirmed for booking {}", booking_id);
            }
            ChargeEvent::Failed { booking_id } => {
                sqlx::query(
                    r#"
                    UPDATE bookings
                    SET status = 'payment_failed'
                    WHERE id = $1 AND status <> 'confirmed'
                    "#,
                )
                .bind(booking_id)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }
}
