use rust_decimal::Decimal;
use tracing::{error, info};
use uuid::Uuid;

use super::models::{ResolvedPayee, UnsettledPayout};
use crate::ledger::{
    models::{NewNotification, NewPayout, Payout},
    PayoutLedger,
};

pub fn payout_notification(
    payee_id: Uuid,
    currency: &str,
    amount: Decimal,
    institution: &str,
) -> NewNotification {
    NewNotification {
        user_id: payee_id,
        kind: "payout".to_string(),
        title: "Payment Sent! 💸".to_string(),
        message: format!(
            "{} {:.2} has been sent to your {} account.",
            currency, amount, institution
        ),
        action_url: Some("/teacher/earnings".to_string()),
    }
}

/// Records accepted transfers in the ledger
pub struct SettlementWriter<'a> {
    ledger: &'a dyn PayoutLedger,
    currency: &'a str,
}

impl<'a> SettlementWriter<'a> {
    pub fn new(ledger: &'a dyn PayoutLedger, currency: &'a str) -> Self {
        Self { ledger, currency }
    }

    /// Write the payout, mark its earnings paid and queue the notification.
    ///
    /// A failure here means money already moved; it is returned as an
    /// `UnsettledPayout` for manual reconciliation, never retried.
    pub async fn settle(
        &self,
        run_id: Uuid,
        resolved: &ResolvedPayee,
        reference: &str,
        transfer_code: Option<String>,
    ) -> Result<Payout, UnsettledPayout> {
        let earnings_ids = resolved.group.earning_ids();
        let payout = NewPayout {
            payee_id: resolved.payee.id,
            run_id,
            amount: resolved.group.total,
            reference: reference.to_string(),
            transfer_code,
            earnings_ids: earnings_ids.clone(),
            payout_method: resolved.details.method(),
            payout_details: resolved.details.snapshot(),
        };
        let notification = payout_notification(
            resolved.payee.id,
            self.currency,
            resolved.group.total,
            resolved.details.institution(),
        );

        match self.ledger.settle(payout, notification).await {
            Ok(record) => {
                info!(
                    "✅ Settled {} {} for payee {} ({})",
                    self.currency, record.amount, record.payee_id, record.reference
                );
                Ok(record)
            }
            Err(e) => {
                error!(
                    run_id = %run_id,
                    payee_id = %resolved.payee.id,
                    reference = reference,
                    earnings = ?earnings_ids,
                    "🚨 Transfer accepted but settlement failed: {}",
                    e
                );
                Err(UnsettledPayout {
                    payee_id: resolved.payee.id,
                    reference: reference.to_string(),
                    amount: resolved.group.total,
                    earnings_ids,
                    error: e.to_string(),
                })
            }
        }
    }
}
