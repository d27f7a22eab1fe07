use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::models::ResolvedPayee;
use crate::error::{PayoutError, ProviderError};
use crate::provider::{PaymentProvider, TransferInstruction, TransferReceipt};

pub const SINGLE_PREFIX: &str = "PAYOUT";
pub const BULK_PREFIX: &str = "BULK";

/// Major units → minor units, rounding half away from zero
pub fn to_minor_units(amount: Decimal) -> Result<i64, PayoutError> {
    (amount * dec!(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| PayoutError::Validation(format!("Amount {} is out of range", amount)))
}

/// `PREFIX-<first 8 of payee id>-<stamp>`
pub fn transfer_reference(prefix: &str, payee_id: Uuid, stamp: i64) -> String {
    let id = payee_id.to_string();
    format!("{}-{}-{}", prefix, &id[..8], stamp)
}

/// Nanosecond timestamp used to make references unique
pub fn reference_stamp() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}

fn session_reason(kind: &str, count: usize) -> String {
    format!("{} payout for {} session(s)", kind, count)
}

pub fn single_instruction(
    resolved: &ResolvedPayee,
    stamp: i64,
) -> Result<TransferInstruction, PayoutError> {
    Ok(TransferInstruction {
        amount: to_minor_units(resolved.group.total)?,
        recipient: resolved.recipient_code.clone(),
        reason: session_reason("Teacher", resolved.group.earnings.len()),
        reference: transfer_reference(SINGLE_PREFIX, resolved.payee.id, stamp),
    })
}

/// One instruction per payee; the stamp is offset per payee so references never collide
pub fn bulk_instructions(
    resolved: &[ResolvedPayee],
    stamp: i64,
) -> Result<Vec<TransferInstruction>, PayoutError> {
    resolved
        .iter()
        .enumerate()
        .map(|(i, payee)| {
            Ok(TransferInstruction {
                amount: to_minor_units(payee.group.total)?,
                recipient: payee.recipient_code.clone(),
                reason: session_reason("Bulk", payee.group.earnings.len()),
                reference: transfer_reference(BULK_PREFIX, payee.payee.id, stamp + i as i64),
            })
        })
        .collect()
}

/// Provider failure at dispatch, split by whether the claims may be released
pub fn dispatch_error(run_id: Uuid, err: ProviderError, references: Vec<String>) -> PayoutError {
    if err.may_have_executed() {
        error!(
            "🚨 Dispatch outcome unknown for run {} ({}); claims kept for {:?}",
            run_id, err, references
        );
        PayoutError::DispatchOutcomeUnknown {
            run_id,
            reason: err.to_string(),
            references,
        }
    } else {
        warn!("Dispatch failed for run {}: {}", run_id, err);
        PayoutError::ProviderDispatchFailed(err.to_string())
    }
}

/// Submits transfer instructions to the provider
pub struct Dispatcher<'a> {
    provider: &'a dyn PaymentProvider,
    currency: &'a str,
}

impl<'a> Dispatcher<'a> {
    pub fn new(provider: &'a dyn PaymentProvider, currency: &'a str) -> Self {
        Self { provider, currency }
    }

    pub async fn bulk(
        &self,
        run_id: Uuid,
        instructions: &[TransferInstruction],
    ) -> Result<Vec<TransferReceipt>, PayoutError> {
        info!(
            "💸 Dispatching {} transfers for run {}",
            instructions.len(),
            run_id
        );

        self.provider
            .bulk_transfer(self.currency, instructions)
            .await
            .map_err(|e| {
                let references = instructions.iter().map(|i| i.reference.clone()).collect();
                dispatch_error(run_id, e, references)
            })
    }

    pub async fn single(
        &self,
        run_id: Uuid,
        instruction: &TransferInstruction,
    ) -> Result<TransferReceipt, PayoutError> {
        info!("💸 Dispatching transfer {} for run {}", instruction.reference, run_id);

        let receipt = self
            .provider
            .transfer(self.currency, instruction)
            .await
            .map_err(|e| dispatch_error(run_id, e, vec![instruction.reference.clone()]))?;

        if receipt.is_failed() {
            return Err(PayoutError::ProviderDispatchFailed(format!(
                "transfer {} was reported failed",
                instruction.reference
            )));
        }
        Ok(receipt)
    }
}
