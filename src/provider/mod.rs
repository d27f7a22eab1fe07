pub mod paystack;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::ledger::models::PayoutMethod;

pub use paystack::PaystackClient;

/// One currency bucket of the provider balance, in minor units
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderBalance {
    pub currency: String,
    pub balance: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    Nuban,
    MobileMoney,
}

impl From<PayoutMethod> for RecipientKind {
    fn from(method: PayoutMethod) -> Self {
        match method {
            PayoutMethod::Bank => RecipientKind::Nuban,
            PayoutMethod::MobileMoney => RecipientKind::MobileMoney,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipientRequest {
    #[serde(rename = "type")]
    pub kind: RecipientKind,
    pub name: String,
    pub account_number: String,
    pub bank_code: String,
    pub currency: String,
}

/// One money movement: amount in minor units to a recipient handle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferInstruction {
    pub amount: i64,
    pub recipient: String,
    pub reason: String,
    pub reference: String,
}

/// Provider acknowledgement of one transfer
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransferReceipt {
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub transfer_code: Option<String>,
    #[serde(default = "default_receipt_status")]
    pub status: String,
}

fn default_receipt_status() -> String {
    "pending".to_string()
}

impl TransferReceipt {
    pub fn is_failed(&self) -> bool {
        self.status.eq_ignore_ascii_case("failed")
    }
}

/// Payment provider API used by the payout engine
///
/// INVARIANTS:
/// - `Rejected` and `Unreachable` errors mean no money moved
/// - `Ambiguous` errors mean the provider may have acted on the request
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Balances per currency
    async fn fetch_balances(&self) -> Result<Vec<ProviderBalance>, ProviderError>;

    /// Create a transfer recipient and return its handle
    async fn create_recipient(&self, request: &RecipientRequest) -> Result<String, ProviderError>;

    /// Single transfer from the pooled balance
    async fn transfer(
        &self,
        currency: &str,
        instruction: &TransferInstruction,
    ) -> Result<TransferReceipt, ProviderError>;

    /// Batched transfer from the pooled balance; one receipt per accepted instruction
    async fn bulk_transfer(
        &self,
        currency: &str,
        instructions: &[TransferInstruction],
    ) -> Result<Vec<TransferReceipt>, ProviderError>;
}
