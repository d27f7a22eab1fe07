use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::models::{DisbursementDetails, Earning, Payee};

/// A payee left out of a run, with the reason shown to the admin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPayee {
    pub payee_id: Uuid,
    #[serde(rename = "teacher")]
    pub payee_name: String,
    pub reason: String,
}

/// A transfer the provider accepted but the ledger did not record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsettledPayout {
    pub payee_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
    pub earnings_ids: Vec<Uuid>,
    pub error: String,
}

/// Released earnings of one payee, summed exactly
#[derive(Debug, Clone)]
pub struct PayeeGroup {
    pub payee_id: Uuid,
    pub total: Decimal,
    pub earnings: Vec<Earning>,
}

impl PayeeGroup {
    pub fn earning_ids(&self) -> Vec<Uuid> {
        self.earnings.iter().map(|e| e.id).collect()
    }
}

/// A payee that passed validation and has a recipient handle
#[derive(Debug, Clone)]
pub struct ResolvedPayee {
    pub payee: Payee,
    pub details: DisbursementDetails,
    pub recipient_code: String,
    pub group: PayeeGroup,
}

/// Response of a bulk run
#[derive(Debug, Clone, Serialize)]
pub struct BulkPayoutReport {
    pub success: bool,
    pub message: String,
    pub run_id: Option<Uuid>,
    pub total_amount: Decimal,
    pub transfers_count: usize,
    pub references: Vec<String>,
    pub skipped: Vec<SkippedPayee>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl BulkPayoutReport {
    pub fn nothing_to_pay() -> Self {
        Self {
            success: true,
            message: "No pending payouts to process".to_string(),
            run_id: None,
            total_amount: Decimal::ZERO,
            transfers_count: 0,
            references: Vec::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Admin request to pay one payee for specific earnings
#[derive(Debug, Clone)]
pub struct SinglePayoutRequest {
    pub payee_id: Uuid,
    pub amount: Decimal,
    pub earning_ids: Vec<Uuid>,
}

/// Response of a single payout
#[derive(Debug, Clone, Serialize)]
pub struct SinglePayoutReceipt {
    pub success: bool,
    pub message: String,
    pub run_id: Uuid,
    pub transfer_code: Option<String>,
    pub reference: String,
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Operating-currency balance as shown to the admin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceView {
    pub balance: Decimal,
    pub currency: String,
    pub available: Decimal,
}

/// A payee with released earnings waiting for a run
#[derive(Debug, Clone, Serialize)]
pub struct PendingPayee {
    pub id: Uuid,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub payout_method: crate::ledger::models::PayoutMethod,
    pub destination: Option<String>,
    pub pending_amount: Decimal,
    pub pending_count: usize,
    pub earnings: Vec<Earning>,
}

/// Keep the last four characters of an account number
pub fn mask_account(account: &str) -> String {
    let chars: Vec<char> = account.chars().collect();
    if chars.len() <= 4 {
        return account.to_string();
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

impl PendingPayee {
    pub fn new(payee: &Payee, group: PayeeGroup) -> Self {
        let destination = payee
            .disbursement_details()
            .ok()
            .map(|d| format!("{} - {}", d.institution(), mask_account(d.account_number())));

        Self {
            id: payee.id,
            full_name: payee.full_name.clone(),
            avatar_url: payee.avatar_url.clone(),
            payout_method: payee.payout_method,
            destination,
            pending_amount: group.total,
            pending_count: group.earnings.len(),
            earnings: group.earnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_account() {
        assert_eq!(mask_account("0241234567"), "******4567");
        assert_eq!(mask_account("123"), "123");
    }
}
