use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

/// Earning status enum
///
/// `Processing` marks rows claimed by a payout run that has not yet settled.
/// Rows only move held → released → processing → paid, or from processing
/// back to released when a run gives its claim up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "earning_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EarningStatus {
    Held,
    Released,
    Processing,
    Paid,
}

/// Payout status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payout_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Success,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Success => "success",
            PayoutStatus::Failed => "failed",
        }
    }

    /// Parse a history filter; "all" (or nothing) means no filter
    pub fn parse_filter(raw: Option<&str>) -> Result<Option<PayoutStatus>, String> {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => Ok(None),
            Some("pending") => Ok(Some(PayoutStatus::Pending)),
            Some("success") => Ok(Some(PayoutStatus::Success)),
            Some("failed") => Ok(Some(PayoutStatus::Failed)),
            Some(other) => Err(format!("Unknown payout status: {}", other)),
        }
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payout_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    Bank,
    MobileMoney,
}

/// Earning entity - one payable unit owed to a payee
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Earning {
    pub id: Uuid,
    pub payee_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub amount: Decimal,
    pub status: EarningStatus,
    pub payout_run_id: Option<Uuid>,
    pub payout_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Payee entity - a teacher who receives payouts
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payee {
    pub id: Uuid,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub payout_method: PayoutMethod,
    pub bank_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub bank_account_name: Option<String>,
    pub momo_provider: Option<String>,
    pub momo_number: Option<String>,
    pub momo_name: Option<String>,
    pub recipient_code: Option<String>,
}

/// Validated destination for a payee's money
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisbursementDetails {
    Bank {
        bank_name: String,
        account_number: String,
        account_name: String,
    },
    MobileMoney {
        provider: String,
        number: String,
        name: String,
    },
}

impl DisbursementDetails {
    pub fn method(&self) -> PayoutMethod {
        match self {
            DisbursementDetails::Bank { .. } => PayoutMethod::Bank,
            DisbursementDetails::MobileMoney { .. } => PayoutMethod::MobileMoney,
        }
    }

    /// Bank or mobile-money operator name as the payee entered it
    pub fn institution(&self) -> &str {
        match self {
            DisbursementDetails::Bank { bank_name, .. } => bank_name,
            DisbursementDetails::MobileMoney { provider, .. } => provider,
        }
    }

    pub fn account_number(&self) -> &str {
        match self {
            DisbursementDetails::Bank { account_number, .. } => account_number,
            DisbursementDetails::MobileMoney { number, .. } => number,
        }
    }

    pub fn holder_name(&self) -> &str {
        match self {
            DisbursementDetails::Bank { account_name, .. } => account_name,
            DisbursementDetails::MobileMoney { name, .. } => name,
        }
    }

    /// Snapshot stored on payout rows, e.g. "MTN - 0241234567"
    pub fn snapshot(&self) -> String {
        format!("{} - {}", self.institution(), self.account_number())
    }
}

fn filled(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Payee {
    /// Check that the declared payout method has every field it needs.
    /// Returns the human-readable skip reason otherwise.
    pub fn disbursement_details(&self) -> Result<DisbursementDetails, &'static str> {
        match self.payout_method {
            PayoutMethod::MobileMoney => {
                match (
                    filled(&self.momo_provider),
                    filled(&self.momo_number),
                    filled(&self.momo_name),
                ) {
                    (Some(provider), Some(number), Some(name)) => {
                        Ok(DisbursementDetails::MobileMoney { provider, number, name })
                    }
                    _ => Err("Incomplete mobile money details"),
                }
            }
            PayoutMethod::Bank => {
                match (
                    filled(&self.bank_name),
                    filled(&self.bank_account_number),
                    filled(&self.bank_account_name),
                ) {
                    (Some(bank_name), Some(account_number), Some(account_name)) => {
                        Ok(DisbursementDetails::Bank {
                            bank_name,
                            account_number,
                            account_name,
                        })
                    }
                    _ => Err("Incomplete bank details"),
                }
            }
        }
    }

    pub fn cached_recipient(&self) -> Option<&str> {
        self.recipient_code
            .as_deref()
            .filter(|code| !code.trim().is_empty())
    }
}

/// Payout entity - immutable record of one disbursement attempt
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payout {
    pub id: Uuid,
    pub payee_id: Uuid,
    pub run_id: Uuid,
    pub amount: Decimal,
    pub reference: String,
    pub transfer_code: Option<String>,
    pub status: PayoutStatus,
    pub earnings_ids: Vec<Uuid>,
    pub payout_method: PayoutMethod,
    pub payout_details: String,
    pub created_at: DateTime<Utc>,
}

/// Payout row joined with the payee's display info
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayoutWithPayee {
    pub id: Uuid,
    pub payee_id: Uuid,
    pub amount: Decimal,
    pub reference: String,
    pub transfer_code: Option<String>,
    pub status: PayoutStatus,
    pub earnings_ids: Vec<Uuid>,
    pub payout_method: PayoutMethod,
    pub payout_details: String,
    pub created_at: DateTime<Utc>,
    pub teacher_name: Option<String>,
    pub teacher_avatar_url: Option<String>,
}

/// Aggregate figures over every payout row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PayoutSummary {
    pub total_payouts: i64,
    pub total_amount: Decimal,
    pub pending: i64,
    pub success: i64,
    pub failed: i64,
}

/// One page of payout history
#[derive(Debug, Clone, Serialize)]
pub struct PayoutPage {
    pub payouts: Vec<PayoutWithPayee>,
    pub total: i64,
}

/// Payout row to insert once the provider accepted a transfer
#[derive(Debug, Clone)]
pub struct NewPayout {
    pub payee_id: Uuid,
    pub run_id: Uuid,
    pub amount: Decimal,
    pub reference: String,
    pub transfer_code: Option<String>,
    pub earnings_ids: Vec<Uuid>,
    pub payout_method: PayoutMethod,
    pub payout_details: String,
}

/// Notification written alongside a settlement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
}

/// Earnings stuck in `processing` for one run
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StaleClaim {
    pub run_id: Uuid,
    pub payee_id: Uuid,
    pub earnings_count: i64,
    pub amount: Decimal,
    pub claimed_at: DateTime<Utc>,
}

/// Provider callback about a transfer's final state
#[derive(Debug, Clone)]
pub struct TransferStatusUpdate {
    pub reference: String,
    pub transfer_code: Option<String>,
    pub status: PayoutStatus,
}

/// Provider callback about a customer charge
#[derive(Debug, Clone)]
pub enum ChargeEvent {
    Succeeded {
        booking_id: Uuid,
        reference: String,
        amount: Decimal,
        currency: String,
        paid_at: Option<DateTime<Utc>>,
    },
    Failed {
        booking_id: Uuid,
    },
}
