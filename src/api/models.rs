use crate::ledger::models::*;
use crate::payouts::models::{PendingPayee, SinglePayoutRequest};
use crate::error::PayoutError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

// ========== REQUEST MODELS ==========

/// Admin request to pay one teacher for specific earnings
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePayoutRequest {
    #[validate(required(message = "teacher_id is required"))]
    pub teacher_id: Option<Uuid>,

    #[validate(required(message = "amount is required"))]
    pub amount: Option<Decimal>,

    #[validate(
        required(message = "earnings_ids is required"),
        length(min = 1, message = "earnings_ids must not be empty")
    )]
    pub earnings_ids: Option<Vec<Uuid>>,
}

impl CreatePayoutRequest {
    pub fn into_request(self) -> Result<SinglePayoutRequest, PayoutError> {
        match (self.teacher_id, self.amount, self.earnings_ids) {
            (Some(payee_id), Some(amount), Some(earning_ids)) if !earning_ids.is_empty() => {
                Ok(SinglePayoutRequest {
                    payee_id,
                    amount,
                    earning_ids,
                })
            }
            _ => Err(PayoutError::Validation(
                "Missing required fields: teacher_id, amount, earnings_ids".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PendingQuery {
    pub teacher_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

impl HistoryQuery {
    /// Page (1-based) and page size, clamped to sane bounds
    pub fn page_and_limit(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PendingPayoutsResponse {
    ForTeacher { earnings: Vec<Earning> },
    AllTeachers { teachers: Vec<PendingPayee> },
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PayoutHistoryResponse {
    pub payouts: Vec<PayoutWithPayee>,
    pub pagination: Pagination,
    pub summary: PayoutSummary,
}

#[derive(Debug, Serialize)]
pub struct StaleClaimsResponse {
    pub threshold_minutes: i64,
    pub claims: Vec<StaleClaim>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}
