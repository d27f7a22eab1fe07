use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use uuid::Uuid;

use crate::payouts::models::{SkippedPayee, UnsettledPayout};

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payout error: {0}")]
    Payout(#[from] PayoutError),

    #[error("Payment provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Payout pipeline errors.
///
/// Everything raised before the provider accepts a dispatch leaves the ledger
/// untouched and is safe to retry. `DispatchOutcomeUnknown` and
/// `PartialSettlementInconsistency` are the two cases where money may have
/// moved and an operator has to look before trying again.
#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("{0}")]
    Validation(String),

    #[error("Teacher not found")]
    PayeeNotFound(Uuid),

    #[error("{payee}: {reason}")]
    PayeeDetailIncomplete { payee: String, reason: String },

    #[error("Recipient creation failed for {payee}: {reason}")]
    RecipientCreationFailed { payee: String, reason: String },

    #[error("Only {claimable} of {requested} earnings are outstanding")]
    EarningsUnavailable { requested: usize, claimable: usize },

    #[error("Requested amount {requested} does not match outstanding earnings {outstanding}")]
    AmountMismatch { requested: Decimal, outstanding: Decimal },

    #[error("Insufficient balance. Need {currency} {required:.2}, have {currency} {available:.2}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
        currency: String,
        skipped: Vec<SkippedPayee>,
    },

    #[error("No valid transfers to process")]
    NoValidTransfers { skipped: Vec<SkippedPayee> },

    #[error("Transfer failed: {0}")]
    ProviderDispatchFailed(String),

    #[error("Transfer outcome unknown for run {run_id}: {reason}")]
    DispatchOutcomeUnknown {
        run_id: Uuid,
        reason: String,
        references: Vec<String>,
    },

    #[error("Transfers accepted but {} payout(s) could not be recorded", .unsettled.len())]
    PartialSettlementInconsistency {
        run_id: Uuid,
        settled: usize,
        unsettled: Vec<UnsettledPayout>,
    },

    #[error("Payout deadline exceeded during {stage}")]
    DeadlineExceeded { stage: &'static str },

    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("A bulk payout is already running")]
    BatchInProgress,
}

/// Payment provider errors, split by what they imply about money movement
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The provider answered and refused the request.
    #[error("{0}")]
    Rejected(String),

    /// The request never reached the provider.
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    /// The request may have been processed but no usable answer came back.
    #[error("provider response unknown: {0}")]
    Ambiguous(String),
}

impl ProviderError {
    /// Whether the provider could have acted on the request
    pub fn may_have_executed(&self) -> bool {
        matches!(self, ProviderError::Ambiguous(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_builder() {
            ProviderError::Unreachable(error.to_string())
        } else {
            ProviderError::Ambiguous(error.to_string())
        }
    }
}

/// Webhook boundary errors
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Invalid signature")]
    SignatureMismatch,

    #[error("Malformed event: {0}")]
    MalformedPayload(String),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    /// False when funds may have moved and the ledger needs a manual check.
    pub retry_safe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn retry_safe(&self) -> bool {
        !matches!(
            self,
            AppError::Payout(PayoutError::DispatchOutcomeUnknown { .. })
                | AppError::Payout(PayoutError::PartialSettlementInconsistency { .. })
        )
    }

    fn parts(&self) -> (StatusCode, &'static str, String, Option<serde_json::Value>) {
        match self {
            AppError::Payout(err) => {
                let message = err.to_string();
                match err {
                    PayoutError::Validation(_) => {
                        (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message, None)
                    }
                    PayoutError::PayeeNotFound(id) => (
                        StatusCode::NOT_FOUND,
                        "PAYEE_NOT_FOUND",
                        message,
                        Some(serde_json::json!({ "teacher_id": id })),
                    ),
                    PayoutError::PayeeDetailIncomplete { payee, reason } => (
                        StatusCode::BAD_REQUEST,
                        "PAYEE_DETAIL_INCOMPLETE",
                        format!("Teacher has {}", reason.to_lowercase()),
                        Some(serde_json::json!({ "teacher": payee })),
                    ),
                    PayoutError::RecipientCreationFailed { payee, reason } => (
                        StatusCode::BAD_REQUEST,
                        "RECIPIENT_CREATION_FAILED",
                        reason.clone(),
                        Some(serde_json::json!({ "teacher": payee })),
                    ),
                    PayoutError::EarningsUnavailable { requested, claimable } => (
                        StatusCode::CONFLICT,
                        "EARNINGS_UNAVAILABLE",
                        message,
                        Some(serde_json::json!({
                            "requested": requested,
                            "claimable": claimable,
                        })),
                    ),
                    PayoutError::AmountMismatch { requested, outstanding } => (
                        StatusCode::BAD_REQUEST,
                        "AMOUNT_MISMATCH",
                        message,
                        Some(serde_json::json!({
                            "requested": requested,
                            "outstanding": outstanding,
                        })),
                    ),
                    PayoutError::InsufficientBalance {
                        required,
                        available,
                        currency,
                        skipped,
                    } => (
                        StatusCode::BAD_REQUEST,
                        "INSUFFICIENT_BALANCE",
                        message,
                        Some(serde_json::json!({
                            "required": required,
                            "available": available,
                            "currency": currency,
                            "skipped": skipped,
                        })),
                    ),
                    PayoutError::NoValidTransfers { skipped } => (
                        StatusCode::BAD_REQUEST,
                        "NO_VALID_TRANSFERS",
                        message,
                        Some(serde_json::json!({ "skipped": skipped })),
                    ),
                    PayoutError::ProviderDispatchFailed(_) => {
                        (StatusCode::BAD_GATEWAY, "PROVIDER_DISPATCH_FAILED", message, None)
                    }
                    PayoutError::DispatchOutcomeUnknown {
                        run_id, references, ..
                    } => (
                        StatusCode::GATEWAY_TIMEOUT,
                        "DISPATCH_OUTCOME_UNKNOWN",
                        "Transfer status unknown. Check the provider dashboard before retrying"
                            .to_string(),
                        Some(serde_json::json!({
                            "run_id": run_id,
                            "references": references,
                        })),
                    ),
                    PayoutError::PartialSettlementInconsistency {
                        run_id,
                        settled,
                        unsettled,
                    } => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "PARTIAL_SETTLEMENT_INCONSISTENCY",
                        "Transfers were sent but some payouts were not recorded. Manual reconciliation required"
                            .to_string(),
                        Some(serde_json::json!({
                            "run_id": run_id,
                            "settled": settled,
                            "unsettled": unsettled,
                        })),
                    ),
                    PayoutError::DeadlineExceeded { stage } => (
                        StatusCode::GATEWAY_TIMEOUT,
                        "DEADLINE_EXCEEDED",
                        message,
                        Some(serde_json::json!({ "stage": stage })),
                    ),
                    PayoutError::ProviderUnavailable(_) => {
                        (StatusCode::BAD_GATEWAY, "PROVIDER_UNAVAILABLE", message, None)
                    }
                    PayoutError::BatchInProgress => {
                        (StatusCode::CONFLICT, "BATCH_IN_PROGRESS", message, None)
                    }
                }
            }
            AppError::Provider(err) => (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                err.to_string(),
                None,
            ),
            AppError::Webhook(WebhookError::MalformedPayload(_)) => (
                StatusCode::BAD_REQUEST,
                "MALFORMED_EVENT",
                self.to_string(),
                None,
            ),
            AppError::Webhook(_) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_SIGNATURE",
                "Invalid signature".to_string(),
                None,
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
                None,
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
                None,
            ),
            AppError::Config(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
                None,
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = self.parts();

        if status.is_server_error() {
            tracing::error!(error = %self, code = error_code, "Request failed");
        }

        let body = Json(ErrorResponse {
            success: false,
            error: message,
            error_code: error_code.to_string(),
            retry_safe: self.retry_safe(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
