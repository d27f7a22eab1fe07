use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha512;
use tracing::{info, warn};
use uuid::Uuid;

use super::{handlers::AppState, models::WebhookAck};
use crate::error::{AppResult, WebhookError};
use crate::ledger::models::{ChargeEvent, PayoutStatus, TransferStatusUpdate};

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Check a hex HMAC-SHA512 of `body` keyed with `secret`, in constant time
pub fn verify_signature(secret: &[u8], body: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(WebhookError::MissingSignature)?;
    let expected = hex::decode(signature).map_err(|_| WebhookError::SignatureMismatch)?;

    let mut mac = HmacSha512::new_from_slice(secret).map_err(|_| WebhookError::SignatureMismatch)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::SignatureMismatch)
}

#[derive(Debug, Deserialize)]
struct ProviderEvent {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TransferData {
    reference: String,
    transfer_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChargeMetadata {
    booking_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    reference: Option<String>,
    #[serde(default)]
    amount: i64,
    currency: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<ChargeMetadata>,
}

impl ChargeData {
    fn booking_id(&self) -> Option<Uuid> {
        self.metadata.as_ref().and_then(|m| m.booking_id)
    }
}

/// What a verified event asks the ledger to do
#[derive(Debug)]
enum EventAction {
    Transfer(TransferStatusUpdate),
    Charge(ChargeEvent),
    Ignore(String),
}

fn classify(event: ProviderEvent) -> Result<EventAction, WebhookError> {
    let malformed = |e: serde_json::Error| WebhookError::MalformedPayload(e.to_string());

    let transfer_status = match event.event.as_str() {
        "transfer.success" => Some(PayoutStatus::Success),
        "transfer.failed" | "transfer.reversed" => Some(PayoutStatus::Failed),
        _ => None,
    };
    if let Some(status) = transfer_status {
        let data: TransferData = serde_json::from_value(event.data).map_err(malformed)?;
        return Ok(EventAction::Transfer(TransferStatusUpdate {
            reference: data.reference,
            transfer_code: data.transfer_code,
            status,
        }));
    }

    match event.event.as_str() {
        "charge.success" => {
            let data: ChargeData = serde_json::from_value(event.data).map_err(malformed)?;
            match (data.booking_id(), data.reference.clone()) {
                (Some(booking_id), Some(reference)) => Ok(EventAction::Charge(ChargeEvent::Succeeded {
                    booking_id,
                    reference,
                    amount: Decimal::new(data.amount, 2),
                    currency: data.currency.unwrap_or_else(|| "GHS".to_string()),
                    paid_at: data.paid_at,
                })),
                _ => Ok(EventAction::Ignore("charge without booking reference".to_string())),
            }
        }
        "charge.failed" => {
            let data: ChargeData = serde_json::from_value(event.data).map_err(malformed)?;
            match data.booking_id() {
                Some(booking_id) => Ok(EventAction::Charge(ChargeEvent::Failed { booking_id })),
                None => Ok(EventAction::Ignore("charge without booking reference".to_string())),
            }
        }
        other => Ok(EventAction::Ignore(format!("unhandled event {}", other))),
    }
}

/// POST /api/payments/webhook
///
/// The signature is checked over the raw body before any field is read.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = verify_signature(state.webhook_secret.as_bytes(), &body, signature) {
        warn!("🚫 Rejected provider webhook: {}", e);
        return Err(e.into());
    }

    let event: ProviderEvent = serde_json::from_slice(&body)
        .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
    let name = event.event.clone();

    match classify(event)? {
        EventAction::Transfer(update) => {
            let found = state.ledger.apply_transfer_update(&update).await?;
            if !found {
                warn!("Transfer event {} for unknown reference {}", name, update.reference);
            } else if update.status == PayoutStatus::Failed {
                // Earnings stay paid; a failed transfer needs someone to look at it
                warn!(
                    "⚠️  Payout {} reported {}; earnings need manual follow-up",
                    update.reference, name
                );
            } else {
                info!("✓ Payout {} confirmed by provider", update.reference);
            }
        }
        EventAction::Charge(charge) => {
            state.ledger.apply_charge_event(&charge).await?;
        }
        EventAction::Ignore(reason) => {
            info!("Webhook {} acknowledged without action: {}", name, reason);
        }
    }

    Ok(Json(WebhookAck { received: true }))
}
