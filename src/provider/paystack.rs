use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{PaymentProvider, ProviderBalance, RecipientRequest, TransferInstruction, TransferReceipt};
use crate::error::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://api.paystack.co";

/// Every Paystack response is wrapped in this envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RecipientData {
    recipient_code: Option<String>,
}

/// Paystack REST client
pub struct PaystackClient {
    http: Client,
    base_url: String,
    secret_key: String,
}

impl PaystackClient {
    /// Every call made by this client is bounded by `timeout`
    pub fn new(base_url: &str, secret_key: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unreachable(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let response = request.bearer_auth(&self.secret_key).send().await?;
        let status = response.status();
        // A failure while reading the body happens after the request was delivered
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Ambiguous(e.to_string()))?;

        debug!("Paystack responded {}", status);
        parse_envelope(status, &body)
    }
}

/// Interpret a Paystack response body.
///
/// 5xx and unreadable bodies are ambiguous; an explicit `status: false` is a rejection.
fn parse_envelope<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, ProviderError> {
    if status.is_server_error() {
        return Err(ProviderError::Ambiguous(format!(
            "provider returned {}: {}",
            status,
            truncate(body)
        )));
    }

    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_client_error() => {
            return Err(ProviderError::Rejected(format!("provider returned {}: {}", status, e)))
        }
        Err(e) => return Err(ProviderError::Ambiguous(format!("unreadable response: {}", e))),
    };

    if !envelope.status {
        let message = if envelope.message.is_empty() {
            format!("request rejected ({})", status)
        } else {
            envelope.message
        };
        return Err(ProviderError::Rejected(message));
    }

    envelope
        .data
        .ok_or_else(|| ProviderError::Ambiguous(format!("response without data: {}", envelope.message)))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[async_trait]
impl PaymentProvider for PaystackClient {
    async fn fetch_balances(&self) -> Result<Vec<ProviderBalance>, ProviderError> {
        self.send(self.http.get(self.url("/balance"))).await
    }

    async fn create_recipient(&self, request: &RecipientRequest) -> Result<String, ProviderError> {
        let data: RecipientData = self
            .send(self.http.post(self.url("/transferrecipient")).json(request))
            .await?;

        match data.recipient_code.filter(|code| !code.is_empty()) {
            Some(code) => Ok(code),
            None => {
                warn!("Recipient created for {} without a code", request.name);
                Err(ProviderError::Rejected(
                    "Failed to create Paystack recipient".to_string(),
                ))
            }
        }
    }

    async fn transfer(
        &self,
        currency: &str,
        instruction: &TransferInstruction,
    ) -> Result<TransferReceipt, ProviderError> {
        let body = serde_json::json!({
            "source": "balance",
            "currency": currency,
            "amount": instruction.amount,
            "recipient": instruction.recipient,
            "reason": instruction.reason,
            "reference": instruction.reference,
        });

        let mut receipt: TransferReceipt = self
            .send(self.http.post(self.url("/transfer")).json(&body))
            .await?;
        if receipt.reference.is_empty() {
            receipt.reference = instruction.reference.clone();
        }
        Ok(receipt)
    }

    async fn bulk_transfer(
        &self,
        currency: &str,
        instructions: &[TransferInstruction],
    ) -> Result<Vec<TransferReceipt>, ProviderError> {
        let body = serde_json::json!({
            "source": "balance",
            "currency": currency,
            "transfers": instructions,
        });

        self.send(self.http.post(self.url("/transfer/bulk")).json(&body))
            .await
    }
}
