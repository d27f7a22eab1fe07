use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::error::ProviderError;
use crate::ledger::{
    models::{DisbursementDetails, Payee},
    PayoutLedger,
};
use crate::provider::{PaymentProvider, RecipientKind, RecipientRequest};

/// Institution name → provider code.
///
/// Lookups try the exact name, then a case-insensitive match. Unknown names
/// are passed through unchanged and flagged, so the provider gets to decide.
#[derive(Debug, Clone)]
pub struct InstitutionCodes {
    codes: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstitutionCode {
    Mapped(String),
    PassThrough(String),
}

impl InstitutionCodes {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            codes: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn lookup(&self, institution: &str) -> InstitutionCode {
        let name = institution.trim();
        if let Some(code) = self.codes.get(name) {
            return InstitutionCode::Mapped(code.clone());
        }

        self.codes
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(_, code)| InstitutionCode::Mapped(code.clone()))
            .unwrap_or_else(|| InstitutionCode::PassThrough(name.to_string()))
    }
}

impl Default for InstitutionCodes {
    /// Ghanaian banks and mobile-money operators
    fn default() -> Self {
        Self::new([
            ("GCB Bank", "GCB"),
            ("Ecobank", "ECO"),
            ("Fidelity Bank", "FBN"),
            ("Stanbic Bank", "STB"),
            ("Standard Chartered", "SCB"),
            ("Zenith Bank", "ZEN"),
            ("Access Bank", "ABG"),
            ("CalBank", "CAL"),
            ("Absa Bank", "ABS"),
            ("UBA", "UBA"),
            ("Republic Bank", "REP"),
            ("First National Bank", "FNB"),
            ("MTN", "MTN"),
            ("Vodafone", "VOD"),
            ("AirtelTigo", "ATL"),
        ])
    }
}

/// Why a payee could not be resolved
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveFailure {
    Incomplete(&'static str),
    RecipientRejected(String),
}

impl ResolveFailure {
    pub fn reason(&self) -> String {
        match self {
            ResolveFailure::Incomplete(reason) => reason.to_string(),
            ResolveFailure::RecipientRejected(reason) => reason.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub details: DisbursementDetails,
    pub recipient_code: String,
    pub warning: Option<String>,
}

/// Validates payee details and finds or creates their recipient handle
pub struct PayeeResolver<'a> {
    ledger: &'a dyn PayoutLedger,
    provider: &'a dyn PaymentProvider,
    codes: &'a InstitutionCodes,
    currency: &'a str,
}

impl<'a> PayeeResolver<'a> {
    pub fn new(
        ledger: &'a dyn PayoutLedger,
        provider: &'a dyn PaymentProvider,
        codes: &'a InstitutionCodes,
        currency: &'a str,
    ) -> Self {
        Self {
            ledger,
            provider,
            codes,
            currency,
        }
    }

    /// Whether this payee can be paid, and where to. Never fails the run.
    pub async fn resolve(&self, payee: &Payee) -> Result<Resolution, ResolveFailure> {
        let details = payee
            .disbursement_details()
            .map_err(ResolveFailure::Incomplete)?;

        if let Some(code) = payee.cached_recipient() {
            return Ok(Resolution {
                details,
                recipient_code: code.to_string(),
                warning: None,
            });
        }

        let (bank_code, mut warning) = match self.codes.lookup(details.institution()) {
            InstitutionCode::Mapped(code) => (code, None),
            InstitutionCode::PassThrough(raw) => {
                warn!(
                    "⚠️  No provider code for '{}' (payee {}), sending it as-is",
                    raw, payee.id
                );
                let warning = format!(
                    "{}: institution '{}' is not in the code table and was sent unmapped",
                    payee.full_name, raw
                );
                (raw, Some(warning))
            }
        };

        let request = RecipientRequest {
            kind: RecipientKind::from(details.method()),
            name: details.holder_name().to_string(),
            account_number: details.account_number().to_string(),
            bank_code,
            currency: self.currency.to_string(),
        };

        let created = match self.provider.create_recipient(&request).await {
            Ok(code) => code,
            Err(err) => {
                warn!("Recipient creation failed for payee {}: {}", payee.id, err);
                return Err(ResolveFailure::RecipientRejected(recipient_reason(&err)));
            }
        };

        // The handle exists at the provider now; a failed save must not lose this payee
        let stored = match self.ledger.store_recipient_code(payee.id, &created).await {
            Ok(stored) => {
                info!("✅ Recipient {} ready for payee {}", stored, payee.id);
                stored
            }
            Err(e) => {
                error!(
                    "🚨 Recipient {} created for payee {} but could not be saved: {}",
                    created, payee.id, e
                );
                let note = format!(
                    "{}: recipient {} was created but could not be saved",
                    payee.full_name, created
                );
                warning = Some(match warning {
                    Some(existing) => format!("{}; {}", existing, note),
                    None => note,
                });
                created
            }
        };

        Ok(Resolution {
            details,
            recipient_code: stored,
            warning,
        })
    }
}

fn recipient_reason(err: &ProviderError) -> String {
    match err {
        ProviderError::Rejected(message) if !message.is_empty() => message.clone(),
        ProviderError::Rejected(_) => "Failed to create Paystack recipient".to_string(),
        other => format!("Failed to create Paystack recipient: {}", other),
    }
}
