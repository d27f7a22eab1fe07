use rust_decimal::Decimal;
use tracing::{info, warn};

use super::models::SkippedPayee;
use crate::error::PayoutError;
use crate::provider::{PaymentProvider, ProviderBalance};

/// Available balance in `currency`, in major units. A missing bucket counts as zero.
pub fn available_in(balances: &[ProviderBalance], currency: &str) -> Decimal {
    balances
        .iter()
        .find(|b| b.currency.eq_ignore_ascii_case(currency))
        .map(|b| Decimal::new(b.balance, 2))
        .unwrap_or(Decimal::ZERO)
}

/// Gate that runs after resolution and before any money moves
pub struct BalanceGuard<'a> {
    provider: &'a dyn PaymentProvider,
    currency: &'a str,
}

impl<'a> BalanceGuard<'a> {
    pub fn new(provider: &'a dyn PaymentProvider, currency: &'a str) -> Self {
        Self { provider, currency }
    }

    pub async fn available(&self) -> Result<Decimal, PayoutError> {
        let balances = self.provider.fetch_balances().await.map_err(|e| {
            warn!("Balance lookup failed: {}", e);
            PayoutError::ProviderUnavailable(e.to_string())
        })?;
        Ok(available_in(&balances, self.currency))
    }

    /// Fail with `InsufficientBalance` when `required` exceeds what the provider holds.
    /// `skipped` is carried into the error so the admin still sees it.
    pub async fn check(
        &self,
        required: Decimal,
        skipped: &[SkippedPayee],
    ) -> Result<Decimal, PayoutError> {
        let available = self.available().await?;

        if required > available {
            warn!(
                "❌ Insufficient balance: need {} {}, have {} {}",
                self.currency, required, self.currency, available
            );
            return Err(PayoutError::InsufficientBalance {
                required,
                available,
                currency: self.currency.to_string(),
                skipped: skipped.to_vec(),
            });
        }

        info!(
            "✓ Balance check passed: need {} {}, have {} {}",
            self.currency, required, self.currency, available
        );
        Ok(available)
    }
}
