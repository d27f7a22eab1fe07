use config::Environment;
use serde::Deserialize;
use std::time::Duration;

use crate::payouts::PayoutConfig;
use crate::provider::paystack::DEFAULT_BASE_URL;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub paystack_secret_key: String,
    pub paystack_base_url: String,
    pub payout_currency: String,
    pub provider_timeout_secs: u64,
    pub batch_deadline_secs: u64,
    pub stale_claim_minutes: i64,
    /// Comma-separated list of dashboard origins
    pub allowed_origins: String,
    pub admin_rate_limit_per_minute: u32,
    pub max_db_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(Environment::default())
    }

    fn load(env: Environment) -> Result<Self, config::ConfigError> {
        let config: Config = config::Config::builder()
            .set_default("database_url", "postgresql://localhost/payouts")?
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("paystack_base_url", DEFAULT_BASE_URL)?
            .set_default("payout_currency", "GHS")?
            .set_default("provider_timeout_secs", 15)?
            .set_default("batch_deadline_secs", 120)?
            .set_default("stale_claim_minutes", 30)?
            .set_default("allowed_origins", "http://localhost:3000")?
            .set_default("admin_rate_limit_per_minute", 30)?
            .set_default("max_db_connections", 10)?
            .add_source(env)
            .build()?
            .try_deserialize()?;

        if config.paystack_secret_key.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "PAYSTACK_SECRET_KEY must be set".to_string(),
            ));
        }
        if config.provider_timeout_secs == 0 || config.batch_deadline_secs == 0 {
            return Err(config::ConfigError::Message(
                "PROVIDER_TIMEOUT_SECS and BATCH_DEADLINE_SECS must be positive".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn payout_config(&self) -> PayoutConfig {
        PayoutConfig {
            currency: self.payout_currency.trim().to_uppercase(),
            batch_deadline: Duration::from_secs(self.batch_deadline_secs),
            stale_claim_age: chrono::Duration::minutes(self.stale_claim_minutes),
        }
    }
}
