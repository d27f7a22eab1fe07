//! Scripted provider for engine tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

use super::{PaymentProvider, ProviderBalance, RecipientRequest, TransferInstruction, TransferReceipt};
use crate::error::ProviderError;

#[derive(Default)]
struct Script {
    balances: Vec<ProviderBalance>,
    balance_error: Option<ProviderError>,
    balance_delay: Option<Duration>,
    recipient_error: Option<ProviderError>,
    transfer_error: Option<ProviderError>,
    failed_references: Vec<String>,
}

#[derive(Default)]
struct Calls {
    balance: usize,
    recipients: Vec<RecipientRequest>,
    transfers: Vec<TransferInstruction>,
    bulk: Vec<Vec<TransferInstruction>>,
}

#[derive(Default)]
pub struct MockProvider {
    script: Mutex<Script>,
    calls: Mutex<Calls>,
}

impl MockProvider {
    /// Provider holding `minor` pesewas of GHS
    pub fn with_ghs_balance(minor: i64) -> Self {
        let provider = Self::default();
        provider.script.lock().balances = vec![ProviderBalance {
            currency: "GHS".to_string(),
            balance: minor,
        }];
        provider
    }

    pub fn fail_balance(&self, error: ProviderError) {
        self.script.lock().balance_error = Some(error);
    }

    /// Answer balance lookups only after `delay`
    pub fn slow_balance(&self, delay: Duration) {
        self.script.lock().balance_delay = Some(delay);
    }

    pub fn fail_recipients(&self, error: ProviderError) {
        self.script.lock().recipient_error = Some(error);
    }

    pub fn fail_transfers(&self, error: ProviderError) {
        self.script.lock().transfer_error = Some(error);
    }

    /// Report the instruction whose reference starts with `prefix` as failed
    pub fn fail_reference_prefix(&self, prefix: &str) {
        self.script.lock().failed_references.push(prefix.to_string());
    }

    pub fn balance_calls(&self) -> usize {
        self.calls.lock().balance
    }

    pub fn recipient_calls(&self) -> Vec<RecipientRequest> {
        self.calls.lock().recipients.clone()
    }

    pub fn single_transfers(&self) -> Vec<TransferInstruction> {
        self.calls.lock().transfers.clone()
    }

    pub fn bulk_calls(&self) -> Vec<Vec<TransferInstruction>> {
        self.calls.lock().bulk.clone()
    }

    /// Every provider call, of any kind
    pub fn total_calls(&self) -> usize {
        let calls = self.calls.lock();
        calls.balance + calls.recipients.len() + calls.transfers.len() + calls.bulk.len()
    }

    fn receipt(&self, instruction: &TransferInstruction, n: usize) -> TransferReceipt {
        let failed = self
            .script
            .lock()
            .failed_references
            .iter()
            .any(|prefix| instruction.reference.starts_with(prefix.as_str()));
        TransferReceipt {
            reference: instruction.reference.clone(),
            transfer_code: Some(format!("TRF_{}", n)),
            status: if failed { "failed" } else { "pending" }.to_string(),
        }
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn fetch_balances(&self) -> Result<Vec<ProviderBalance>, ProviderError> {
        self.calls.lock().balance += 1;
        let delay = self.script.lock().balance_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let script = self.script.lock();
        match &script.balance_error {
            Some(error) => Err(error.clone()),
            None => Ok(script.balances.clone()),
        }
    }

    async fn create_recipient(&self, request: &RecipientRequest) -> Result<String, ProviderError> {
        let n = {
            let mut calls = self.calls.lock();
            calls.recipients.push(request.clone());
            calls.recipients.len()
        };
        match &self.script.lock().recipient_error {
            Some(error) => Err(error.clone()),
            None => Ok(format!("RCP_{}", n)),
        }
    }

    async fn transfer(
        &self,
        _currency: &str,
        instruction: &TransferInstruction,
    ) -> Result<TransferReceipt, ProviderError> {
        let n = {
            let mut calls = self.calls.lock();
            calls.transfers.push(instruction.clone());
            calls.transfers.len()
        };
        if let Some(error) = self.script.lock().transfer_error.clone() {
            return Err(error);
        }
        Ok(self.receipt(instruction, n))
    }

    async fn bulk_transfer(
        &self,
        _currency: &str,
        instructions: &[TransferInstruction],
    ) -> Result<Vec<TransferReceipt>, ProviderError> {
        self.calls.lock().bulk.push(instructions.to_vec());
        if let Some(error) = self.script.lock().transfer_error.clone() {
            return Err(error);
        }
        Ok(instructions
            .iter()
            .enumerate()
            .map(|(i, instruction)| self.receipt(instruction, i + 1))
            .collect())
    }
}
