//! In-memory ledger used by the engine and router tests.

use super::{models::*, ClaimScope, PayoutLedger};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Default)]
struct State {
    earnings: Vec<Earning>,
    claimed_at: HashMap<Uuid, DateTime<Utc>>,
    payees: HashMap<Uuid, Payee>,
    payouts: Vec<Payout>,
    payout_earnings: HashMap<Uuid, Uuid>,
    notifications: Vec<NewNotification>,
    bookings: HashMap<Uuid, String>,
    payments: HashMap<String, (Uuid, Decimal)>,
    fail_settle_for: HashSet<Uuid>,
    fail_next_recipient_write: bool,
    recipient_writes: usize,
    writes: usize,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_payee(&self, payee: Payee) {
        self.state.lock().payees.insert(payee.id, payee);
    }

    pub fn add_earning(&self, payee_id: Uuid, amount: Decimal, status: EarningStatus) -> Uuid {
        let mut state = self.state.lock();
        let id = Uuid::new_v4();
        // Spread creation times so ordering is deterministic
        let created_at = Utc::now() + Duration::milliseconds(state.earnings.len() as i64);
        state.earnings.push(Earning {
            id,
            payee_id,
            booking_id: None,
            amount,
            status,
            payout_run_id: None,
            payout_reference: None,
            created_at,
            paid_at: None,
        });
        id
    }

    pub fn add_booking(&self, booking_id: Uuid, status: &str) {
        self.state.lock().bookings.insert(booking_id, status.to_string());
    }

    /// Make `settle` fail for this payee, as a lost database connection would
    pub fn fail_settlement_for(&self, payee_id: Uuid) {
        self.state.lock().fail_settle_for.insert(payee_id);
    }

    /// Make the next `store_recipient_code` call fail
    pub fn fail_next_recipient_write(&self) {
        self.state.lock().fail_next_recipient_write = true;
    }

    /// Pretend a claim was taken a while ago
    pub fn backdate_claims(&self, run_id: Uuid, by: Duration) {
        let mut state = self.state.lock();
        let ids: Vec<Uuid> = state
            .earnings
            .iter()
            .filter(|e| e.payout_run_id == Some(run_id))
            .map(|e| e.id)
            .collect();
        for id in ids {
            if let Some(at) = state.claimed_at.get_mut(&id) {
                *at = *at - by;
            }
        }
    }

    pub fn earning(&self, id: Uuid) -> Option<Earning> {
        self.state.lock().earnings.iter().find(|e| e.id == id).cloned()
    }

    pub fn payouts(&self) -> Vec<Payout> {
        self.state.lock().payouts.clone()
    }

    pub fn notifications(&self) -> Vec<NewNotification> {
        self.state.lock().notifications.clone()
    }

    pub fn payee(&self, id: Uuid) -> Option<Payee> {
        self.state.lock().payees.get(&id).cloned()
    }

    pub fn booking_status(&self, id: Uuid) -> Option<String> {
        self.state.lock().bookings.get(&id).cloned()
    }

    pub fn payment_count(&self) -> usize {
        self.state.lock().payments.len()
    }

    pub fn recipient_writes(&self) -> usize {
        self.state.lock().recipient_writes
    }

    /// Number of mutating calls that changed something
    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }
}

#[async_trait]
impl PayoutLedger for MemoryLedger {
    async fn released_earnings(&self, payee_id: Option<Uuid>) -> AppResult<Vec<Earning>> {
        let state = self.state.lock();
        let mut earnings: Vec<Earning> = state
            .earnings
            .iter()
            .filter(|e| e.status == EarningStatus::Released)
            .filter(|e| payee_id.map_or(true, |p| e.payee_id == p))
            .cloned()
            .collect();
        earnings.sort_by_key(|e| e.created_at);
        Ok(earnings)
    }

    async fn claim_released(&self, run_id: Uuid, scope: ClaimScope<'_>) -> AppResult<Vec<Earning>> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let mut claimed = Vec::new();

        for earning in state.earnings.iter_mut() {
            if earning.status != EarningStatus::Released {
                continue;
            }
            let in_scope = match scope {
                ClaimScope::AllReleased => true,
                ClaimScope::Earnings { payee_id, earning_ids } => {
                    earning.payee_id == payee_id && earning_ids.contains(&earning.id)
                }
            };
            if in_scope {
                earning.status = EarningStatus::Processing;
                earning.payout_run_id = Some(run_id);
                claimed.push(earning.clone());
            }
        }

        for earning in &claimed {
            state.claimed_at.insert(earning.id, now);
        }
        if !claimed.is_empty() {
            state.writes += 1;
        }
        claimed.sort_by_key(|e| e.created_at);
        Ok(claimed)
    }

    async fn release_claims(&self, run_id: Uuid, earning_ids: Option<&[Uuid]>) -> AppResult<u64> {
        let mut state = self.state.lock();
        let mut released = Vec::new();

        for earning in state.earnings.iter_mut() {
            let selected = earning_ids.map_or(true, |ids| ids.contains(&earning.id));
            if earning.status == EarningStatus::Processing
                && earning.payout_run_id == Some(run_id)
                && selected
            {
                earning.status = EarningStatus::Released;
                earning.payout_run_id = None;
                released.push(earning.id);
            }
        }

        for id in &released {
            state.claimed_at.remove(id);
        }
        if !released.is_empty() {
            state.writes += 1;
        }
        Ok(released.len() as u64)
    }

    async fn get_payee(&self, payee_id: Uuid) -> AppResult<Option<Payee>> {
        Ok(self.state.lock().payees.get(&payee_id).cloned())
    }

    async fn get_payees(&self, payee_ids: &[Uuid]) -> AppResult<Vec<Payee>> {
        let state = self.state.lock();
        let mut payees: Vec<Payee> = payee_ids
            .iter()
            .filter_map(|id| state.payees.get(id).cloned())
            .collect();
        payees.sort_by_key(|p| p.id);
        Ok(payees)
    }

    async fn store_recipient_code(&self, payee_id: Uuid, code: &str) -> AppResult<String> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_recipient_write) {
            return Err(AppError::Internal("connection reset".to_string()));
        }
        let payee = state
            .payees
            .get_mut(&payee_id)
            .ok_or_else(|| AppError::NotFound(format!("payee {}", payee_id)))?;

        if let Some(existing) = payee.recipient_code.clone() {
            return Ok(existing);
        }
        payee.recipient_code = Some(code.to_string());
        state.recipient_writes += 1;
        state.writes += 1;
        Ok(code.to_string())
    }

    async fn settle(&self, payout: NewPayout, notification: NewNotification) -> AppResult<Payout> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.fail_settle_for.contains(&payout.payee_id) {
            return Err(AppError::Internal("connection reset".to_string()));
        }

        let claimed = state
            .earnings
            .iter()
            .filter(|e| {
                payout.earnings_ids.contains(&e.id)
                    && e.status == EarningStatus::Processing
                    && e.payout_run_id == Some(payout.run_id)
            })
            .count();
        if claimed != payout.earnings_ids.len() {
            return Err(AppError::Internal(format!(
                "Payout {} covers {} earnings but only {} were still claimed",
                payout.reference,
                payout.earnings_ids.len(),
                claimed
            )));
        }
        if payout
            .earnings_ids
            .iter()
            .any(|id| state.payout_earnings.contains_key(id))
        {
            return Err(AppError::Internal("earning already linked to a payout".to_string()));
        }

        let record = Payout {
            id: Uuid::new_v4(),
            payee_id: payout.payee_id,
            run_id: payout.run_id,
            amount: payout.amount,
            reference: payout.reference.clone(),
            transfer_code: payout.transfer_code.clone(),
            status: PayoutStatus::Pending,
            earnings_ids: payout.earnings_ids.clone(),
            payout_method: payout.payout_method,
            payout_details: payout.payout_details.clone(),
            created_at: Utc::now(),
        };

        let now = Utc::now();
        for earning in state.earnings.iter_mut() {
            if payout.earnings_ids.contains(&earning.id) {
                earning.status = EarningStatus::Paid;
                earning.paid_at = Some(now);
                earning.payout_reference = Some(payout.reference.clone());
            }
        }
        for id in &payout.earnings_ids {
            state.claimed_at.remove(id);
            state.payout_earnings.insert(*id, record.id);
        }
        state.payouts.push(record.clone());
        state.notifications.push(notification);
        state.writes += 1;

        Ok(record)
    }

    async fn payout_history(
        &self,
        status: Option<PayoutStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<PayoutPage> {
        let state = self.state.lock();
        let mut matching: Vec<&Payout> = state
            .payouts
            .iter()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let payouts = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|p| {
                let payee = state.payees.get(&p.payee_id);
                PayoutWithPayee {
                    id: p.id,
                    payee_id: p.payee_id,
                    amount: p.amount,
                    reference: p.reference.clone(),
                    transfer_code: p.transfer_code.clone(),
                    status: p.status,
                    earnings_ids: p.earnings_ids.clone(),
                    payout_method: p.payout_method,
                    payout_details: p.payout_details.clone(),
                    created_at: p.created_at,
                    teacher_name: payee.map(|t| t.full_name.clone()),
                    teacher_avatar_url: payee.and_then(|t| t.avatar_url.clone()),
                }
            })
            .collect();

        Ok(PayoutPage { payouts, total })
    }

    async fn payout_summary(&self) -> AppResult<PayoutSummary> {
        let state = self.state.lock();
        let count = |s: PayoutStatus| state.payouts.iter().filter(|p| p.status == s).count() as i64;
        Ok(PayoutSummary {
            total_payouts: state.payouts.len() as i64,
            total_amount: state.payouts.iter().map(|p| p.amount).sum(),
            pending: count(PayoutStatus::Pending),
            success: count(PayoutStatus::Success),
            failed: count(PayoutStatus::Failed),
        })
    }

    async fn stale_claims(&self, claimed_before: DateTime<Utc>) -> AppResult<Vec<StaleClaim>> {
        let state = self.state.lock();
        let mut grouped: HashMap<(Uuid, Uuid), StaleClaim> = HashMap::new();

        for earning in &state.earnings {
            let (Some(run_id), Some(claimed_at)) =
                (earning.payout_run_id, state.claimed_at.get(&earning.id))
            else {
                continue;
            };
            if earning.status != EarningStatus::Processing || *claimed_at >= claimed_before {
                continue;
            }
            let entry = grouped
                .entry((run_id, earning.payee_id))
                .or_insert_with(|| StaleClaim {
                    run_id,
                    payee_id: earning.payee_id,
                    earnings_count: 0,
                    amount: Decimal::ZERO,
                    claimed_at: *claimed_at,
                });
            entry.earnings_count += 1;
            entry.amount += earning.amount;
            entry.claimed_at = entry.claimed_at.min(*claimed_at);
        }

        let mut claims: Vec<StaleClaim> = grouped.into_values().collect();
        claims.sort_by_key(|c| c.claimed_at);
        Ok(claims)
    }

    async fn apply_transfer_update(&self, update: &TransferStatusUpdate) -> AppResult<bool> {
        let mut state = self.state.lock();
        let Some(payout) = state
            .payouts
            .iter_mut()
            .find(|p| p.reference == update.reference)
        else {
            return Ok(false);
        };

        payout.status = update.status;
        if update.transfer_code.is_some() {
            payout.transfer_code = update.transfer_code.clone();
        }
        state.writes += 1;
        Ok(true)
    }

    async fn apply_charge_event(&self, event: &ChargeEvent) -> AppResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match event {
            ChargeEvent::Succeeded {
                booking_id,
                reference,
                amount,
                ..
            } => {
                let Some(status) = state.bookings.get_mut(booking_id) else {
                    return Ok(());
                };
                *status = "confirmed".to_string();
                state.payments.insert(reference.clone(), (*booking_id, *amount));
                state.writes += 1;
            }
            ChargeEvent::Failed { booking_id } => {
                if let Some(status) = state.bookings.get_mut(booking_id) {
                    if status.as_str() != "confirmed" {
                        *status = "payment_failed".to_string();
                        state.writes += 1;
                    }
                }
            }
        }
        Ok(())
    }
}
