use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::models::PayeeGroup;
use crate::ledger::models::Earning;

/// Group earnings by payee, summing amounts exactly.
///
/// Groups come out ordered by payee id; earnings keep their input order.
pub fn group_by_payee(earnings: Vec<Earning>) -> Vec<PayeeGroup> {
    let mut groups: BTreeMap<uuid::Uuid, PayeeGroup> = BTreeMap::new();

    for earning in earnings {
        let group = groups.entry(earning.payee_id).or_insert_with(|| PayeeGroup {
            payee_id: earning.payee_id,
            total: Decimal::ZERO,
            earnings: Vec::new(),
        });
        group.total += earning.amount;
        group.earnings.push(earning);
    }

    groups.into_values().collect()
}
