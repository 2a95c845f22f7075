//! Gas-reward credit extraction from an account's state-change stream.
//!
//! Contract-hosted accounts can see a net balance increase with no visible
//! transfer: the protocol refunds 30% of a receipt's burnt gas to the
//! account that originally signed it. The authoritative amount is the
//! state-change delta itself, not the reconstructed 30% figure — gas
//! prices and exact burn accounting can shift the real number slightly.

use std::collections::HashMap;

use near_primitives::views::{StateChangeCauseView, StateChangeValueView, StateChangeWithCauseView};

use crate::amount::Amount;
use crate::history::{Direction, TransferDetail, TransferType};

/// Walk `changes` (in the order the RPC returned them) for `account`,
/// tracking the running balance starting from `opening_balance`, and emit
/// one transfer per `ActionReceiptGasReward` cause. `signers` maps a
/// rewarded receipt's id to the account that originally signed it — the
/// attributor resolves this ahead of time since the state-change stream
/// itself only carries the receipt hash.
pub fn extract(
    changes: &[StateChangeWithCauseView],
    account: &str,
    opening_balance: Amount,
    signers: &HashMap<String, String>,
) -> Vec<TransferDetail> {
    let mut out = Vec::new();
    let mut running = opening_balance;

    for change in changes {
        let StateChangeValueView::AccountUpdate { account_id, account: acc } = &change.value else {
            continue;
        };
        if account_id.as_str() != account {
            continue;
        }
        let new_balance = Amount::from(acc.amount.as_yoctonear());

        if let StateChangeCauseView::ActionReceiptGasReward { receipt_hash } = &change.cause {
            let delta = new_balance.diff(&running);
            if !delta.is_zero() {
                let receipt_id = receipt_hash.to_string();
                let counterparty = signers
                    .get(&receipt_id)
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string());
                out.push(TransferDetail {
                    kind: TransferType::ActionReceiptGasReward,
                    direction: Direction::In,
                    amount: delta.abs(),
                    counterparty,
                    token_id: None,
                    memo: None,
                    tx_hash: None,
                    receipt_id: Some(receipt_id),
                });
            }
        }

        running = new_balance;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_reward_when_no_gas_reward_cause() {
        let out = extract(&[], "alice.near", "100".parse().unwrap(), &HashMap::new());
        assert!(out.is_empty());
    }
}
