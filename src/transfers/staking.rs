//! Synthetic native transfers for delegated-staking method calls.
//!
//! A `deposit_and_stake`/`stake` call carries its own attached deposit,
//! which the generic native-transfer scan in [`super::native`] never sees
//! (it only looks at `Transfer` actions, not `FunctionCall` deposits). The
//! withdrawal side needs no synthetic entry: `withdraw`/`withdraw_all`
//! attach no deposit of their own — the pool's actual `Transfer` action
//! back to the account is what carries the amount, and that's already
//! picked up by the native scan.

use near_primitives::views::{ActionView, ReceiptEnumView, ReceiptView};

use crate::amount::Amount;
use crate::balance::is_staking_pool;
use crate::history::{Direction, TransferDetail, TransferType};
use crate::rpc_client::BlockData;

const STAKING_METHODS: &[&str] = &[
    "deposit_and_stake",
    "stake",
    "unstake",
    "unstake_all",
    "withdraw",
    "withdraw_all",
];

pub fn extract(block: &BlockData, account: &str) -> Vec<TransferDetail> {
    let mut out = Vec::new();
    for chunk in &block.chunks {
        for entry in &chunk.receipts {
            out.extend(extract_from_receipt(&entry.receipt, account));
        }
    }
    out
}

fn extract_from_receipt(receipt: &ReceiptView, account: &str) -> Vec<TransferDetail> {
    if receipt.predecessor_id.as_str() != account || !is_staking_pool(receipt.receiver_id.as_str()) {
        return Vec::new();
    }
    let ReceiptEnumView::Action { actions, .. } = &receipt.receipt else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for action in actions {
        let ActionView::FunctionCall { method_name, deposit, .. } = action else {
            continue;
        };
        if !STAKING_METHODS.contains(&method_name.as_str()) {
            continue;
        }
        let amount = Amount::from(*deposit);
        if amount.is_zero() {
            continue;
        }
        out.push(TransferDetail {
            kind: TransferType::Native,
            direction: Direction::Out,
            amount,
            counterparty: receipt.receiver_id.to_string(),
            token_id: None,
            memo: Some(method_name.clone()),
            tx_hash: None,
            receipt_id: Some(receipt.receipt_id.to_string()),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staking_methods_list_matches_grammar() {
        assert!(STAKING_METHODS.contains(&"deposit_and_stake"));
        assert!(STAKING_METHODS.contains(&"withdraw_all"));
    }
}
