//! Native NEAR transfer extraction from a block's receipts.
//!
//! A `Transfer` action's receipt executes in the block *after* the one
//! where the originating transaction's outgoing receipt is created. When
//! the debiting side is visible in block *h* but its counterparty's action
//! isn't, the caller supplies up to three subsequent blocks so the
//! counterparty and memo can still be attributed to the *h* entry.

use near_primitives::views::{ActionView, ReceiptEnumView, ReceiptView};

use crate::amount::Amount;
use crate::history::{Direction, TransferDetail, TransferType};
use crate::rpc_client::BlockData;

pub const MAX_LOOKAHEAD_BLOCKS: usize = 3;

/// Extract every native `Transfer` action in `block` whose receipt touches
/// `account`, in receipt order. `lookahead` supplies up to
/// [`MAX_LOOKAHEAD_BLOCKS`] subsequent blocks so a debit visible here but
/// whose counterparty receipt executes later can still be attributed.
pub fn extract(block: &BlockData, account: &str, lookahead: &[BlockData]) -> Vec<TransferDetail> {
    let mut out = Vec::new();
    for chunk in &block.chunks {
        for entry in &chunk.receipts {
            out.extend(extract_from_receipt(&entry.receipt, account, lookahead));
        }
    }
    out
}

fn extract_from_receipt(
    receipt: &ReceiptView,
    account: &str,
    lookahead: &[BlockData],
) -> Vec<TransferDetail> {
    let ReceiptEnumView::Action { actions, .. } = &receipt.receipt else {
        return Vec::new();
    };

    let predecessor = receipt.predecessor_id.as_str();
    let receiver = receipt.receiver_id.as_str();
    if predecessor != account && receiver != account {
        return Vec::new();
    }

    let mut out = Vec::new();
    for action in actions {
        let ActionView::Transfer { deposit } = action else {
            continue;
        };
        let amount = Amount::from(*deposit);
        if amount.is_zero() {
            continue;
        }

        let (direction, counterparty) = if receiver == account {
            (Direction::In, predecessor.to_string())
        } else {
            (Direction::Out, receiver.to_string())
        };

        let counterparty = resolve_counterparty(&counterparty, receiver, account, lookahead);

        out.push(TransferDetail {
            kind: TransferType::Native,
            direction,
            amount,
            counterparty,
            token_id: None,
            memo: None,
            tx_hash: None,
            receipt_id: Some(receipt.receipt_id.to_string()),
        });
    }
    out
}

/// When the local receipt's counterparty is itself a relay (a receipt
/// forwarding the deposit onward), walk forward through `lookahead` to find
/// where that receipt actually executes and report the true counterparty.
fn resolve_counterparty(
    counterparty: &str,
    receiver: &str,
    account: &str,
    lookahead: &[BlockData],
) -> String {
    if receiver == account {
        return counterparty.to_string();
    }
    for block in lookahead.iter().take(MAX_LOOKAHEAD_BLOCKS) {
        for chunk in &block.chunks {
            for entry in &chunk.receipts {
                if entry.receipt.predecessor_id.as_str() == receiver {
                    return entry.receipt.receiver_id.to_string();
                }
            }
        }
    }
    counterparty.to_string()
}
