//! Transfer extraction: turns one block's receipts and state changes into
//! the ordered list of [`TransferDetail`]s attributable to an account.
//!
//! Ordering within a block is fixed: native actions by receipt order, then
//! token-event logs by log order, then gas rewards last.

pub mod ft;
pub mod gas_reward;
pub mod mt;
pub mod native;
pub mod plaintext;
pub mod staking;

use std::collections::HashMap;

use near_primitives::views::StateChangeWithCauseView;

use crate::amount::Amount;
use crate::history::TransferDetail;
use crate::rpc_client::BlockData;

/// Everything [`extract`] needs beyond the target block itself.
pub struct ExtractionContext<'a> {
    pub account: &'a str,
    pub block: &'a BlockData,
    /// Up to [`native::MAX_LOOKAHEAD_BLOCKS`] subsequent blocks, used to
    /// resolve a debit whose counterparty receipt executes later.
    pub lookahead: &'a [BlockData],
    pub state_changes: &'a [StateChangeWithCauseView],
    /// The account's native balance immediately before `block`, used as
    /// the gas-reward running-balance seed.
    pub opening_native_balance: Amount,
    /// Rewarded-receipt-id -> original signer, pre-resolved by the
    /// attributor since the state-change stream only carries receipt hashes.
    pub gas_reward_signers: &'a HashMap<String, String>,
}

/// Extract every transfer attributable to `ctx.account` in `ctx.block`,
/// in the fixed ordering: native, then token-event logs, then gas rewards.
pub fn extract(ctx: &ExtractionContext) -> Vec<TransferDetail> {
    let mut out = Vec::new();

    out.extend(native::extract(ctx.block, ctx.account, ctx.lookahead));
    out.extend(staking::extract(ctx.block, ctx.account));

    for chunk in &ctx.block.chunks {
        for entry in &chunk.receipts {
            let token_contract = entry.receipt.receiver_id.as_str();
            for log in &entry.logs {
                out.extend(ft::extract_from_log(log, token_contract, ctx.account));
                out.extend(mt::extract_from_log(log, ctx.account));
            }
        }
    }

    out.extend(gas_reward::extract(
        ctx.state_changes,
        ctx.account,
        ctx.opening_native_balance.clone(),
        ctx.gas_reward_signers,
    ));

    out
}
