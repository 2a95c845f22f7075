//! Delegated staking pool discovery, active-range computation, and reward
//! enumeration at epoch boundaries.

use std::collections::BTreeSet;

use crate::amount::Amount;
use crate::balance::is_staking_pool;
use crate::change::{AssetDelta, BalanceChange};
use crate::error::SnapshotError;
use crate::history::{Direction, History, TransactionEntry, TransferDetail, TransferType};
use crate::rpc_client::{NearClient, RpcCallError};
use crate::snapshot::Snapshot;

fn map_rpc_err(e: RpcCallError, account: &str, block: u64) -> SnapshotError {
    match e {
        RpcCallError::MissingBlock(b) => SnapshotError::MissingBlock(b),
        RpcCallError::AccountAbsent => SnapshotError::AccountAbsent {
            account: account.to_string(),
            block,
        },
        RpcCallError::Other(msg) => SnapshotError::Rpc("staking_balance", msg),
    }
}

/// Scan every transfer in `history` for a staking-pool counterparty,
/// accumulating the set of pools the account has ever interacted with.
/// `transfers/staking.rs::extract_from_receipt` only ever synthesises a
/// staking-method transfer once its own `is_staking_pool` guard has already
/// passed, so there is no transfer here whose counterparty carries a
/// staking-method memo without already being a recognised pool.
pub fn discover_pools(history: &History) -> BTreeSet<String> {
    let mut pools = BTreeSet::new();
    for entry in &history.transactions {
        let Some(transfers) = &entry.transfers else { continue };
        for transfer in transfers {
            if is_staking_pool(&transfer.counterparty) {
                pools.insert(transfer.counterparty.clone());
            }
        }
    }
    pools
}

/// Floor `block` to the start of its epoch.
pub fn epoch_start(block: u64, epoch_length: u64) -> u64 {
    (block / epoch_length) * epoch_length
}

/// Compute `[first_deposit_block, last_active_block]` for `pool` from the
/// transfers already recorded in `history`. `last_active_block` is the
/// last-withdrawal block if a balance probe shortly after shows the pool
/// fully unstaked, otherwise the latest history block.
pub async fn active_range(
    client: &dyn NearClient,
    account: &str,
    history: &History,
    pool: &str,
) -> Result<Option<(u64, u64)>, SnapshotError> {
    let mut first_deposit = None;
    let mut last_withdrawal = None;

    for entry in &history.transactions {
        let Some(transfers) = &entry.transfers else { continue };
        for transfer in transfers {
            if transfer.counterparty != pool {
                continue;
            }
            match transfer.memo.as_deref() {
                Some("deposit_and_stake") | Some("stake") => {
                    first_deposit.get_or_insert(entry.block);
                }
                Some("withdraw") | Some("withdraw_all") => {
                    last_withdrawal = Some(entry.block);
                }
                _ => {}
            }
        }
    }

    let Some(first_deposit) = first_deposit else { return Ok(None) };
    let Some(last_block) = history.metadata.last_block else { return Ok(None) };

    if let Some(withdrawal_block) = last_withdrawal {
        let probe_block = withdrawal_block + 1;
        let balance = client
            .staking_balance(account, pool, probe_block)
            .await
            .map_err(|e| map_rpc_err(e, account, probe_block))?;
        if balance.is_zero() {
            return Ok(Some((first_deposit, withdrawal_block)));
        }
    }

    Ok(Some((first_deposit, last_block)))
}

/// Step through `[range.0, range.1]` by `epoch_length`, querying the pool
/// balance at each boundary and synthesising a `staking_reward` entry
/// wherever the balance moved without a matching deposit/withdrawal
/// already recorded at that block.
pub async fn enumerate_rewards(
    client: &dyn NearClient,
    account: &str,
    pool: &str,
    range: (u64, u64),
    epoch_length: u64,
    known_blocks: &BTreeSet<u64>,
) -> Result<Vec<TransactionEntry>, SnapshotError> {
    let (lo, hi) = range;
    let mut boundaries = Vec::new();
    let mut boundary = epoch_start(lo, epoch_length);
    while boundary < hi {
        boundaries.push(boundary);
        boundary += epoch_length;
    }
    boundaries.push(hi);
    boundaries.dedup();

    let mut rewards = Vec::new();
    let mut previous_balance: Option<Amount> = None;

    for &b in &boundaries {
        let balance = match client.staking_balance(account, pool, b).await {
            Ok(balance) => balance,
            Err(_) => continue,
        };

        if let Some(prev) = &previous_balance {
            let diff = balance.diff(prev);
            if !diff.is_zero() && !known_blocks.contains(&b) {
                rewards.push(synthesize_reward_entry(pool, b, prev.clone(), balance.clone(), diff));
            }
        }
        previous_balance = Some(balance);
    }

    Ok(rewards)
}

fn synthesize_reward_entry(
    pool: &str,
    block: u64,
    start: Amount,
    end: Amount,
    diff: Amount,
) -> TransactionEntry {
    let direction = if diff.is_negative() { Direction::Out } else { Direction::In };
    let amount = diff.abs();

    let mut before = Snapshot::new();
    before.staking_pools.insert(pool.to_string(), start.clone());
    let mut after = Snapshot::new();
    after.staking_pools.insert(pool.to_string(), end.clone());

    let mut changes = BalanceChange::default();
    changes.staking_changed.insert(pool.to_string(), AssetDelta { start, end, diff });

    TransactionEntry {
        block,
        transaction_block: None,
        timestamp: None,
        transaction_hashes: Vec::new(),
        transfers: Some(vec![TransferDetail {
            kind: TransferType::StakingReward,
            direction,
            amount,
            counterparty: pool.to_string(),
            token_id: None,
            memo: Some("staking_reward".to_string()),
            tx_hash: None,
            receipt_id: None,
        }]),
        balance_before: before,
        balance_after: after,
        changes,
        verification_with_previous: None,
        verification_with_next: None,
    }
}

/// Augment `entry` with `balance_before.staking_pools[pool]` queried at
/// `entry.block` and `balance_after.staking_pools[pool]` queried at
/// `entry.block + 1` — the pool's own receipt executes one block later
/// than the deducting transaction.
pub async fn enrich_entry(
    entry: &mut TransactionEntry,
    client: &dyn NearClient,
    account: &str,
    pool: &str,
) -> Result<(), SnapshotError> {
    let before = client
        .staking_balance(account, pool, entry.block)
        .await
        .map_err(|e| map_rpc_err(e, account, entry.block))?;
    let after = client
        .staking_balance(account, pool, entry.block + 1)
        .await
        .map_err(|e| map_rpc_err(e, account, entry.block + 1))?;

    entry.balance_before.staking_pools.insert(pool.to_string(), before);
    entry.balance_after.staking_pools.insert(pool.to_string(), after);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_start_floors_to_boundary() {
        assert_eq!(epoch_start(43_199, 43_200), 0);
        assert_eq!(epoch_start(43_200, 43_200), 43_200);
        assert_eq!(epoch_start(86_399, 43_200), 43_200);
    }

    #[test]
    fn discover_pools_finds_staking_counterparties() {
        let mut history = History::new("alice.near", chrono::DateTime::from_timestamp(0, 0).unwrap());
        let mut entry = synthesize_reward_entry(
            "aurora.poolv1.near",
            100,
            Amount::zero(),
            "5".parse().unwrap(),
            "5".parse().unwrap(),
        );
        entry.transfers.as_mut().unwrap()[0].memo = Some("deposit_and_stake".to_string());
        history.insert(entry);

        let pools = discover_pools(&history);
        assert!(pools.contains("aurora.poolv1.near"));
    }
}
