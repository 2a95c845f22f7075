//! Delegated staking pool balance reads: pool-pattern detection, epoch
//! arithmetic, and the `get_account_total_balance` view call.

use std::str::FromStr;

use near_account_id::AccountId;

use crate::amount::Amount;
use crate::error::SnapshotError;
use crate::rpc_client::{NearClient, RpcCallError};

const POOLV1_NEAR: &str = "poolv1.near";
const POOL_NEAR: &str = "pool.near";
const POOLV2_NEAR: &str = "poolv2.near";

/// True if `account_id` is a direct subaccount of one of the recognized
/// staking-pool parent accounts.
pub fn is_staking_pool(account_id: &str) -> bool {
    let Ok(account) = AccountId::from_str(account_id) else {
        return false;
    };
    [POOLV1_NEAR, POOL_NEAR, POOLV2_NEAR].iter().any(|parent| {
        AccountId::from_str(parent)
            .map(|p| account.is_sub_account_of(&p))
            .unwrap_or(false)
    })
}

pub async fn read_staking(
    client: &dyn NearClient,
    account: &str,
    pool: &str,
    block: u64,
) -> Result<Amount, SnapshotError> {
    client
        .staking_balance(account, pool, block)
        .await
        .map_err(|e| match e {
            RpcCallError::MissingBlock(b) => SnapshotError::MissingBlock(b),
            RpcCallError::AccountAbsent => SnapshotError::AccountAbsent {
                account: account.to_string(),
                block,
            },
            RpcCallError::Other(msg) => SnapshotError::Rpc("staking_balance", msg),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_pool_patterns() {
        assert!(is_staking_pool("aurora.poolv1.near"));
        assert!(is_staking_pool("meta-pool.pool.near"));
        assert!(is_staking_pool("some-validator.poolv2.near"));
        assert!(!is_staking_pool("wrap.near"));
        assert!(!is_staking_pool("pool.near"));
        assert!(!is_staking_pool("poolv1.near"));
    }
}
