//! NEP-141 fungible token balance reads at a given block height.

use crate::amount::Amount;
use crate::error::SnapshotError;
use crate::rpc_client::{NearClient, RpcCallError};

pub async fn read_ft(
    client: &dyn NearClient,
    account: &str,
    contract: &str,
    block: u64,
) -> Result<Amount, SnapshotError> {
    client
        .ft_balance(account, contract, block)
        .await
        .map_err(|e| match e {
            RpcCallError::MissingBlock(b) => SnapshotError::MissingBlock(b),
            RpcCallError::AccountAbsent => SnapshotError::AccountAbsent {
                account: account.to_string(),
                block,
            },
            RpcCallError::Other(msg) => SnapshotError::Rpc("ft_balance", msg),
        })
}
