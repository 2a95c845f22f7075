//! Native NEAR balance reads at a given block height.

use crate::amount::Amount;
use crate::error::SnapshotError;
use crate::rpc_client::{NearClient, RpcCallError};

pub async fn read_native(
    client: &dyn NearClient,
    account: &str,
    block: u64,
) -> Result<Amount, SnapshotError> {
    client.native_balance(account, block).await.map_err(|e| match e {
        RpcCallError::MissingBlock(b) => SnapshotError::MissingBlock(b),
        RpcCallError::AccountAbsent => SnapshotError::AccountAbsent {
            account: account.to_string(),
            block,
        },
        RpcCallError::Other(msg) => SnapshotError::Rpc("near_balance", msg),
    })
}
