//! NEAR Intents (NEP-245) multi-token balance reads at a given block height.

use crate::amount::Amount;
use crate::asset::AssetId;
use crate::error::SnapshotError;
use crate::rpc_client::{NearClient, RpcCallError};

pub async fn read_intents(
    client: &dyn NearClient,
    account: &str,
    asset: &AssetId,
    block: u64,
) -> Result<Amount, SnapshotError> {
    let AssetId::MultiToken {
        contract_id, sub_id, ..
    } = asset
    else {
        return Err(SnapshotError::Rpc(
            "intents_balance",
            format!("{asset} is not a multi-token asset"),
        ));
    };
    let token_id = sub_id.clone().unwrap_or_default();

    client
        .mt_balance(account, contract_id, &token_id, block)
        .await
        .map_err(|e| match e {
            RpcCallError::MissingBlock(b) => SnapshotError::MissingBlock(b),
            RpcCallError::AccountAbsent => SnapshotError::AccountAbsent {
                account: account.to_string(),
                block,
            },
            RpcCallError::Other(msg) => SnapshotError::Rpc("intents_balance", msg),
        })
}

/// Discover every multi-token position the account holds at `block` (used
/// by the history reconciler's initial-discovery phase).
pub async fn discover_positions(
    client: &dyn NearClient,
    account: &str,
    contract: &str,
    block: u64,
) -> Result<Vec<(AssetId, Amount)>, SnapshotError> {
    let positions = client
        .mt_positions(account, contract, block)
        .await
        .map_err(|e| match e {
            RpcCallError::MissingBlock(b) => SnapshotError::MissingBlock(b),
            RpcCallError::AccountAbsent => SnapshotError::AccountAbsent {
                account: account.to_string(),
                block,
            },
            RpcCallError::Other(msg) => SnapshotError::Rpc("intents_positions", msg),
        })?;

    Ok(positions
        .into_iter()
        .map(|(token_id, amount)| {
            let asset = match token_id.split_once(':') {
                Some(("nep141", inner)) => AssetId::mt_nep141(inner),
                Some(("nep245", inner)) => AssetId::mt_nep245(contract, inner),
                _ => AssetId::mt_nep141(token_id),
            };
            (asset, amount)
        })
        .collect())
}
