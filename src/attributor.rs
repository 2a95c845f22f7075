//! Resolves `transaction_hashes` and `transaction_block` for a history
//! entry from its block's state-change stream.

use near_primitives::views::{StateChangeCauseView, StateChangeWithCauseView};

use crate::rpc_client::NearClient;

const MAX_TX_STATUS_RETRIES: u32 = 3;

#[derive(Debug, Clone, Default)]
pub struct Attribution {
    pub transaction_hashes: Vec<String>,
    pub transaction_block: Option<u64>,
}

/// Resolve transaction hashes and the earliest block any of them was
/// originally included in, for `account` at `block`. Exhausting the retry
/// budget leaves `transaction_block` `None` rather than failing the whole
/// enrichment pass — the entry gets revisited on a later run.
pub async fn attribute(
    client: &dyn NearClient,
    account: &str,
    changes: &[StateChangeWithCauseView],
) -> Attribution {
    let transaction_hashes = collect_tx_hashes(changes, account);

    let Some(first_hash) = transaction_hashes.first() else {
        return Attribution { transaction_hashes, transaction_block: None };
    };

    let transaction_block = resolve_transaction_block(client, first_hash, account).await;

    Attribution { transaction_hashes, transaction_block }
}

fn collect_tx_hashes(changes: &[StateChangeWithCauseView], account: &str) -> Vec<String> {
    let mut hashes = Vec::new();
    for change in changes {
        if !change_affects_account(change, account) {
            continue;
        }
        if let StateChangeCauseView::TransactionProcessing { tx_hash } = &change.cause {
            let hash = tx_hash.to_string();
            if !hashes.contains(&hash) {
                hashes.push(hash);
            }
        }
    }
    hashes
}

fn change_affects_account(change: &StateChangeWithCauseView, account: &str) -> bool {
    use near_primitives::views::StateChangeValueView;
    matches!(
        &change.value,
        StateChangeValueView::AccountUpdate { account_id, .. } if account_id.as_str() == account
    )
}

async fn resolve_transaction_block(
    client: &dyn NearClient,
    tx_hash: &str,
    account: &str,
) -> Option<u64> {
    for attempt in 0..MAX_TX_STATUS_RETRIES {
        match client.tx_status(tx_hash, account).await {
            Ok(blocks) => {
                if let Some(block) = blocks.submission_block {
                    return Some(block);
                }
                if let Some(earliest) = blocks.receipt_blocks.iter().min().copied() {
                    return Some(earliest);
                }
                return None;
            }
            Err(_) if attempt + 1 < MAX_TX_STATUS_RETRIES => continue,
            Err(_) => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::rpc_client::{BlockData, RpcCallError, TxStatusBlocks};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        calls: AtomicU32,
        fails_before_success: u32,
    }

    #[async_trait]
    impl NearClient for FlakyClient {
        async fn native_balance(&self, _a: &str, _b: u64) -> Result<Amount, RpcCallError> {
            unimplemented!()
        }
        async fn ft_balance(&self, _a: &str, _c: &str, _b: u64) -> Result<Amount, RpcCallError> {
            unimplemented!()
        }
        async fn mt_balance(&self, _a: &str, _c: &str, _t: &str, _b: u64) -> Result<Amount, RpcCallError> {
            unimplemented!()
        }
        async fn mt_positions(&self, _a: &str, _c: &str, _b: u64) -> Result<Vec<(String, Amount)>, RpcCallError> {
            unimplemented!()
        }
        async fn staking_balance(&self, _a: &str, _p: &str, _b: u64) -> Result<Amount, RpcCallError> {
            unimplemented!()
        }
        async fn account_exists(&self, _a: &str, _b: u64) -> Result<bool, RpcCallError> {
            unimplemented!()
        }
        async fn block_data(&self, _a: &str, _b: u64) -> Result<BlockData, RpcCallError> {
            unimplemented!()
        }
        async fn account_changes(
            &self,
            _a: &str,
            _b: u64,
        ) -> Result<Vec<StateChangeWithCauseView>, RpcCallError> {
            unimplemented!()
        }
        async fn tx_status(&self, _t: &str, _a: &str) -> Result<TxStatusBlocks, RpcCallError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fails_before_success {
                return Err(RpcCallError::Other("transient".into()));
            }
            Ok(TxStatusBlocks {
                submission_block: Some(100),
                receipt_blocks: vec![100, 101],
            })
        }
        async fn receipt_logs(&self, _r: &str, _a: &str) -> Result<Vec<String>, RpcCallError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn no_tx_hash_means_no_lookup() {
        let client = FlakyClient { calls: AtomicU32::new(0), fails_before_success: 0 };
        let attribution = attribute(&client, "alice.near", &[]).await;
        assert!(attribution.transaction_hashes.is_empty());
        assert!(attribution.transaction_block.is_none());
    }

    #[tokio::test]
    async fn retries_until_budget_exhausted() {
        let client = FlakyClient { calls: AtomicU32::new(0), fails_before_success: 10 };
        let resolved = resolve_transaction_block(&client, "Hb3w...", "alice.near").await;
        assert!(resolved.is_none());
        assert_eq!(client.calls.load(Ordering::SeqCst), MAX_TX_STATUS_RETRIES);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let client = FlakyClient { calls: AtomicU32::new(0), fails_before_success: 1 };
        let resolved = resolve_transaction_block(&client, "Hb3w...", "alice.near").await;
        assert_eq!(resolved, Some(100));
    }
}
