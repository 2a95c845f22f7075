//! A deterministic in-memory `NearClient` double for scenario tests, so
//! these exercise the real search/snapshot/reconciler code paths without
//! an archival RPC endpoint.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use ledger_reconciler::rpc_client::{BlockData, ChunkData, RpcCallError, TxStatusBlocks};
use ledger_reconciler::Amount;
use near_primitives::views::StateChangeWithCauseView;

/// Per-block balances for one asset dimension, keyed by block height. A
/// lookup at a block not present in the map returns the nearest entry at
/// or below it, the same "last known value persists" semantics a real
/// account has.
#[derive(Default)]
struct TimeSeries {
    native: BTreeMap<u64, Amount>,
    ft: BTreeMap<(String, u64), Amount>,
    staking: BTreeMap<(String, u64), Amount>,
    intents: BTreeMap<(String, u64), Amount>,
    missing_blocks: Vec<u64>,
}

pub struct FakeClient {
    series: Mutex<TimeSeries>,
}

impl FakeClient {
    pub fn new() -> Self {
        FakeClient {
            series: Mutex::new(TimeSeries::default()),
        }
    }

    pub fn set_native(&self, block: u64, amount: &str) {
        self.series
            .lock()
            .unwrap()
            .native
            .insert(block, amount.parse().unwrap());
    }

    pub fn set_ft(&self, contract: &str, block: u64, amount: &str) {
        self.series
            .lock()
            .unwrap()
            .ft
            .insert((contract.to_string(), block), amount.parse().unwrap());
    }

    pub fn set_staking(&self, pool: &str, block: u64, amount: &str) {
        self.series
            .lock()
            .unwrap()
            .staking
            .insert((pool.to_string(), block), amount.parse().unwrap());
    }

    pub fn set_intents(&self, asset_key: &str, block: u64, amount: &str) {
        self.series
            .lock()
            .unwrap()
            .intents
            .insert((asset_key.to_string(), block), amount.parse().unwrap());
    }

    pub fn mark_missing(&self, block: u64) {
        self.series.lock().unwrap().missing_blocks.push(block);
    }

    fn check_missing(&self, block: u64) -> Result<(), RpcCallError> {
        if self.series.lock().unwrap().missing_blocks.contains(&block) {
            return Err(RpcCallError::MissingBlock(block));
        }
        Ok(())
    }
}

fn last_at_or_before<V: Clone>(map: &BTreeMap<u64, V>, block: u64) -> Option<V> {
    map.range(..=block).next_back().map(|(_, v)| v.clone())
}

fn last_at_or_before_keyed<V: Clone>(map: &BTreeMap<(String, u64), V>, key: &str, block: u64) -> Option<V> {
    map.range((key.to_string(), 0)..=(key.to_string(), block))
        .next_back()
        .map(|(_, v)| v.clone())
}

#[async_trait]
impl ledger_reconciler::NearClient for FakeClient {
    async fn native_balance(&self, _account: &str, block: u64) -> Result<Amount, RpcCallError> {
        self.check_missing(block)?;
        Ok(last_at_or_before(&self.series.lock().unwrap().native, block).unwrap_or_else(Amount::zero))
    }

    async fn ft_balance(&self, _account: &str, contract: &str, block: u64) -> Result<Amount, RpcCallError> {
        self.check_missing(block)?;
        Ok(last_at_or_before_keyed(&self.series.lock().unwrap().ft, contract, block).unwrap_or_else(Amount::zero))
    }

    async fn mt_balance(&self, _account: &str, contract: &str, token_id: &str, block: u64) -> Result<Amount, RpcCallError> {
        self.check_missing(block)?;
        let key = format!("{contract}:{token_id}");
        Ok(last_at_or_before_keyed(&self.series.lock().unwrap().intents, &key, block).unwrap_or_else(Amount::zero))
    }

    async fn mt_positions(&self, _account: &str, _contract: &str, _block: u64) -> Result<Vec<(String, Amount)>, RpcCallError> {
        Ok(Vec::new())
    }

    async fn staking_balance(&self, _account: &str, pool: &str, block: u64) -> Result<Amount, RpcCallError> {
        self.check_missing(block)?;
        Ok(last_at_or_before_keyed(&self.series.lock().unwrap().staking, pool, block).unwrap_or_else(Amount::zero))
    }

    async fn account_exists(&self, _account: &str, block: u64) -> Result<bool, RpcCallError> {
        self.check_missing(block)?;
        Ok(true)
    }

    async fn block_data(&self, _account: &str, block: u64) -> Result<BlockData, RpcCallError> {
        self.check_missing(block)?;
        Ok(BlockData {
            height: block,
            hash: format!("hash-{block}"),
            timestamp_ns: (block as i64) * 1_000_000_000,
            chunks: vec![ChunkData { receipts: Vec::new() }],
        })
    }

    async fn account_changes(&self, _account: &str, block: u64) -> Result<Vec<StateChangeWithCauseView>, RpcCallError> {
        self.check_missing(block)?;
        Ok(Vec::new())
    }

    async fn tx_status(&self, _tx_hash: &str, _account: &str) -> Result<TxStatusBlocks, RpcCallError> {
        Ok(TxStatusBlocks::default())
    }

    async fn receipt_logs(&self, _receipt_id: &str, _account: &str) -> Result<Vec<String>, RpcCallError> {
        Ok(Vec::new())
    }
}
