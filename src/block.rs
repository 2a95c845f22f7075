//! Full block data plus per-shard receipts.
//!
//! Two transports are tried in priority order: an indexer stream (if
//! configured) and the archival RPC as fallback. This crate owns the
//! interface for the first — a concrete streaming indexer client is an
//! external collaborator, not shipped here — and the full RPC implementation
//! for the second, via [`NearClient`].

use std::sync::Arc;

use moka::sync::Cache as MokaCache;
use std::time::Duration;

use crate::cancellation;
use crate::error::BlockFetchError;
use crate::rpc_client::{BlockData, NearClient, RpcCallError};

/// An alternate block-data transport, e.g. a streaming indexer, tried
/// before falling back to archival RPC. No concrete implementation ships
/// in this crate.
#[async_trait::async_trait]
pub trait BlockStream: Send + Sync {
    async fn block_data(&self, account: &str, block: u64) -> Option<BlockData>;
}

pub struct BlockFetcher {
    client: Arc<dyn NearClient>,
    stream: Option<Arc<dyn BlockStream>>,
    timestamp_cache: MokaCache<u64, i64>,
}

impl BlockFetcher {
    pub fn new(client: Arc<dyn NearClient>) -> Self {
        BlockFetcher {
            client,
            stream: None,
            timestamp_cache: MokaCache::builder()
                .max_capacity(20_000)
                .time_to_live(Duration::from_secs(3600))
                .build(),
        }
    }

    pub fn with_stream(mut self, stream: Arc<dyn BlockStream>) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Fetch everything C5 needs out of `block`: the indexer stream first,
    /// archival RPC as fallback.
    pub async fn fetch(&self, account: &str, block: u64) -> Result<BlockData, BlockFetchError> {
        if cancellation::is_requested() {
            return Err(BlockFetchError::Rpc(block, "cancelled".into()));
        }

        if let Some(stream) = &self.stream {
            if let Some(data) = stream.block_data(account, block).await {
                self.timestamp_cache.insert(block, data.timestamp_ns);
                return Ok(data);
            }
        }

        let data = self
            .client
            .block_data(account, block)
            .await
            .map_err(|e| match e {
                RpcCallError::MissingBlock(b) => BlockFetchError::MissingBlock(b),
                RpcCallError::AccountAbsent => BlockFetchError::MissingBlock(block),
                RpcCallError::Other(msg) => BlockFetchError::Rpc(block, msg),
            })?;
        self.timestamp_cache.insert(block, data.timestamp_ns);
        Ok(data)
    }

    /// Timestamp-only lookup, cached independently of the full block fetch
    /// since many callers (staking epoch math, history enrichment) only
    /// need the timestamp and shouldn't pay for the full receipt fetch.
    pub async fn timestamp(&self, account: &str, block: u64) -> Result<i64, BlockFetchError> {
        if let Some(ts) = self.timestamp_cache.get(&block) {
            return Ok(ts);
        }
        Ok(self.fetch(account, block).await?.timestamp_ns)
    }
}
