//! Balance snapshot reader.
//!
//! Reads a [`Snapshot`] for `(account, block, filter)` through a
//! [`NearClient`], caching results and classifying RPC failures into
//! [`SnapshotError`] by matching "422"/`UnknownBlock` text — the
//! classification lives once, centrally, instead of being repeated per
//! asset-type module.

mod ft;
mod intents;
mod near;
mod staking;

pub use ft::read_ft;
pub use intents::read_intents;
pub use near::read_native;
pub use staking::{is_staking_pool, read_staking};

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache as MokaCache;

use crate::asset::AssetId;
use crate::cancellation;
use crate::error::SnapshotError;
use crate::rpc_client::NearClient;
use crate::snapshot::{AssetFilter, Snapshot};

/// Snapshot cache key: a read is only cacheable for the exact
/// `(account, block, asset)` triple — two different filters reading the
/// same account/block still hit the same per-asset entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SnapshotCacheKey {
    account: String,
    block: u64,
    asset: String,
}

#[derive(Clone)]
pub struct SnapshotReader {
    client: Arc<dyn NearClient>,
    cache: MokaCache<SnapshotCacheKey, Arc<str>>,
}

impl SnapshotReader {
    pub fn new(client: Arc<dyn NearClient>) -> Self {
        SnapshotReader {
            client,
            // Short TTL: a snapshot read is a point-in-time fact that never
            // changes once the block is final, but unbounded caching across
            // a long-running reconciliation would grow without limit.
            cache: MokaCache::builder()
                .max_capacity(50_000)
                .time_to_live(Duration::from_secs(600))
                .build(),
        }
    }

    /// Read a full [`Snapshot`] at `block`, restricted to the asset
    /// dimensions named in `filter` (the filter is threaded to
    /// every leaf read, never assumed).
    pub async fn read(
        &self,
        account: &str,
        block: u64,
        filter: &AssetFilter,
    ) -> Result<Snapshot, SnapshotError> {
        if cancellation::is_requested() {
            return Err(SnapshotError::Cancelled);
        }

        let mut snapshot = Snapshot::new();

        if filter.check_native {
            let amount = self
                .cached_read(account, block, "near", || read_native(&*self.client, account, block))
                .await?;
            snapshot.set(&AssetId::Native, amount);
        }

        for contract in &filter.ft_contracts {
            let asset = AssetId::ft(contract.clone());
            let key = asset.to_string();
            let amount = self
                .cached_read(account, block, &key, || {
                    read_ft(&*self.client, account, contract, block)
                })
                .await?;
            snapshot.set(&asset, amount);
        }

        for asset_key in &filter.intents_assets {
            let asset: AssetId = asset_key
                .parse()
                .map_err(|_| SnapshotError::Rpc("parse", format!("bad intents asset {asset_key}")))?;
            let amount = self
                .cached_read(account, block, asset_key, || {
                    read_intents(&*self.client, account, &asset, block)
                })
                .await?;
            snapshot.set(&asset, amount);
        }

        for pool in &filter.staking_pools {
            let asset = AssetId::staked_with(pool.clone());
            let key = asset.to_string();
            let amount = self
                .cached_read(account, block, &key, || {
                    read_staking(&*self.client, account, pool, block)
                })
                .await?;
            snapshot.set(&asset, amount);
        }

        Ok(snapshot)
    }

    async fn cached_read<F, Fut>(
        &self,
        account: &str,
        block: u64,
        asset_key: &str,
        fetch: F,
    ) -> Result<crate::amount::Amount, SnapshotError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<crate::amount::Amount, SnapshotError>>,
    {
        let cache_key = SnapshotCacheKey {
            account: account.to_string(),
            block,
            asset: asset_key.to_string(),
        };
        if let Some(cached) = self.cache.get(&cache_key) {
            return cached
                .parse()
                .map_err(|_| SnapshotError::Rpc("cache", "corrupt cache entry".into()));
        }
        let amount = fetch().await?;
        self.cache.insert(cache_key, Arc::from(amount.to_string()));
        Ok(amount)
    }
}
