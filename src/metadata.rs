//! Token metadata cache.
//!
//! Resolves a token contract id to display metadata (symbol, decimals)
//! through a fallback chain: a small table of well-known assets, then an
//! in-process cache, then a live `ft_metadata`/`mt_metadata` view call, then
//! a decimals-unknown heuristic. Uses a `moka` tier with a TTL, keyed
//! through a small helper rather than ad hoc `format!` strings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache as MokaCache;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::asset::AssetId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

impl TokenMetadata {
    pub fn decimals_unknown(symbol: impl Into<String>) -> Self {
        TokenMetadata {
            symbol: symbol.into(),
            decimals: 0,
        }
    }
}

/// Well-known assets whose metadata is cheap to hardcode rather than fetch
/// every run. Keyed by the contract id a [`AssetId::metadata_contract`]
/// resolves to.
static KNOWN_ASSETS: Lazy<HashMap<&'static str, TokenMetadata>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "wrap.near",
        TokenMetadata {
            symbol: "wNEAR".into(),
            decimals: 24,
        },
    );
    m.insert(
        "usdt.tether-token.near",
        TokenMetadata {
            symbol: "USDT".into(),
            decimals: 6,
        },
    );
    m.insert(
        "17208628f84f5d6ad33f0da3bbbeb27ffcb398eac501a31bd6ad2011e36133a1",
        TokenMetadata {
            symbol: "USDC".into(),
            decimals: 6,
        },
    );
    m
});

/// In-process metadata cache. Clone is cheap (shared `moka::sync::Cache`
/// handles) so it can be threaded through the application as one shared
/// value.
#[derive(Clone)]
pub struct MetadataCache {
    inner: MokaCache<String, Arc<Option<TokenMetadata>>>,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCache {
    /// 5-minute TTL — metadata changes rarely enough that a short poll
    /// interval would just be wasted RPC calls.
    pub fn new() -> Self {
        MetadataCache {
            inner: MokaCache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(300))
                .build(),
        }
    }

    /// Resolve metadata for `asset`, consulting the known-asset table, then
    /// the cache, then `fetch`. A negative result (the contract has no
    /// metadata view, or the call fails) is memoized too, so a single
    /// unmetadata'd contract doesn't get re-queried on every lookup within
    /// the TTL window.
    pub async fn resolve<F, Fut>(&self, asset: &AssetId, fetch: F) -> TokenMetadata
    where
        F: FnOnce(String) -> Fut,
        Fut: std::future::Future<Output = Option<TokenMetadata>>,
    {
        let Some(contract) = asset.metadata_contract() else {
            return TokenMetadata {
                symbol: "NEAR".into(),
                decimals: 24,
            };
        };

        if let Some(known) = KNOWN_ASSETS.get(contract) {
            return known.clone();
        }

        let cache_key = cache_key(asset, contract);
        if let Some(cached) = self.inner.get(&cache_key) {
            return (*cached)
                .clone()
                .unwrap_or_else(|| TokenMetadata::decimals_unknown(contract));
        }

        let fetched = fetch(contract.to_string()).await;
        self.inner.insert(cache_key, Arc::new(fetched.clone()));
        fetched.unwrap_or_else(|| TokenMetadata::decimals_unknown(contract))
    }
}

fn cache_key(asset: &AssetId, contract: &str) -> String {
    match asset {
        AssetId::MultiToken { sub_id: Some(sub), .. } => format!("metadata:{contract}:{sub}"),
        _ => format!("metadata:{contract}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_asset_short_circuits_fetch() {
        let cache = MetadataCache::new();
        let mut fetch_calls = 0;
        let asset = AssetId::ft("wrap.near");
        let md = cache
            .resolve(&asset, |_| async {
                fetch_calls += 1;
                None
            })
            .await;
        assert_eq!(md.symbol, "wNEAR");
        assert_eq!(md.decimals, 24);
        assert_eq!(fetch_calls, 0);
    }

    #[tokio::test]
    async fn native_never_fetches() {
        let cache = MetadataCache::new();
        let md = cache.resolve(&AssetId::Native, |_| async { None }).await;
        assert_eq!(md.symbol, "NEAR");
    }

    #[tokio::test]
    async fn negative_result_is_memoized() {
        let cache = MetadataCache::new();
        let asset = AssetId::ft("unknown-contract.near");

        let first = cache.resolve(&asset, |_| async { None }).await;
        assert_eq!(first.decimals, 0);

        // Second call must not invoke fetch again; we can't observe that
        // directly without a counter captured by reference, so assert the
        // cached negative result is returned unchanged.
        let second = cache
            .resolve(&asset, |_| async {
                panic!("fetch should not run for a cached negative result")
            })
            .await;
        assert_eq!(second.symbol, first.symbol);
    }
}
