//! External discovery hints.
//!
//! Hints are never trusted outright: every hint the discovery phase picks
//! up is re-validated by re-running the balance-snapshot reader at the
//! hinted block before it's accepted as a real change. A provider that
//! returns stale or wrong hints degrades discovery to the bisection
//! fallback, never to a bogus history entry.

use async_trait::async_trait;
use std::error::Error;

/// A candidate block height where a balance change might have occurred for
/// one asset, as reported by an external indexer/API.
#[derive(Debug, Clone)]
pub struct DiscoveryHint {
    pub block_height: u64,
    pub asset: String,
}

/// A source of discovery hints. No concrete network-backed implementation
/// ships here — only the trait and the fan-out service, so the discovery
/// phase can be driven by an in-memory double in tests.
#[async_trait]
pub trait HintProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Hints for `account`/`asset` within `[from_block, to_block]`, sorted
    /// by block height ascending.
    async fn get_hints(
        &self,
        account: &str,
        asset: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<DiscoveryHint>, Box<dyn Error + Send + Sync>>;

    fn supports_asset(&self, asset: &str) -> bool;
}

/// Fans a discovery request out to every provider that claims the asset,
/// merging results and deduplicating by block height.
#[derive(Default)]
pub struct HintService {
    providers: Vec<Box<dyn HintProvider>>,
}

impl HintService {
    pub fn new() -> Self {
        HintService { providers: Vec::new() }
    }

    pub fn with_provider(mut self, provider: impl HintProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub async fn get_hints(
        &self,
        account: &str,
        asset: &str,
        from_block: u64,
        to_block: u64,
    ) -> Vec<DiscoveryHint> {
        use std::collections::BTreeMap;

        let supporting: Vec<_> = self.providers.iter().filter(|p| p.supports_asset(asset)).collect();
        if supporting.is_empty() {
            return Vec::new();
        }

        let futures = supporting.iter().map(|provider| async move {
            match provider.get_hints(account, asset, from_block, to_block).await {
                Ok(hints) => hints,
                Err(e) => {
                    log::warn!("hint provider {} failed for {account}/{asset}: {e}", provider.name());
                    Vec::new()
                }
            }
        });

        let results = futures::future::join_all(futures).await;

        let mut by_block: BTreeMap<u64, DiscoveryHint> = BTreeMap::new();
        for hints in results {
            for hint in hints {
                by_block.entry(hint.block_height).or_insert(hint);
            }
        }
        by_block.into_values().collect()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockProvider {
        name: &'static str,
        asset: &'static str,
        hints: Vec<DiscoveryHint>,
    }

    #[async_trait]
    impl HintProvider for MockProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn get_hints(
            &self,
            _account: &str,
            _asset: &str,
            from_block: u64,
            to_block: u64,
        ) -> Result<Vec<DiscoveryHint>, Box<dyn Error + Send + Sync>> {
            Ok(self
                .hints
                .iter()
                .filter(|h| h.block_height >= from_block && h.block_height <= to_block)
                .cloned()
                .collect())
        }

        fn supports_asset(&self, asset: &str) -> bool {
            self.asset == asset
        }
    }

    #[tokio::test]
    async fn no_providers_means_no_hints() {
        let service = HintService::new();
        let hints = service.get_hints("alice.near", "near", 0, 100).await;
        assert!(hints.is_empty());
    }

    #[tokio::test]
    async fn unsupported_asset_yields_no_hints() {
        let service = HintService::new().with_provider(MockProvider {
            name: "a",
            asset: "near",
            hints: vec![DiscoveryHint { block_height: 50, asset: "near".into() }],
        });
        let hints = service.get_hints("alice.near", "wrap.near", 0, 100).await;
        assert!(hints.is_empty());
    }

    #[tokio::test]
    async fn merges_and_dedupes_by_block() {
        let service = HintService::new()
            .with_provider(MockProvider {
                name: "a",
                asset: "near",
                hints: vec![
                    DiscoveryHint { block_height: 10, asset: "near".into() },
                    DiscoveryHint { block_height: 20, asset: "near".into() },
                ],
            })
            .with_provider(MockProvider {
                name: "b",
                asset: "near",
                hints: vec![
                    DiscoveryHint { block_height: 20, asset: "near".into() },
                    DiscoveryHint { block_height: 30, asset: "near".into() },
                ],
            });

        let hints = service.get_hints("alice.near", "near", 0, 100).await;
        let blocks: Vec<u64> = hints.iter().map(|h| h.block_height).collect();
        assert_eq!(blocks, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn range_filter_is_respected() {
        let service = HintService::new().with_provider(MockProvider {
            name: "a",
            asset: "near",
            hints: vec![
                DiscoveryHint { block_height: 5, asset: "near".into() },
                DiscoveryHint { block_height: 50, asset: "near".into() },
            ],
        });
        let hints = service.get_hints("alice.near", "near", 10, 100).await;
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].block_height, 50);
    }
}
