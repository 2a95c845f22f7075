//! Balance snapshots and their normalization.

use crate::amount::Amount;
use crate::asset::AssetId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An immutable point-in-time balance record for `(account, block_height)`.
///
/// A key is present in one of the maps iff the snapshot was *queried* for
/// that asset — absence means "unknown", never "zero".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub native: Option<Amount>,
    #[serde(default)]
    pub fungible_tokens: BTreeMap<String, Amount>,
    #[serde(default)]
    pub intents_tokens: BTreeMap<String, Amount>,
    #[serde(default)]
    pub staking_pools: BTreeMap<String, Amount>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_native(mut self, amount: Amount) -> Self {
        self.native = Some(amount);
        self
    }

    pub fn set(&mut self, asset: &AssetId, amount: Amount) {
        match asset {
            AssetId::Native => self.native = Some(amount),
            AssetId::FungibleToken { contract_id } => {
                self.fungible_tokens.insert(contract_id.clone(), amount);
            }
            AssetId::MultiToken { .. } => {
                self.intents_tokens.insert(asset.to_string(), amount);
            }
            AssetId::StakedWith { pool_id } => {
                self.staking_pools.insert(pool_id.clone(), amount);
            }
        }
    }

    /// Structural equality for "did anything change between these two
    /// endpoints". Missing-key is treated as `"0"` here (change-detection
    /// purposes only) but never persisted as such — see [`normalize`] for
    /// the persisted form.
    pub fn differs_from(&self, other: &Snapshot, filter: &AssetFilter) -> bool {
        if filter.check_native && self.native_or_zero() != other.native_or_zero() {
            return true;
        }
        for contract in &filter.ft_contracts {
            if self.ft_or_zero(contract) != other.ft_or_zero(contract) {
                return true;
            }
        }
        for asset in &filter.intents_assets {
            if self.intents_or_zero(asset) != other.intents_or_zero(asset) {
                return true;
            }
        }
        for pool in &filter.staking_pools {
            if self.staking_or_zero(pool) != other.staking_or_zero(pool) {
                return true;
            }
        }
        false
    }

    pub fn native_or_zero(&self) -> Amount {
        self.native.clone().unwrap_or_else(Amount::zero)
    }

    pub fn ft_or_zero(&self, contract: &str) -> Amount {
        self.fungible_tokens
            .get(contract)
            .cloned()
            .unwrap_or_else(Amount::zero)
    }

    pub fn intents_or_zero(&self, asset_key: &str) -> Amount {
        self.intents_tokens
            .get(asset_key)
            .cloned()
            .unwrap_or_else(Amount::zero)
    }

    pub fn staking_or_zero(&self, pool: &str) -> Amount {
        self.staking_pools
            .get(pool)
            .cloned()
            .unwrap_or_else(Amount::zero)
    }
}

/// The asset dimensions a search invocation, or a single snapshot read, is
/// restricted to. Must be threaded through *every* recursive level and into
/// every leaf read, never just closed over at the top — bundling it into one
/// immutable value makes "forgot to forward the filter" structurally
/// impossible rather than a convention to remember.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetFilter {
    pub check_native: bool,
    pub ft_contracts: Vec<String>,
    pub intents_assets: Vec<String>,
    pub staking_pools: Vec<String>,
}

impl AssetFilter {
    pub fn native_only() -> Self {
        AssetFilter {
            check_native: true,
            ..Default::default()
        }
    }

    pub fn single(asset: &AssetId) -> Self {
        let mut f = AssetFilter::default();
        match asset {
            AssetId::Native => f.check_native = true,
            AssetId::FungibleToken { contract_id } => f.ft_contracts.push(contract_id.clone()),
            AssetId::MultiToken { .. } => f.intents_assets.push(asset.to_string()),
            AssetId::StakedWith { pool_id } => f.staking_pools.push(pool_id.clone()),
        }
        f
    }

    pub fn is_empty(&self) -> bool {
        !self.check_native
            && self.ft_contracts.is_empty()
            && self.intents_assets.is_empty()
            && self.staking_pools.is_empty()
    }
}

/// Normalize a before/after pair so both sides carry the same key set in
/// each map, filling any key present only on one side with `"0"` on the
/// other, so `balance_before` and `balance_after` are always directly
/// comparable once persisted. Unlike [`Snapshot::differs_from`], this
/// mutates the persisted record, not just a comparison.
pub fn normalize(before: &mut Snapshot, after: &mut Snapshot) {
    normalize_map(&mut before.fungible_tokens, &mut after.fungible_tokens);
    normalize_map(&mut before.intents_tokens, &mut after.intents_tokens);
    normalize_map(&mut before.staking_pools, &mut after.staking_pools);
}

fn normalize_map(a: &mut BTreeMap<String, Amount>, b: &mut BTreeMap<String, Amount>) {
    let keys: Vec<String> = a.keys().chain(b.keys()).cloned().collect::<std::collections::BTreeSet<_>>().into_iter().collect();
    for key in keys {
        a.entry(key.clone()).or_insert_with(Amount::zero);
        b.entry(key).or_insert_with(Amount::zero);
    }
}
