//! A pure function comparing two balance snapshots.
//!
//! No I/O, no allocation beyond the result. Tolerates disjoint key sets
//! between the two snapshots (never fails on schema drift) — the same
//! "missing key ≡ 0, comparison-only" rule
//! [`crate::snapshot::Snapshot::differs_from`] uses.

use crate::amount::Amount;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetDelta {
    pub start: Amount,
    pub end: Amount,
    pub diff: Amount,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub near_changed: bool,
    pub near_diff: Option<Amount>,
    pub tokens_changed: BTreeMap<String, AssetDelta>,
    pub intents_changed: BTreeMap<String, AssetDelta>,
    pub staking_changed: BTreeMap<String, AssetDelta>,
}

impl BalanceChange {
    pub fn has_changes(&self) -> bool {
        self.near_changed
            || !self.tokens_changed.is_empty()
            || !self.intents_changed.is_empty()
            || !self.staking_changed.is_empty()
    }
}

/// Compare `before` and `after` over the union of their key sets per asset
/// dimension. A key present only on one side is treated as `"0"` on the
/// other for the purpose of computing `diff`.
pub fn detect(before: &Snapshot, after: &Snapshot) -> BalanceChange {
    let near_start = before.native_or_zero();
    let near_end = after.native_or_zero();
    let near_diff = near_end.diff(&near_start);
    let near_changed = !near_diff.is_zero();

    BalanceChange {
        near_changed,
        near_diff: near_changed.then_some(near_diff),
        tokens_changed: diff_map(&before.fungible_tokens, &after.fungible_tokens),
        intents_changed: diff_map(&before.intents_tokens, &after.intents_tokens),
        staking_changed: diff_map(&before.staking_pools, &after.staking_pools),
    }
}

fn diff_map(
    before: &BTreeMap<String, Amount>,
    after: &BTreeMap<String, Amount>,
) -> BTreeMap<String, AssetDelta> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    let mut result = BTreeMap::new();
    for key in keys {
        let start = before.get(key).cloned().unwrap_or_else(Amount::zero);
        let end = after.get(key).cloned().unwrap_or_else(Amount::zero);
        let diff = end.diff(&start);
        if !diff.is_zero() {
            result.insert(key.clone(), AssetDelta { start, end, diff });
        }
    }
    result
}
