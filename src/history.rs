//! The on-disk data model: `TransferDetail`, `TransactionEntry`, `History`,
//! and the secondary per-token record/gap forms. Field naming uses a
//! camelCase JSON schema via `serde(rename_all)`, matching how the rest of
//! this crate's JSON bodies are shaped.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::change::BalanceChange;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    Native,
    Ft,
    Mt,
    StakingReward,
    ActionReceiptGasReward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

/// One atomic credit/debit attributed to the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferDetail {
    #[serde(rename = "type")]
    pub kind: TransferType,
    pub direction: Direction,
    pub amount: Amount,
    pub counterparty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,
}

/// Connectivity witness between adjacent entries: whether the recorded
/// balances line up end-to-end under the active filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub valid: bool,
    pub mismatched_assets: Vec<String>,
}

/// One history record, keyed uniquely by `block`.
///
/// `transfers` distinguishes "not yet attempted" (`None`) from "attempted,
/// found none" (`Some(vec![])`) — collapsing the two would make the
/// reconciler re-run extraction on every enrichment pass
/// instead of only on entries it has never looked at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEntry {
    pub block: u64,
    pub transaction_block: Option<u64>,
    pub timestamp: Option<i64>,
    pub transaction_hashes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfers: Option<Vec<TransferDetail>>,
    pub balance_before: Snapshot,
    pub balance_after: Snapshot,
    pub changes: BalanceChange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_with_previous: Option<Verification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_with_next: Option<Verification>,
}

impl TransactionEntry {
    /// `changes.has_changes` is true for every non-synthetic entry; a
    /// synthetic placeholder used only internally
    /// during gap-fill bookkeeping is never persisted with `has_changes ==
    /// false`.
    pub fn is_well_formed(&self) -> bool {
        self.changes.has_changes()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMetadata {
    pub first_block: Option<u64>,
    pub last_block: Option<u64>,
    pub total_transactions: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_complete: Option<bool>,
}

impl Default for HistoryMetadata {
    fn default() -> Self {
        HistoryMetadata {
            first_block: None,
            last_block: None,
            total_transactions: 0,
            history_complete: None,
        }
    }
}

/// The whole per-account history document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub account_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub transactions: Vec<TransactionEntry>,
    pub staking_pools: Vec<String>,
    pub metadata: HistoryMetadata,
}

impl History {
    pub fn new(account_id: impl Into<String>, now: chrono::DateTime<chrono::Utc>) -> Self {
        History {
            account_id: account_id.into(),
            created_at: now,
            updated_at: now,
            transactions: Vec::new(),
            staking_pools: Vec::new(),
            metadata: HistoryMetadata::default(),
        }
    }

    /// Insert an entry, keeping `transactions` sorted by ascending `block`.
    /// No two entries ever share a block; inserting at an existing block
    /// replaces it.
    pub fn insert(&mut self, entry: TransactionEntry) {
        let pos = self
            .transactions
            .partition_point(|e| e.block < entry.block);
        if self.transactions.get(pos).map(|e| e.block) == Some(entry.block) {
            self.transactions[pos] = entry;
        } else {
            self.transactions.insert(pos, entry);
        }
        self.recompute_metadata();
    }

    fn recompute_metadata(&mut self) {
        self.metadata.first_block = self.transactions.first().map(|e| e.block);
        self.metadata.last_block = self.transactions.last().map(|e| e.block);
        self.metadata.total_transactions = self.transactions.len() as u64;
    }

    pub fn touch(&mut self, now: chrono::DateTime<chrono::Utc>) {
        self.updated_at = now;
    }
}

/// A flattened per-token row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerTokenChangeRecord {
    pub block_height: u64,
    pub block_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub tx_hash: Option<String>,
    pub tx_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predecessor_id: Option<String>,
    pub token_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,
    pub counterparty: String,
    pub amount: Amount,
    pub balance_before: Amount,
    pub balance_after: Amount,
}

/// A detected connectivity break between two records of the same token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGap {
    pub token_id: String,
    pub from_block: u64,
    pub to_block: u64,
    pub expected_balance: Amount,
    pub actual_balance: Amount,
    pub diff: Amount,
}

/// Flatten entries into per-token records. Entries with no
/// changes (there shouldn't be any, per the invariant above, but defensive
/// against malformed input from an older history file) yield no records.
pub fn flatten_to_records(entries: &[TransactionEntry]) -> Vec<PerTokenChangeRecord> {
    let mut records = Vec::new();
    for entry in entries {
        let timestamp = entry
            .timestamp
            .map(|ns| chrono::DateTime::from_timestamp(ns / 1_000_000_000, (ns % 1_000_000_000) as u32))
            .flatten();
        let tx_hash = entry.transaction_hashes.first().cloned();

        if entry.changes.near_changed {
            records.push(PerTokenChangeRecord {
                block_height: entry.block,
                block_timestamp: timestamp,
                tx_hash: tx_hash.clone(),
                tx_block: entry.transaction_block,
                signer_id: None,
                receiver_id: None,
                predecessor_id: None,
                token_id: "near".to_string(),
                receipt_id: None,
                counterparty: native_counterparty(entry),
                amount: entry.changes.near_diff.clone().unwrap_or_else(Amount::zero),
                balance_before: entry.balance_before.native_or_zero(),
                balance_after: entry.balance_after.native_or_zero(),
            });
        }

        for (token_id, delta) in &entry.changes.tokens_changed {
            records.push(PerTokenChangeRecord {
                block_height: entry.block,
                block_timestamp: timestamp,
                tx_hash: tx_hash.clone(),
                tx_block: entry.transaction_block,
                signer_id: None,
                receiver_id: None,
                predecessor_id: None,
                token_id: token_id.clone(),
                receipt_id: None,
                counterparty: token_counterparty(entry, token_id),
                amount: delta.diff.clone(),
                balance_before: delta.start.clone(),
                balance_after: delta.end.clone(),
            });
        }

        for (token_id, delta) in &entry.changes.intents_changed {
            records.push(PerTokenChangeRecord {
                block_height: entry.block,
                block_timestamp: timestamp,
                tx_hash: tx_hash.clone(),
                tx_block: entry.transaction_block,
                signer_id: None,
                receiver_id: None,
                predecessor_id: None,
                token_id: token_id.clone(),
                receipt_id: None,
                counterparty: token_counterparty(entry, token_id),
                amount: delta.diff.clone(),
                balance_before: delta.start.clone(),
                balance_after: delta.end.clone(),
            });
        }

        for (pool, delta) in &entry.changes.staking_changed {
            records.push(PerTokenChangeRecord {
                block_height: entry.block,
                block_timestamp: timestamp,
                tx_hash: tx_hash.clone(),
                tx_block: entry.transaction_block,
                signer_id: None,
                receiver_id: None,
                predecessor_id: None,
                token_id: pool.clone(),
                receipt_id: None,
                counterparty: pool.clone(),
                amount: delta.diff.clone(),
                balance_before: delta.start.clone(),
                balance_after: delta.end.clone(),
            });
        }
    }
    records
}

fn native_counterparty(entry: &TransactionEntry) -> String {
    entry
        .transfers
        .as_ref()
        .and_then(|xs| xs.iter().find(|t| t.kind == TransferType::Native))
        .map(|t| t.counterparty.clone())
        .unwrap_or_default()
}

fn token_counterparty(entry: &TransactionEntry, token_id: &str) -> String {
    entry
        .transfers
        .as_ref()
        .and_then(|xs| {
            xs.iter()
                .find(|t| t.token_id.as_deref() == Some(token_id))
        })
        .map(|t| t.counterparty.clone())
        .unwrap_or_default()
}

/// Detect connectivity breaks within a single token's chronologically
/// sorted records.
pub fn detect_token_gaps(records: &[PerTokenChangeRecord]) -> Vec<TokenGap> {
    let mut gaps = Vec::new();
    for pair in records.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.token_id != next.token_id {
            continue;
        }
        if next.balance_before != prev.balance_after {
            gaps.push(TokenGap {
                token_id: prev.token_id.clone(),
                from_block: prev.block_height,
                to_block: next.block_height,
                expected_balance: prev.balance_after.clone(),
                actual_balance: next.balance_before.clone(),
                diff: next.balance_before.diff(&prev.balance_after),
            });
        }
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(block: u64, near: &str) -> TransactionEntry {
        TransactionEntry {
            block,
            transaction_block: Some(block),
            timestamp: Some(1_700_000_000_000_000_000),
            transaction_hashes: vec!["abc".into()],
            transfers: Some(vec![]),
            balance_before: Snapshot::new().with_native(Amount::zero()),
            balance_after: Snapshot::new().with_native(near.parse().unwrap()),
            changes: BalanceChange {
                near_changed: true,
                near_diff: Some(near.parse().unwrap()),
                ..Default::default()
            },
            verification_with_previous: None,
            verification_with_next: None,
        }
    }

    fn epoch() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn history_insert_keeps_blocks_sorted() {
        let mut history = History::new("alice.near", epoch());
        history.insert(sample_entry(200, "5"));
        history.insert(sample_entry(100, "5"));
        history.insert(sample_entry(150, "5"));

        let blocks: Vec<u64> = history.transactions.iter().map(|e| e.block).collect();
        assert_eq!(blocks, vec![100, 150, 200]);
        assert_eq!(history.metadata.first_block, Some(100));
        assert_eq!(history.metadata.last_block, Some(200));
        assert_eq!(history.metadata.total_transactions, 3);
    }

    #[test]
    fn insert_replaces_existing_block() {
        let mut history = History::new("alice.near", epoch());
        history.insert(sample_entry(100, "5"));
        history.insert(sample_entry(100, "10"));

        assert_eq!(history.transactions.len(), 1);
        assert_eq!(
            history.transactions[0].changes.near_diff.as_ref().unwrap().to_string(),
            "10"
        );
    }

    #[test]
    fn token_gap_detected_on_mismatch() {
        let records = vec![
            PerTokenChangeRecord {
                block_height: 100,
                block_timestamp: None,
                tx_hash: None,
                tx_block: None,
                signer_id: None,
                receiver_id: None,
                predecessor_id: None,
                token_id: "wrap.near".into(),
                receipt_id: None,
                counterparty: "bob.near".into(),
                amount: "5".parse().unwrap(),
                balance_before: "0".parse().unwrap(),
                balance_after: "5".parse().unwrap(),
            },
            PerTokenChangeRecord {
                block_height: 200,
                block_timestamp: None,
                tx_hash: None,
                tx_block: None,
                signer_id: None,
                receiver_id: None,
                predecessor_id: None,
                token_id: "wrap.near".into(),
                receipt_id: None,
                counterparty: "carol.near".into(),
                amount: "5".parse().unwrap(),
                balance_before: "10".parse().unwrap(),
                balance_after: "15".parse().unwrap(),
            },
        ];

        let gaps = detect_token_gaps(&records);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].from_block, 100);
        assert_eq!(gaps[0].to_block, 200);
        assert_eq!(gaps[0].diff.to_string(), "5");
    }

    #[test]
    fn no_gap_when_connected() {
        let records = vec![
            PerTokenChangeRecord {
                block_height: 100,
                block_timestamp: None,
                tx_hash: None,
                tx_block: None,
                signer_id: None,
                receiver_id: None,
                predecessor_id: None,
                token_id: "wrap.near".into(),
                receipt_id: None,
                counterparty: "bob.near".into(),
                amount: "5".parse().unwrap(),
                balance_before: "0".parse().unwrap(),
                balance_after: "5".parse().unwrap(),
            },
            PerTokenChangeRecord {
                block_height: 200,
                block_timestamp: None,
                tx_hash: None,
                tx_block: None,
                signer_id: None,
                receiver_id: None,
                predecessor_id: None,
                token_id: "wrap.near".into(),
                receipt_id: None,
                counterparty: "carol.near".into(),
                amount: "5".parse().unwrap(),
                balance_before: "5".parse().unwrap(),
                balance_after: "10".parse().unwrap(),
            },
        ];
        assert!(detect_token_gaps(&records).is_empty());
    }
}
