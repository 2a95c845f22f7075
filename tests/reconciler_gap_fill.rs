//! Exercises the reconciler's gap-fill phase end to end: two bracketing
//! entries with a native-balance discontinuity between them, and nothing
//! else known, should converge on the exact block where the balance
//! changed — the cross-block staking-deposit scenario's shape, minus the
//! staking/transfer enrichment this phase doesn't perform.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::FakeClient;
use ledger_reconciler::history::{History, TransactionEntry};
use ledger_reconciler::reconciler::HistorySink;
use ledger_reconciler::snapshot::Snapshot;
use ledger_reconciler::{ReconcilerConfig, Reconciler};

#[derive(Default)]
struct MemorySink {
    saved: Mutex<Option<History>>,
}

#[async_trait]
impl HistorySink for MemorySink {
    async fn load(&self, _account: &str) -> Result<Option<History>, ledger_reconciler::error::ReconcileError> {
        Ok(self.saved.lock().unwrap().clone())
    }

    async fn save(&self, history: &History) -> Result<(), ledger_reconciler::error::ReconcileError> {
        *self.saved.lock().unwrap() = Some(history.clone());
        Ok(())
    }
}

fn bare_entry(block: u64, native: &str) -> TransactionEntry {
    TransactionEntry {
        block,
        transaction_block: None,
        timestamp: None,
        transaction_hashes: Vec::new(),
        transfers: None,
        balance_before: Snapshot::new().with_native(native.parse().unwrap()),
        balance_after: Snapshot::new().with_native(native.parse().unwrap()),
        changes: Default::default(),
        verification_with_previous: None,
        verification_with_next: None,
    }
}

#[tokio::test]
async fn gap_fill_does_nothing_when_bracketing_balances_already_agree() {
    ledger_reconciler::cancellation::reset();

    let client = Arc::new(FakeClient::new());
    client.set_native(161_048_660, "1000000000000000000000000000");

    let mut history = History::new("webassemblymusic-treasury.sputnik-dao.near", chrono::Utc::now());
    history.insert(bare_entry(161_048_660, "1000000000000000000000000000"));
    history.insert(bare_entry(161_048_664, "1000000000000000000000000000"));

    let sink = MemorySink::default();
    let reconciler = Reconciler::new(client, ReconcilerConfig::default());

    reconciler
        .fill_gaps(&mut history, "webassemblymusic-treasury.sputnik-dao.near", &sink)
        .await
        .unwrap();

    assert_eq!(history.transactions.len(), 2, "no intervening change to discover when the bracketing balances already agree");
}

#[tokio::test]
async fn gap_fill_inserts_an_entry_at_the_discovered_change_block() {
    ledger_reconciler::cancellation::reset();

    let client = Arc::new(FakeClient::new());
    client.set_native(161_048_660, "0");
    client.set_native(161_048_662, "1000000000000000000000000000");

    let mut history = History::new("webassemblymusic-treasury.sputnik-dao.near", chrono::Utc::now());
    history.insert(bare_entry(161_048_660, "0"));
    history.insert(bare_entry(161_048_664, "1000000000000000000000000000"));

    let sink = MemorySink::default();
    let reconciler = Reconciler::new(client, ReconcilerConfig::default());

    reconciler
        .fill_gaps(&mut history, "webassemblymusic-treasury.sputnik-dao.near", &sink)
        .await
        .unwrap();

    assert!(history.transactions.iter().any(|e| e.block == 161_048_662));
    assert_eq!(history.transactions.len(), 3);

    let inserted = history.transactions.iter().find(|e| e.block == 161_048_662).unwrap();
    assert_eq!(inserted.balance_before.native_or_zero().to_string(), "0");
    assert_eq!(inserted.balance_after.native_or_zero().to_string(), "1000000000000000000000000000");
}
