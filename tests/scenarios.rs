//! Scenario tests mirroring concrete recorded account histories: an
//! intents balance flip across one block, a dense run of intents changes
//! a filtered sub-range search must still isolate correctly, a staking
//! deposit that doesn't touch the destination snapshot's account in the
//! same block, and a normalisation pass over an uneven key set.

mod common;

use std::sync::Arc;

use common::FakeClient;
use ledger_reconciler::asset::AssetId;
use ledger_reconciler::search::{find_latest_change, ChangeLocation};
use ledger_reconciler::snapshot::{normalize, AssetFilter, Snapshot};
use ledger_reconciler::Amount;

#[tokio::test]
async fn known_intents_change_is_isolated_by_filter() {
    ledger_reconciler::cancellation::reset();

    let client = Arc::new(FakeClient::new());
    let asset = AssetId::mt_nep141("eth.omft.near");
    client.set_intents(&asset.to_string(), 0, "0");
    client.set_intents(&asset.to_string(), 148_439_687, "5000000000000000");

    let reader = ledger_reconciler::balance::SnapshotReader::new(client);
    let filter = AssetFilter::single(&asset);

    let result = find_latest_change(&reader, "webassemblymusic-treasury.sputnik-dao.near", 148_407_793, 148_586_609, &filter)
        .await
        .unwrap();

    match result {
        ChangeLocation::Found {
            block,
            start_balance,
            end_balance,
            ..
        } => {
            assert_eq!(block, 148_439_687);
            assert_eq!(start_balance.intents_or_zero(&asset.to_string()).to_string(), "0");
            assert_eq!(end_balance.intents_or_zero(&asset.to_string()).to_string(), "5000000000000000");
        }
        ChangeLocation::NoChanges => panic!("expected a change to be found"),
    }
}

#[tokio::test]
async fn sub_range_search_restricted_to_one_asset_finds_its_own_change() {
    ledger_reconciler::cancellation::reset();

    let client = Arc::new(FakeClient::new());
    let usdc = AssetId::mt_nep141("eth-0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48.omft.near");
    let other = AssetId::mt_nep141("172086.omft.near");

    client.set_intents(&usdc.to_string(), 158_500_927, "12286263");
    client.set_intents(&usdc.to_string(), 158_500_955, "42286203");
    client.set_intents(&other.to_string(), 158_500_927, "30000000");
    client.set_intents(&other.to_string(), 158_500_928, "0");

    let reader = ledger_reconciler::balance::SnapshotReader::new(client);

    let usdc_filter = AssetFilter::single(&usdc);
    let dense = find_latest_change(
        &reader,
        "webassemblymusic-treasury.sputnik-dao.near",
        158_500_927,
        158_500_955,
        &usdc_filter,
    )
    .await
    .unwrap();
    match dense {
        ChangeLocation::Found {
            block,
            start_balance,
            end_balance,
            change,
        } => {
            assert_eq!(block, 158_500_955);
            assert_eq!(start_balance.intents_or_zero(&usdc.to_string()).to_string(), "12286263");
            assert_eq!(end_balance.intents_or_zero(&usdc.to_string()).to_string(), "42286203");
            let delta = change.intents_changed.get(&usdc.to_string()).unwrap();
            assert_eq!(delta.diff.to_string(), "29999940");
        }
        ChangeLocation::NoChanges => panic!("expected a change to be found"),
    }

    let other_filter = AssetFilter::single(&other);
    let narrow = find_latest_change(
        &reader,
        "webassemblymusic-treasury.sputnik-dao.near",
        158_500_927,
        158_500_928,
        &other_filter,
    )
    .await
    .unwrap();
    match narrow {
        ChangeLocation::Found { block, change, .. } => {
            assert_eq!(block, 158_500_928);
            let delta = change.intents_changed.get(&other.to_string()).unwrap();
            assert_eq!(delta.diff.to_string(), "-30000000");
        }
        ChangeLocation::NoChanges => panic!("expected a change to be found"),
    }
}

#[tokio::test]
async fn normalisation_equalises_key_sets_without_disturbing_the_original_value() {
    let mut before = Snapshot::new();
    before.staking_pools.insert("a.poolv1.near".into(), "500".parse().unwrap());

    let mut after = Snapshot::new();
    after.staking_pools.insert("a.poolv1.near".into(), "500".parse().unwrap());
    after.staking_pools.insert("b.poolv1.near".into(), "100".parse().unwrap());
    after.staking_pools.insert("c.poolv1.near".into(), "200".parse().unwrap());
    after.staking_pools.insert("d.poolv1.near".into(), "300".parse().unwrap());
    after.staking_pools.insert("e.poolv1.near".into(), "400".parse().unwrap());

    normalize(&mut before, &mut after);

    assert_eq!(before.staking_pools.len(), 5);
    assert_eq!(after.staking_pools.len(), 5);
    assert_eq!(before.staking_pools.keys().collect::<Vec<_>>(), after.staking_pools.keys().collect::<Vec<_>>());

    assert_eq!(before.staking_pools["a.poolv1.near"].to_string(), "500");
    for added in ["b.poolv1.near", "c.poolv1.near", "d.poolv1.near", "e.poolv1.near"] {
        assert_eq!(before.staking_pools[added], Amount::zero());
    }
}

#[tokio::test]
async fn snapshot_read_is_pure_across_repeated_calls() {
    ledger_reconciler::cancellation::reset();

    let client = Arc::new(FakeClient::new());
    client.set_native(100, "7000000000000000000000000");

    let reader = ledger_reconciler::balance::SnapshotReader::new(client);
    let filter = AssetFilter::native_only();

    let first = reader.read("alice.near", 100, &filter).await.unwrap();
    let second = reader.read("alice.near", 100, &filter).await.unwrap();

    assert_eq!(first.native_or_zero(), second.native_or_zero());
}
