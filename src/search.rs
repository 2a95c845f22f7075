//! Recursive interval bisection for locating a balance change, with
//! filter propagation and late discovery.
//!
//! The asset `filter` is threaded as an argument through every recursive
//! call and every [`SnapshotReader::read`] call, never captured once and
//! assumed — there is no global or "current filter" state to forget to
//! update.
//!
//! This finds the *latest* change in `[lo, hi]`, not all changes: at each
//! level, if the midpoint differs from `hi`, the most recent change is
//! still ahead of the midpoint, so we recurse into `[mid, hi]`; otherwise
//! it already happened at or before the midpoint, so we recurse into
//! `[lo, mid]`.

use crate::balance::SnapshotReader;
use crate::cancellation;
use crate::change::{self, BalanceChange};
use crate::error::SnapshotError;
use crate::snapshot::{AssetFilter, Snapshot};

/// Bounded forward retries when an intermediate block is reported missing.
const MAX_MISSING_BLOCK_RETRIES: u32 = 5;

#[derive(Debug, Clone)]
pub enum ChangeLocation {
    NoChanges,
    Found {
        block: u64,
        start_balance: Snapshot,
        end_balance: Snapshot,
        change: BalanceChange,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("search cancelled")]
    Cancelled,
}

/// Locate the most recent balance change in `[lo, hi]`, or report that
/// none occurred.
pub async fn find_latest_change(
    reader: &SnapshotReader,
    account: &str,
    lo: u64,
    hi: u64,
    filter: &AssetFilter,
) -> Result<ChangeLocation, SearchError> {
    if cancellation::is_requested() {
        return Err(SearchError::Cancelled);
    }

    let lo_snapshot = reader.read(account, lo, filter).await?;
    let hi_snapshot = reader.read(account, hi, filter).await?;

    if !lo_snapshot.differs_from(&hi_snapshot, filter) {
        return Ok(ChangeLocation::NoChanges);
    }

    bisect(reader, account, filter, lo, lo_snapshot, hi, hi_snapshot).await
}

#[async_recursion::async_recursion]
async fn bisect(
    reader: &SnapshotReader,
    account: &str,
    filter: &AssetFilter,
    lo: u64,
    lo_snapshot: Snapshot,
    hi: u64,
    hi_snapshot: Snapshot,
) -> Result<ChangeLocation, SearchError> {
    if cancellation::is_requested() {
        return Err(SearchError::Cancelled);
    }

    if hi <= lo + 1 {
        let mut start = lo_snapshot;
        let mut end = hi_snapshot;
        crate::snapshot::normalize(&mut start, &mut end);
        let delta = change::detect(&start, &end);
        return Ok(ChangeLocation::Found {
            block: hi,
            start_balance: start,
            end_balance: end,
            change: delta,
        });
    }

    let mid = lo + (hi - lo) / 2;

    let mid_snapshot = match read_mid_with_forward_retreat(reader, account, filter, mid, hi).await? {
        Some(snapshot) => snapshot,
        None => {
            log::warn!("abandoning interval [{lo}, {hi}] for {account}: block {mid} unreachable");
            return Ok(ChangeLocation::NoChanges);
        }
    };

    if mid_snapshot.differs_from(&hi_snapshot, filter) {
        bisect(reader, account, filter, mid, mid_snapshot, hi, hi_snapshot).await
    } else {
        bisect(reader, account, filter, lo, lo_snapshot, mid, mid_snapshot).await
    }
}

/// Read the midpoint snapshot, retrying at `mid+1, mid+2, ...` (bounded,
/// capped at `hi`) when the archival node reports it missing. Returns
/// `Ok(None)` when the retry budget is exhausted without success, signalling
/// the caller to abandon the interval rather than fail the whole search.
async fn read_mid_with_forward_retreat(
    reader: &SnapshotReader,
    account: &str,
    filter: &AssetFilter,
    mid: u64,
    hi: u64,
) -> Result<Option<Snapshot>, SnapshotError> {
    let mut attempt = 0;
    let mut current = mid;
    loop {
        match reader.read(account, current, filter).await {
            Ok(snapshot) => return Ok(Some(snapshot)),
            Err(SnapshotError::MissingBlock(_))
                if attempt < MAX_MISSING_BLOCK_RETRIES && current < hi =>
            {
                attempt += 1;
                current += 1;
                log::debug!("block {current} unavailable mid-search, probing forward (attempt {attempt})");
            }
            Err(SnapshotError::MissingBlock(_)) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
}
