//! Error taxonomy.
//!
//! Transient, missing-block, account-absent, parse-failure and fatal errors
//! are distinguished as separate variants so callers can apply a propagation
//! policy (skip, record, or raise) by matching on the variant instead of
//! inspecting string contents.

use thiserror::Error;

/// Errors raised while reading a point-in-time balance snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The archival node reports this block height is unavailable (garbage
    /// collected or never existed). Propagates without being cached.
    #[error("block {0} is not available at the archival node")]
    MissingBlock(u64),

    /// The account did not exist at this block height.
    #[error("account {account} did not exist at block {block}")]
    AccountAbsent { account: String, block: u64 },

    /// Any other RPC failure (network, deserialization, contract panic).
    #[error("RPC error querying {0}: {1}")]
    Rpc(&'static str, String),

    /// Cooperative cancellation was observed mid-read.
    #[error("cancelled")]
    Cancelled,
}

impl SnapshotError {
    /// True for the two classified conditions callers must distinguish
    /// from a generic RPC failure.
    pub fn is_missing_block(&self) -> bool {
        matches!(self, SnapshotError::MissingBlock(_))
    }

    pub fn is_account_absent(&self) -> bool {
        matches!(self, SnapshotError::AccountAbsent { .. })
    }
}

/// Errors raised while fetching full block data and its RPC collaborators.
#[derive(Debug, Error)]
pub enum BlockFetchError {
    #[error("block {0} is not available at the archival node")]
    MissingBlock(u64),

    #[error("RPC error fetching block {0}: {1}")]
    Rpc(u64, String),
}

/// Errors raised while reconciling an account's full transaction history.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    BlockFetch(#[from] BlockFetchError),

    /// A programmer invariant was violated — malformed history, duplicate
    /// block keys, or similar. Fatal; propagates to the caller rather than
    /// being absorbed.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    /// Cooperative cancellation was observed mid-phase; the caller should
    /// persist whatever has been completed and return cleanly.
    #[error("cancelled")]
    Cancelled,
}

/// A non-fatal warning surfaced while parsing a single log or action.
/// Absence of a transfer does not contradict a detected balance change —
/// parse failures are collected for diagnostics, never propagated as
/// errors.
#[derive(Debug, Clone)]
pub struct ParseWarning {
    pub context: String,
    pub message: String,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.context, self.message)
    }
}
