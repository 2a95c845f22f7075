//! Configuration.
//!
//! Endpoint selection, rate limiting and retry policy for the RPC
//! transport itself are the caller's concern (`near_api::NetworkConfig`,
//! baked into whatever `NearClient` the caller hands the reconciler) —
//! this module only holds the handful of knobs the reconciliation
//! algorithm itself needs.

/// Cross-block lookahead bound for receipt-chain following: a
/// transfer whose effect lands in a receipt executed a few blocks after the
/// originating one is still attributed to the same logical transfer, but the
/// search is bounded so a stuck receipt chain can't run away.
pub const DEFAULT_MAX_LOOKAHEAD_BLOCKS: u64 = 3;

/// NEAR mainnet epoch length in blocks (~12h), overridable for testnets.
pub const DEFAULT_EPOCH_LENGTH_BLOCKS: u64 = 43_200;

/// How many snapshot cache entries accumulate before the reconciler
/// considers flushing progress to its [`crate::reconciler::HistorySink`].
pub const DEFAULT_CACHE_FLUSH_INTERVAL: usize = 10;

/// The initial discovery window width, and the growth factor/cap used when
/// expanding it, for the "is there a change past the last known block"
/// search.
pub const DEFAULT_DISCOVERY_WINDOW_BLOCKS: u64 = 1_000_000;
pub const DEFAULT_DISCOVERY_WINDOW_GROWTH: u64 = 2;
pub const DEFAULT_DISCOVERY_WINDOW_MAX_MULTIPLIER: u64 = 32;

/// Tunable knobs for a reconciliation run. Every field defaults to the
/// values above.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub max_lookahead_blocks: u64,
    pub epoch_length_blocks: u64,
    pub cache_flush_interval: usize,
    pub discovery_window_blocks: u64,
    pub discovery_window_growth: u64,
    pub discovery_window_max_multiplier: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            max_lookahead_blocks: DEFAULT_MAX_LOOKAHEAD_BLOCKS,
            epoch_length_blocks: DEFAULT_EPOCH_LENGTH_BLOCKS,
            cache_flush_interval: DEFAULT_CACHE_FLUSH_INTERVAL,
            discovery_window_blocks: DEFAULT_DISCOVERY_WINDOW_BLOCKS,
            discovery_window_growth: DEFAULT_DISCOVERY_WINDOW_GROWTH,
            discovery_window_max_multiplier: DEFAULT_DISCOVERY_WINDOW_MAX_MULTIPLIER,
        }
    }
}

impl ReconcilerConfig {
    pub fn with_max_lookahead_blocks(mut self, blocks: u64) -> Self {
        self.max_lookahead_blocks = blocks;
        self
    }

    pub fn with_epoch_length_blocks(mut self, blocks: u64) -> Self {
        self.epoch_length_blocks = blocks;
        self
    }
}
