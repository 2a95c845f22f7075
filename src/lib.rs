//! Reconstructs a gap-free, verifiable transaction ledger for a single NEAR
//! account from nothing but point-in-time balance queries against an
//! archival RPC node.

pub mod amount;
pub mod asset;
pub mod attributor;
pub mod balance;
pub mod block;
pub mod cancellation;
pub mod change;
pub mod config;
pub mod error;
pub mod hints;
pub mod history;
pub mod metadata;
pub mod reconciler;
pub mod rpc_client;
pub mod search;
pub mod snapshot;
pub mod staking_observer;
pub mod transfers;

pub use amount::Amount;
pub use asset::AssetId;
pub use config::ReconcilerConfig;
pub use history::{History, TransactionEntry, TransferDetail};
pub use reconciler::{FileHistorySink, HistorySink, Reconciler, ScanDirection};
pub use rpc_client::{NearClient, RpcNearClient};
pub use snapshot::{AssetFilter, Snapshot};
