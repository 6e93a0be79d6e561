//! Synchronization engine mirroring hledger-web ledgers into a local store.
//!
//! The engine fetches remote ledger state across incompatible hledger-web JSON API versions,
//! validates the double-entry invariants of every transaction, and reconciles the result into
//! local storage with generation-stamped upserts and purges. `sync::LedgerSyncOrchestrator` is
//! the entry point; `remote::HledgerClient` and `sync::LocalStore` are the production
//! collaborators it is usually wired to.

pub mod config;
pub mod model;
pub mod remote;
pub mod sync;
pub mod utils;

pub use config::{AppConfig, ConfigError};
pub use sync::{LedgerSyncOrchestrator, SyncError, SyncResult, SyncState};
