//! Ledger Synchronization Module
//!
//! This module provides the core logic for mirroring a remote hledger-web ledger into local storage.
//! It is composed of several submodules, each responsible for one aspect of the sync process:
//!
//! - `orchestrator`: The entry point. Runs one sync per profile, wiring together all other services.
//! - `strategies`: Protocol adapters, one per hledger-web release range, turning raw JSON into the canonical model.
//! - `validator`: Double-entry balance checks applied to every fetched transaction.
//! - `reconciler`: Generation-stamped upsert and purge of fetched entities.
//! - `repositories`: The storage contract the reconciler writes through, plus the local store.
//! - `events`: Observable sync state, progress and results.
//! - `progress_tracker`: Per-run counters and result assembly.
//! - `cancellation`: Cooperative, idempotent cancellation of a running sync.
//! - `error`: The failure taxonomy and its retry verdicts.

/// Cooperative cancellation signal
pub mod cancellation;
/// Sync failure taxonomy
pub mod error;
/// Observable sync state
pub mod events;
/// Main coordinator for the sync process
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Generation-based reconciliation
pub mod reconciler;
/// Storage contract and local store
pub mod repositories;
/// Versioned protocol adapters
pub mod strategies;
/// Balance validation
pub mod validator;

pub use cancellation::CancellationToken;
pub use error::SyncError;
pub use events::{SkippedTransaction, StateChannel, SyncProgress, SyncResult, SyncState};
pub use orchestrator::*;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use repositories::{
    EntityKind, LedgerStore, LocalStore, StoreError, StoreTransaction, SyncEntity,
};
pub use strategies::{FlatBalanceAdapter, PeriodBalanceAdapter, ProtocolAdapter, select_adapter};
pub use validator::{BalanceValidator, ValidationResult};
