//! Observable state of ledger synchronization.
//!
//! This module defines the state machine every sync run moves through, the progress and result
//! payloads it carries, and the channel that publishes state changes. Observers subscribe to a
//! `tokio::sync::watch` receiver: any number of them can watch the same profile, late subscribers
//! see the current state immediately, and none of them can influence the run.
//!
//! None of these values are persisted.

use crate::sync::SyncError;
use tokio::sync::watch;

/// How far a running sync has come
#[derive(Debug, Clone, PartialEq)]
pub enum SyncProgress {
    /// The run has been accepted and nothing has been fetched yet
    Starting,
    /// A step with a known amount of work
    Running {
        current: usize,
        total: usize,
        message: String,
    },
    /// A step whose size is not known yet, e.g. waiting on the server
    Indeterminate { message: String },
}

impl SyncProgress {
    pub fn running(current: usize, total: usize, message: impl Into<String>) -> Self {
        SyncProgress::Running {
            current,
            total,
            message: message.into(),
        }
    }

    pub fn indeterminate(message: impl Into<String>) -> Self {
        SyncProgress::Indeterminate {
            message: message.into(),
        }
    }
}

/// A fetched transaction that failed validation and was left out of the run
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTransaction {
    pub ledger_id: u64,
    pub reasons: Vec<String>,
}

/// Summary of a completed sync run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncResult {
    pub transaction_count: usize,
    pub account_count: usize,
    pub duration_ms: u64,
    pub skipped: Vec<SkippedTransaction>,
    pub purged_accounts: u64,
    pub purged_transactions: u64,
}

/// State of the sync engine for one profile
#[derive(Debug, Clone, Default)]
pub enum SyncState {
    #[default]
    Idle,
    InProgress(SyncProgress),
    Completed(SyncResult),
    Failed(SyncError),
    Cancelled,
}

impl SyncState {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, SyncState::InProgress(_))
    }

    /// Completed, failed and cancelled runs are terminal; a new run may start from any of them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncState::Completed(_) | SyncState::Failed(_) | SyncState::Cancelled
        )
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::InProgress(_) => "in progress",
            SyncState::Completed(_) => "completed",
            SyncState::Failed(_) => "failed",
            SyncState::Cancelled => "cancelled",
        }
    }
}

/// Publishing side of one profile's state stream.
#[derive(Debug, Clone)]
pub struct StateChannel {
    sender: watch::Sender<SyncState>,
}

impl StateChannel {
    /// Create a new channel starting at `Idle`.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(SyncState::Idle);
        Self { sender }
    }

    /// Publish a new state to every observer.
    ///
    /// Publishing never fails; a channel nobody watches simply keeps the latest value.
    pub fn publish(&self, state: SyncState) {
        self.sender.send_replace(state);
    }

    /// Publish a progress update for a running sync.
    pub fn progress(&self, progress: SyncProgress) {
        self.publish(SyncState::InProgress(progress));
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.sender.subscribe()
    }

    /// The most recently published state.
    pub fn current(&self) -> SyncState {
        self.sender.borrow().clone()
    }
}

impl Default for StateChannel {
    fn default() -> Self {
        Self::new()
    }
}
