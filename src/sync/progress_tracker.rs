//! Progress tracking for ledger synchronization.
//!
//! This module provides the `SyncProgressTracker`, which records what one sync run has done so
//! far: accounts adapted, transactions validated and skipped, and the outcome of each reconcile
//! pass. It produces progress snapshots for observers and assembles the final `SyncResult`.

use crate::sync::events::{SkippedTransaction, SyncProgress, SyncResult};
use crate::sync::reconciler::ReconcileOutcome;
use crate::sync::repositories::EntityKind;
use std::time::Instant;
use tracing::{info, warn};

/// Service for tracking the progress of one sync run
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    /// When the run started
    started: Instant,
    /// Accounts handed to the reconciler
    accounts_processed: usize,
    /// Transactions checked by the validator so far
    transactions_checked: usize,
    /// Transactions that failed validation
    skipped: Vec<SkippedTransaction>,
    /// Reconcile outcome per entity kind, once that kind is done
    accounts_outcome: Option<ReconcileOutcome>,
    transactions_outcome: Option<ReconcileOutcome>,
}

impl SyncProgressTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            accounts_processed: 0,
            transactions_checked: 0,
            skipped: Vec::new(),
            accounts_outcome: None,
            transactions_outcome: None,
        }
    }

    pub fn record_accounts(&mut self, count: usize) {
        self.accounts_processed += count;
    }

    pub fn record_valid_transaction(&mut self) {
        self.transactions_checked += 1;
    }

    pub fn record_skipped_transaction(&mut self, ledger_id: u64, reasons: Vec<String>) {
        self.transactions_checked += 1;
        warn!(
            "Skipping transaction {}: {}",
            ledger_id,
            reasons.join("; ")
        );
        self.skipped.push(SkippedTransaction { ledger_id, reasons });
    }

    pub fn record_reconcile(&mut self, outcome: ReconcileOutcome) {
        match outcome.kind {
            EntityKind::Accounts => self.accounts_outcome = Some(outcome),
            EntityKind::Transactions => self.transactions_outcome = Some(outcome),
        }
    }

    pub fn transactions_checked(&self) -> usize {
        self.transactions_checked
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Progress snapshot for a batch boundary
    pub fn batch_progress(&self, current: usize, total: usize, what: &str) -> SyncProgress {
        SyncProgress::running(
            current,
            total,
            format!("Processed {} of {} {}", current, total, what),
        )
    }

    /// Log progress of the transaction validation step
    pub fn log_progress(&self, total: usize) {
        info!(
            "Sync progress: {} accounts, {}/{} transactions checked, {} skipped",
            self.accounts_processed,
            self.transactions_checked,
            total,
            self.skipped.len()
        );
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            accounts_processed: self.accounts_processed,
            transactions_checked: self.transactions_checked,
            transactions_skipped: self.skipped.len(),
            account_generation: self.accounts_outcome.map(|o| o.generation),
            transaction_generation: self.transactions_outcome.map(|o| o.generation),
            elapsed_ms: self.elapsed_ms(),
        }
    }

    /// Assemble the result of a completed run.
    pub fn into_result(self) -> SyncResult {
        let duration_ms = self.elapsed_ms();
        SyncResult {
            transaction_count: self.transactions_checked - self.skipped.len(),
            account_count: self.accounts_processed,
            duration_ms,
            purged_accounts: self.accounts_outcome.map_or(0, |o| o.purged),
            purged_transactions: self.transactions_outcome.map_or(0, |o| o.purged),
            skipped: self.skipped,
        }
    }
}

impl Default for SyncProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about a sync run
#[derive(Debug, Clone)]
pub struct SyncStats {
    pub accounts_processed: usize,
    pub transactions_checked: usize,
    pub transactions_skipped: usize,
    pub account_generation: Option<u64>,
    pub transaction_generation: Option<u64>,
    pub elapsed_ms: u64,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        format!(
            "{} accounts (generation {}), {} transactions (generation {}){} in {} ms",
            self.accounts_processed,
            generation_label(self.account_generation),
            self.transactions_checked - self.transactions_skipped,
            generation_label(self.transaction_generation),
            if self.transactions_skipped == 0 {
                String::new()
            } else {
                format!(", {} skipped", self.transactions_skipped)
            },
            self.elapsed_ms
        )
    }
}

fn generation_label(generation: Option<u64>) -> String {
    generation.map_or_else(|| "-".to_string(), |g| g.to_string())
}
