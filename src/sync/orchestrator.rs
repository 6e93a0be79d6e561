//! Ledger sync orchestrator and integration point for all sync services.
//!
//! This module defines the `LedgerSyncOrchestrator`, which coordinates every component involved in
//! mirroring a remote hledger-web ledger into local storage. For one profile it:
//! - Resolves the server version (pinned, detected, or previously cached)
//! - Selects the protocol adapter for that version
//! - Fetches and adapts accounts, completing the account tree, and reconciles them
//! - Fetches and adapts transactions, validates them, and reconciles the valid ones
//! - Publishes every state transition to any number of observers
//!
//! At most one run per profile is in flight. Runs stop cooperatively when cancelled, checking the
//! signal between steps, at batch boundaries, and while waiting on the network. A run whose future
//! is dropped counts as cancelled and frees its profile for the next run. Storage is only
//! ever changed by whole reconcile passes, so a cancelled or failed run leaves each entity kind
//! either fully at its previous generation or fully at the new one. The orchestrator never
//! retries; the retryability of a failure is left to the caller.

use crate::model::{Account, Profile, Transaction};
use crate::remote::{LedgerTransport, ServerVersion, VersionDetector};
use crate::sync::SyncError;
use crate::sync::{
    cancellation::CancellationToken,
    events::{StateChannel, SyncProgress, SyncResult, SyncState},
    progress_tracker::SyncProgressTracker,
    reconciler::Reconciler,
    repositories::LedgerStore,
    strategies::select_adapter,
    validator::{BalanceValidator, ValidationResult},
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default number of entities processed between progress updates and cancellation checks
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Tunables of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Entities per batch; progress is published and cancellation checked after each batch
    pub batch_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Per-profile bookkeeping: the observable state and the token of the run in flight, if any
#[derive(Default)]
struct Session {
    channel: StateChannel,
    cancel: Option<CancellationToken>,
}

type Sessions = Arc<Mutex<HashMap<i64, Session>>>;

fn lock(sessions: &Sessions) -> MutexGuard<'_, HashMap<i64, Session>> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ownership of the in-flight flag of one profile.
///
/// `finish` releases the flag with the run's terminal state. A guard dropped before that, because
/// the run's future was dropped or its task aborted, cancels the token, releases the flag and
/// publishes `Cancelled`.
struct SyncGuard {
    sessions: Sessions,
    profile_id: i64,
    token: CancellationToken,
    finished: bool,
}

impl SyncGuard {
    fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn finish(mut self, state: SyncState) {
        self.release(state);
        self.finished = true;
    }

    fn release(&self, state: SyncState) {
        let mut sessions = lock(&self.sessions);
        let session = sessions.entry(self.profile_id).or_default();
        session.cancel = None;
        session.channel.publish(state);
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(
            "Sync of profile {} was abandoned before finishing",
            self.profile_id
        );
        self.token.cancel();
        self.release(SyncState::Cancelled);
    }
}

/// Main sync orchestrator.
///
/// Shared by every caller (wrap it in an `Arc` to use `start_sync`). It owns no ledger data:
/// everything fetched goes through the reconciler into the store.
pub struct LedgerSyncOrchestrator {
    transport: Arc<dyn LedgerTransport>,
    detector: Arc<dyn VersionDetector>,
    store: Arc<dyn LedgerStore>,
    reconciler: Reconciler,
    validator: BalanceValidator,
    settings: SyncSettings,
    sessions: Sessions,
}

impl LedgerSyncOrchestrator {
    pub fn new(
        transport: Arc<dyn LedgerTransport>,
        detector: Arc<dyn VersionDetector>,
        store: Arc<dyn LedgerStore>,
        settings: SyncSettings,
    ) -> Self {
        let batch_size = settings.batch_size.max(1);
        Self {
            transport,
            detector,
            reconciler: Reconciler::new(store.clone()),
            store,
            validator: BalanceValidator::new(),
            settings: SyncSettings { batch_size },
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a sync of `profile_id` on a background task.
    ///
    /// Returns `None` without doing anything when a sync of that profile is already in flight.
    /// The handle resolves to the terminal state, which is also published to observers. Aborting
    /// the handle cancels the run.
    pub fn start_sync(self: &Arc<Self>, profile_id: i64) -> Option<JoinHandle<SyncState>> {
        let guard = self.try_begin(profile_id)?;
        let orchestrator = Arc::clone(self);
        Some(tokio::spawn(async move {
            orchestrator.drive(profile_id, guard).await
        }))
    }

    /// Run a sync of `profile_id` on the current task and return its terminal state.
    ///
    /// Returns `None` when a sync of that profile is already in flight. Dropping the returned
    /// future cancels the run.
    pub async fn sync(&self, profile_id: i64) -> Option<SyncState> {
        let guard = self.try_begin(profile_id)?;
        Some(self.drive(profile_id, guard).await)
    }

    /// Request cancellation of the sync in flight for `profile_id`.
    ///
    /// Returns whether there was a run to cancel. Requesting it more than once is harmless.
    pub fn cancel_sync(&self, profile_id: i64) -> bool {
        match self.sessions().get(&profile_id).and_then(|s| s.cancel.as_ref()) {
            Some(token) => {
                info!("Cancellation requested for profile {}", profile_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Observe the state of `profile_id`. The receiver starts at the current state.
    pub fn subscribe(&self, profile_id: i64) -> watch::Receiver<SyncState> {
        self.sessions()
            .entry(profile_id)
            .or_default()
            .channel
            .subscribe()
    }

    /// Latest state of `profile_id`, `Idle` if it was never synced.
    pub fn state(&self, profile_id: i64) -> SyncState {
        self.sessions()
            .get(&profile_id)
            .map(|s| s.channel.current())
            .unwrap_or_default()
    }

    pub fn is_syncing(&self, profile_id: i64) -> bool {
        self.sessions()
            .get(&profile_id)
            .is_some_and(|s| s.cancel.is_some())
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<i64, Session>> {
        lock(&self.sessions)
    }

    /// Check-and-set of the in-flight flag, entering `InProgress(Starting)` on success.
    fn try_begin(&self, profile_id: i64) -> Option<SyncGuard> {
        let mut sessions = self.sessions();
        let session = sessions.entry(profile_id).or_default();
        if session.cancel.is_some() {
            info!(
                "Sync already in progress for profile {}, ignoring request",
                profile_id
            );
            return None;
        }
        let token = CancellationToken::new();
        session.cancel = Some(token.clone());
        session.channel.progress(SyncProgress::Starting);
        Some(SyncGuard {
            sessions: self.sessions.clone(),
            profile_id,
            token,
            finished: false,
        })
    }

    fn channel(&self, profile_id: i64) -> StateChannel {
        self.sessions().entry(profile_id).or_default().channel.clone()
    }

    /// Run the pipeline and publish its terminal state.
    async fn drive(&self, profile_id: i64, guard: SyncGuard) -> SyncState {
        let channel = self.channel(profile_id);
        let state = match self.run(profile_id, guard.token(), &channel).await {
            Ok(result) => {
                info!(
                    "Sync of profile {} completed: {} accounts, {} transactions, {} skipped in {} ms",
                    profile_id,
                    result.account_count,
                    result.transaction_count,
                    result.skipped.len(),
                    result.duration_ms
                );
                SyncState::Completed(result)
            }
            Err(SyncError::Cancelled) => {
                info!("Sync of profile {} cancelled", profile_id);
                SyncState::Cancelled
            }
            Err(e) => {
                error!(
                    "Sync of profile {} failed (retryable: {}): {}",
                    profile_id,
                    e.is_retryable(),
                    e
                );
                SyncState::Failed(e)
            }
        };

        guard.finish(state.clone());
        state
    }

    async fn run(
        &self,
        profile_id: i64,
        token: &CancellationToken,
        channel: &StateChannel,
    ) -> Result<SyncResult, SyncError> {
        let profile = self
            .store
            .profile(profile_id)
            .await?
            .ok_or_else(|| SyncError::unknown(format!("Profile {} does not exist", profile_id)))?;
        info!("Starting sync of profile {} ({})", profile.name, profile.url);
        let mut tracker = SyncProgressTracker::new();

        token.check()?;
        channel.progress(SyncProgress::indeterminate("Detecting server version"));
        let version = self.resolve_version(&profile, token).await?;
        let adapter = select_adapter(version)?;
        info!(
            "Using {} adapter for hledger-web {} on profile {}",
            adapter.name(),
            version,
            profile.name
        );

        token.check()?;
        channel.progress(SyncProgress::indeterminate("Fetching accounts"));
        let raw = token
            .run_until_cancelled(self.transport.fetch(&profile, adapter.accounts_resource()))
            .await??;
        let fetched = adapter.parse_accounts(&raw)?;
        debug!("Adapted {} accounts", fetched.len());
        let accounts = self
            .complete_account_tree(fetched, token, channel, &mut tracker)
            .await?;

        token.check()?;
        channel.progress(SyncProgress::indeterminate("Storing accounts"));
        let outcome = self.reconciler.reconcile(profile_id, accounts).await?;
        tracker.record_reconcile(outcome);

        token.check()?;
        channel.progress(SyncProgress::indeterminate("Fetching transactions"));
        let raw = token
            .run_until_cancelled(
                self.transport
                    .fetch(&profile, adapter.transactions_resource()),
            )
            .await??;
        let fetched = adapter.parse_transactions(&raw)?;
        debug!("Adapted {} transactions", fetched.len());
        let transactions = self
            .validate_transactions(fetched, token, channel, &mut tracker)
            .await?;

        token.check()?;
        channel.progress(SyncProgress::indeterminate("Storing transactions"));
        let outcome = self.reconciler.reconcile(profile_id, transactions).await?;
        tracker.record_reconcile(outcome);

        info!(
            "Sync of profile {} finished: {}",
            profile.name,
            tracker.get_stats().summary()
        );
        Ok(tracker.into_result())
    }

    /// Pinned version, else a fresh detection (cached on the profile), else the cached one.
    async fn resolve_version(
        &self,
        profile: &Profile,
        token: &CancellationToken,
    ) -> Result<ServerVersion, SyncError> {
        if let Some(pinned) = profile.api_version.pinned_version() {
            info!(
                "Profile {} is pinned to API {}, skipping detection",
                profile.name, pinned
            );
            return Ok(pinned);
        }

        match token.run_until_cancelled(self.detector.detect(profile)).await? {
            Ok(version) => {
                if profile.detected_version != Some(version) {
                    self.store.save_detected_version(profile.id, version).await?;
                }
                Ok(version)
            }
            Err(e) => match profile.detected_version {
                Some(cached) => {
                    warn!(
                        "Version detection for profile {} failed ({}), using cached {}",
                        profile.name, e, cached
                    );
                    Ok(cached)
                }
                None => Err(e),
            },
        }
    }

    /// Add every missing ancestor of the fetched accounts, batch by batch.
    async fn complete_account_tree(
        &self,
        fetched: Vec<Account>,
        token: &CancellationToken,
        channel: &StateChannel,
        tracker: &mut SyncProgressTracker,
    ) -> Result<Vec<Account>, SyncError> {
        let total = fetched.len();
        let mut tree: BTreeMap<String, Account> = BTreeMap::new();
        let mut done = 0;
        let mut remaining = fetched.into_iter();

        loop {
            token.check()?;
            let batch: Vec<Account> = remaining.by_ref().take(self.settings.batch_size).collect();
            if batch.is_empty() {
                break;
            }
            done += batch.len();

            for account in batch {
                for ancestor in account.ancestor_names() {
                    if !tree.contains_key(ancestor) {
                        tree.insert(ancestor.to_string(), Account::new(ancestor));
                    }
                }
                tree.insert(account.name.clone(), account);
            }
            channel.progress(tracker.batch_progress(done, total, "accounts"));
            tokio::task::yield_now().await;
        }

        if tree.len() > total {
            debug!("Synthesised {} parent accounts", tree.len() - total);
        }
        tracker.record_accounts(tree.len());
        Ok(tree.into_values().collect())
    }

    /// Keep the transactions that pass validation, recording the rest as skipped.
    ///
    /// Fails with `SyncError::Validation` when there was at least one transaction and none passed.
    async fn validate_transactions(
        &self,
        fetched: Vec<Transaction>,
        token: &CancellationToken,
        channel: &StateChannel,
        tracker: &mut SyncProgressTracker,
    ) -> Result<Vec<Transaction>, SyncError> {
        let total = fetched.len();
        let mut valid = Vec::with_capacity(total);
        let mut remaining = fetched.into_iter();

        loop {
            token.check()?;
            let batch: Vec<Transaction> =
                remaining.by_ref().take(self.settings.batch_size).collect();
            if batch.is_empty() {
                break;
            }

            for transaction in batch {
                match self.validator.validate(&transaction) {
                    ValidationResult::Success => {
                        tracker.record_valid_transaction();
                        valid.push(transaction);
                    }
                    ValidationResult::Error(reasons) => {
                        tracker.record_skipped_transaction(transaction.ledger_id, reasons);
                    }
                }
            }
            channel.progress(tracker.batch_progress(
                tracker.transactions_checked(),
                total,
                "transactions",
            ));
            tracker.log_progress(total);
            tokio::task::yield_now().await;
        }

        if total > 0 && valid.is_empty() {
            return Err(SyncError::validation(
                "transactions",
                format!("all {} fetched transactions failed validation", total),
            ));
        }
        Ok(valid)
    }
}
