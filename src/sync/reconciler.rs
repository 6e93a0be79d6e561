//! Generation-based reconciliation of fetched entities into local storage.
//!
//! Every sync pass stamps what it fetched with a fresh generation number and then drops whatever
//! still carries an older one. Nothing needs to be diffed: an entity the server no longer returns
//! simply never gets the new stamp. Each entity kind keeps its own generation counter per profile,
//! and a whole pass runs inside one store transaction, so readers see either the old mirror or
//! the new one.

use crate::sync::SyncError;
use crate::sync::repositories::{EntityKind, LedgerStore, SyncEntity};
use std::sync::Arc;
use tracing::{debug, info};

/// What one reconcile pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub kind: EntityKind,
    /// Generation stamped on every entity of this pass
    pub generation: u64,
    pub inserted: usize,
    pub updated: usize,
    pub purged: u64,
}

/// Merges a complete server snapshot of one entity kind into storage.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Reconcile `fetched` as the full current set of `E` for the profile.
    ///
    /// Upserts every entity under the next generation, keeping local-only fields of entities
    /// already stored, then purges entities left on an older generation and records the new one.
    /// Any failure leaves storage untouched.
    pub async fn reconcile<E: SyncEntity>(
        &self,
        profile_id: i64,
        fetched: Vec<E>,
    ) -> Result<ReconcileOutcome, SyncError> {
        let mut tx = E::begin(self.store.as_ref()).await?;

        let generation = tx.generation(profile_id).await? + 1;
        debug!(
            "Reconciling {} {} for profile {} as generation {}",
            fetched.len(),
            E::KIND,
            profile_id,
            generation
        );

        let mut inserted = 0;
        let mut updated = 0;
        for mut entity in fetched {
            match tx.find(profile_id, &entity.key()).await? {
                Some(existing) => {
                    entity.adopt_local_state(&existing);
                    updated += 1;
                }
                None => inserted += 1,
            }
            entity.set_generation(generation);
            tx.upsert(profile_id, entity).await?;
        }

        let purged = tx.purge_older_than(profile_id, generation).await?;
        tx.set_generation(profile_id, generation).await?;
        tx.commit().await?;

        info!(
            "Reconciled {} for profile {}: generation {}, {} new, {} updated, {} purged",
            E::KIND,
            profile_id,
            generation,
            inserted,
            updated,
            purged
        );

        Ok(ReconcileOutcome {
            kind: E::KIND,
            generation,
            inserted,
            updated,
            purged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Account, Transaction, TransactionLine};
    use crate::sync::repositories::LocalStore;
    use chrono::NaiveDate;

    fn setup() -> (Arc<LocalStore>, Reconciler) {
        let store = Arc::new(LocalStore::in_memory());
        let reconciler = Reconciler::new(store.clone());
        (store, reconciler)
    }

    fn accounts(names: &[&str]) -> Vec<Account> {
        names.iter().map(|name| Account::new(*name)).collect()
    }

    fn transaction(ledger_id: u64, description: &str) -> Transaction {
        Transaction::new(
            ledger_id,
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            description,
        )
        .with_line(TransactionLine::new("Assets:Cash", 1.0, "USD"))
        .with_line(TransactionLine::new("Income", -1.0, "USD"))
    }

    fn names(accounts: &[Account]) -> Vec<&str> {
        accounts.iter().map(|a| a.name.as_str()).collect()
    }

    #[tokio::test]
    async fn entities_missing_from_the_server_are_purged() {
        let (store, reconciler) = setup();

        let first = reconciler
            .reconcile(1, accounts(&["A", "B", "C"]))
            .await
            .unwrap();
        assert_eq!(first.generation, 1);
        assert_eq!(first.inserted, 3);

        let second = reconciler.reconcile(1, accounts(&["A", "C"])).await.unwrap();
        assert_eq!(second.generation, 2);
        assert_eq!(second.updated, 2);
        assert_eq!(second.purged, 1);

        let stored = store.accounts(1).await.unwrap();
        assert_eq!(names(&stored), vec!["A", "C"]);
        assert!(stored.iter().all(|a| a.generation == 2));
    }

    #[tokio::test]
    async fn repeating_a_sync_purges_nothing() {
        let (store, reconciler) = setup();
        reconciler.reconcile(1, accounts(&["A", "B"])).await.unwrap();
        let before = store.accounts(1).await.unwrap();

        let again = reconciler.reconcile(1, accounts(&["A", "B"])).await.unwrap();
        assert_eq!(again.purged, 0);

        let after = store.accounts(1).await.unwrap();
        assert_eq!(names(&before), names(&after));
    }

    #[tokio::test]
    async fn empty_snapshot_clears_the_profile() {
        let (store, reconciler) = setup();
        reconciler.reconcile(1, accounts(&["A", "B"])).await.unwrap();
        let outcome = reconciler.reconcile::<Account>(1, Vec::new()).await.unwrap();
        assert_eq!(outcome.purged, 2);
        assert!(store.accounts(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_flags_survive_a_refresh() {
        let (store, reconciler) = setup();
        reconciler.reconcile(1, accounts(&["Assets"])).await.unwrap();

        let mut tx = store.begin_accounts().await.unwrap();
        let mut assets = tx.find(1, &"Assets".to_string()).await.unwrap().unwrap();
        assets.expanded = true;
        assets.visible = false;
        tx.upsert(1, assets).await.unwrap();
        tx.commit().await.unwrap();

        let mut refreshed = Account::new("Assets");
        refreshed.add_amount("USD", 12.5);
        reconciler.reconcile(1, vec![refreshed]).await.unwrap();

        let stored = store.accounts(1).await.unwrap();
        assert!(stored[0].expanded);
        assert!(!stored[0].visible);
        assert_eq!(stored[0].amount_for("USD"), Some(12.5));
    }

    #[tokio::test]
    async fn profiles_and_kinds_have_separate_generations() {
        let (store, reconciler) = setup();
        reconciler.reconcile(1, accounts(&["A"])).await.unwrap();
        reconciler.reconcile(1, accounts(&["A"])).await.unwrap();
        reconciler.reconcile(2, accounts(&["Z"])).await.unwrap();

        let outcome = reconciler
            .reconcile(1, vec![transaction(7, "Salary")])
            .await
            .unwrap();
        assert_eq!(outcome.kind, EntityKind::Transactions);
        assert_eq!(outcome.generation, 1);

        assert_eq!(names(&store.accounts(2).await.unwrap()), vec!["Z"]);
        assert_eq!(store.accounts(1).await.unwrap()[0].generation, 2);
    }

    #[tokio::test]
    async fn transactions_keep_their_local_id() {
        let (store, reconciler) = setup();
        reconciler
            .reconcile(1, vec![transaction(1, "Rent"), transaction(2, "Food")])
            .await
            .unwrap();
        let original = store.transactions(1).await.unwrap();

        reconciler
            .reconcile(1, vec![transaction(2, "Groceries")])
            .await
            .unwrap();

        let stored = store.transactions(1).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].ledger_id, 2);
        assert_eq!(stored[0].description, "Groceries");
        assert_eq!(stored[0].id, original[1].id);
    }
}
