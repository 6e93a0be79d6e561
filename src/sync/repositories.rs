use crate::model::{Account, Profile, Transaction};
use crate::remote::ServerVersion;
use crate::sync::SyncError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

/// Snapshot layout version written by `LocalStore`
const SNAPSHOT_VERSION: u32 = 1;

/// The two sync-owned entity kinds, each with its own generation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Accounts,
    Transactions,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Accounts => write!(f, "accounts"),
            EntityKind::Transactions => write!(f, "transactions"),
        }
    }
}

/// Storage failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Snapshot version {found} is not supported (expected {expected})")]
    IncompatibleSnapshot { found: u32, expected: u32 },
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::unknown_with(format!("Storage failure: {}", e), e)
    }
}

/// An entity the reconciler can merge into storage
#[async_trait::async_trait]
pub trait SyncEntity: Clone + Send + Sync + 'static {
    /// Which generation sequence this entity belongs to
    const KIND: EntityKind;

    /// Natural key within a profile
    type Key: Ord + Clone + fmt::Debug + Send + Sync + 'static;

    fn key(&self) -> Self::Key;
    fn generation(&self) -> u64;
    fn set_generation(&mut self, generation: u64);

    /// Carry over purely local fields from the stored copy this entity replaces
    fn adopt_local_state(&mut self, existing: &Self);

    /// Open a write transaction for this entity kind
    async fn begin(store: &dyn LedgerStore) -> Result<Box<dyn StoreTransaction<Self>>, StoreError>;
}

#[async_trait::async_trait]
impl SyncEntity for Account {
    const KIND: EntityKind = EntityKind::Accounts;
    type Key = String;

    fn key(&self) -> String {
        self.name.clone()
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    fn adopt_local_state(&mut self, existing: &Self) {
        self.expanded = existing.expanded;
        self.visible = existing.visible;
    }

    async fn begin(store: &dyn LedgerStore) -> Result<Box<dyn StoreTransaction<Self>>, StoreError> {
        store.begin_accounts().await
    }
}

#[async_trait::async_trait]
impl SyncEntity for Transaction {
    const KIND: EntityKind = EntityKind::Transactions;
    type Key = u64;

    fn key(&self) -> u64 {
        self.ledger_id
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    fn adopt_local_state(&mut self, existing: &Self) {
        self.id = existing.id;
    }

    async fn begin(store: &dyn LedgerStore) -> Result<Box<dyn StoreTransaction<Self>>, StoreError> {
        store.begin_transactions().await
    }
}

/// Write transaction over one entity kind.
///
/// Nothing is visible to readers until `commit`; dropping the transaction discards it.
#[async_trait::async_trait]
pub trait StoreTransaction<E: SyncEntity>: Send {
    /// Stored generation for the profile, 0 if nothing was ever synced
    async fn generation(&mut self, profile_id: i64) -> Result<u64, StoreError>;
    async fn find(&mut self, profile_id: i64, key: &E::Key) -> Result<Option<E>, StoreError>;
    /// Insert or replace by natural key
    async fn upsert(&mut self, profile_id: i64, entity: E) -> Result<(), StoreError>;
    /// Delete every entity of the profile stamped below `generation`, returning the count
    async fn purge_older_than(&mut self, profile_id: i64, generation: u64)
    -> Result<u64, StoreError>;
    async fn set_generation(&mut self, profile_id: i64, generation: u64) -> Result<(), StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Storage collaborator of the sync engine
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn profile(&self, profile_id: i64) -> Result<Option<Profile>, StoreError>;
    async fn save_detected_version(
        &self,
        profile_id: i64,
        version: ServerVersion,
    ) -> Result<(), StoreError>;
    async fn begin_accounts(&self) -> Result<Box<dyn StoreTransaction<Account>>, StoreError>;
    async fn begin_transactions(&self)
    -> Result<Box<dyn StoreTransaction<Transaction>>, StoreError>;
    /// Committed accounts of a profile, ordered by name
    async fn accounts(&self, profile_id: i64) -> Result<Vec<Account>, StoreError>;
    /// Committed transactions of a profile, ordered by ledger id
    async fn transactions(&self, profile_id: i64) -> Result<Vec<Transaction>, StoreError>;
}

/// Rows and generation counters of one entity kind
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Table<K: Ord, E> {
    generations: BTreeMap<i64, u64>,
    rows: BTreeMap<i64, BTreeMap<K, E>>,
    #[serde(default)]
    next_id: i64,
}

impl<K: Ord, E> Default for Table<K, E> {
    fn default() -> Self {
        Self {
            generations: BTreeMap::new(),
            rows: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl<K: Ord, E: Clone> Table<K, E> {
    fn generation(&self, profile_id: i64) -> u64 {
        self.generations.get(&profile_id).copied().unwrap_or(0)
    }

    fn rows(&self, profile_id: i64) -> Vec<E> {
        self.rows
            .get(&profile_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn remove_profile(&mut self, profile_id: i64) {
        self.generations.remove(&profile_id);
        self.rows.remove(&profile_id);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreState {
    snapshot_version: u32,
    profiles: BTreeMap<i64, Profile>,
    accounts: Table<String, Account>,
    transactions: Table<u64, Transaction>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            snapshot_version: SNAPSHOT_VERSION,
            profiles: BTreeMap::new(),
            accounts: Table::default(),
            transactions: Table::default(),
        }
    }
}

/// What `LocalStore` writes to disk: the store state minus profile credentials
#[derive(Serialize)]
struct SnapshotView<'a> {
    snapshot_version: u32,
    profiles: BTreeMap<i64, Profile>,
    accounts: &'a Table<String, Account>,
    transactions: &'a Table<u64, Transaction>,
}

impl<'a> From<&'a StoreState> for SnapshotView<'a> {
    fn from(state: &'a StoreState) -> Self {
        let profiles = state
            .profiles
            .iter()
            .map(|(id, profile)| {
                let mut profile = profile.clone();
                profile.auth = None;
                (*id, profile)
            })
            .collect();
        Self {
            snapshot_version: state.snapshot_version,
            profiles,
            accounts: &state.accounts,
            transactions: &state.transactions,
        }
    }
}

/// One writer lock per entity kind
#[derive(Debug, Default)]
struct WriterLocks {
    accounts: Arc<Mutex<()>>,
    transactions: Arc<Mutex<()>>,
}

/// Binds an entity kind to its table and writer lock inside `LocalStore`
trait StoredEntity: SyncEntity {
    fn table(state: &StoreState) -> &Table<Self::Key, Self>;
    fn table_mut(state: &mut StoreState) -> &mut Table<Self::Key, Self>;
    fn writer(locks: &WriterLocks) -> Arc<Mutex<()>>;

    /// Hook run on every upsert, e.g. to hand out local ids
    fn on_upsert(&mut self, _next_id: &mut i64) {}
}

impl StoredEntity for Account {
    fn table(state: &StoreState) -> &Table<String, Account> {
        &state.accounts
    }

    fn table_mut(state: &mut StoreState) -> &mut Table<String, Account> {
        &mut state.accounts
    }

    fn writer(locks: &WriterLocks) -> Arc<Mutex<()>> {
        locks.accounts.clone()
    }
}

impl StoredEntity for Transaction {
    fn table(state: &StoreState) -> &Table<u64, Transaction> {
        &state.transactions
    }

    fn table_mut(state: &mut StoreState) -> &mut Table<u64, Transaction> {
        &mut state.transactions
    }

    fn writer(locks: &WriterLocks) -> Arc<Mutex<()>> {
        locks.transactions.clone()
    }

    fn on_upsert(&mut self, next_id: &mut i64) {
        if self.id.is_none() {
            *next_id += 1;
            self.id = Some(*next_id);
        }
    }
}

/// Local mirror of remote ledgers.
///
/// Data lives in memory. When opened on a path, the whole state is also written to a JSON
/// snapshot on every commit (temp file, then rename) before the commit becomes visible, and
/// loaded back on the next `open`. Profile credentials are kept in memory only and never reach
/// the snapshot.
///
/// A write transaction holds its kind's writer lock until it is committed or dropped, so two
/// reconcile passes over the same kind never overlap while the other kind proceeds freely.
/// Transactions work on a private copy of their table, which readers never see half-done.
#[derive(Clone)]
pub struct LocalStore {
    state: Arc<RwLock<StoreState>>,
    writers: Arc<WriterLocks>,
    snapshot_path: Option<PathBuf>,
}

impl LocalStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            writers: Arc::new(WriterLocks::default()),
            snapshot_path: None,
        }
    }

    /// Open a snapshot-backed store, loading `path` if it exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let content = tokio::fs::read(&path).await?;
            let state: StoreState = serde_json::from_slice(&content)?;
            if state.snapshot_version != SNAPSHOT_VERSION {
                return Err(StoreError::IncompatibleSnapshot {
                    found: state.snapshot_version,
                    expected: SNAPSHOT_VERSION,
                });
            }
            info!(
                "Loaded snapshot {:?} with {} profiles",
                path,
                state.profiles.len()
            );
            state
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            info!("No snapshot at {:?}, starting empty", path);
            StoreState::default()
        };

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            writers: Arc::new(WriterLocks::default()),
            snapshot_path: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Add or replace a profile.
    pub async fn insert_profile(&self, profile: Profile) -> Result<(), StoreError> {
        self.update_profiles(|profiles| {
            profiles.insert(profile.id, profile);
        })
        .await
    }

    /// Remove a profile together with everything mirrored for it.
    pub async fn remove_profile(&self, profile_id: i64) -> Result<bool, StoreError> {
        let _accounts = self.writers.accounts.clone().lock_owned().await;
        let _transactions = self.writers.transactions.clone().lock_owned().await;

        let mut state = self.state.write().await;
        let previous = state.clone();
        let existed = state.profiles.remove(&profile_id).is_some();
        state.accounts.remove_profile(profile_id);
        state.transactions.remove_profile(profile_id);
        if let Err(e) = self.persist(&state).await {
            *state = previous;
            return Err(e);
        }
        Ok(existed)
    }

    pub async fn profiles(&self) -> Vec<Profile> {
        self.state.read().await.profiles.values().cloned().collect()
    }

    async fn update_profiles<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<i64, Profile>) -> R,
    ) -> Result<R, StoreError> {
        let mut state = self.state.write().await;
        let previous = state.profiles.clone();
        let out = f(&mut state.profiles);
        if let Err(e) = self.persist(&state).await {
            state.profiles = previous;
            return Err(e);
        }
        Ok(out)
    }

    async fn begin<E: StoredEntity>(&self) -> Result<Box<dyn StoreTransaction<E>>, StoreError> {
        let writer = E::writer(&self.writers).lock_owned().await;
        let working = E::table(&*self.state.read().await).clone();
        debug!("Opened {} write transaction", E::KIND);
        Ok(Box::new(LocalTransaction {
            _writer: writer,
            working,
            store: self.clone(),
        }))
    }

    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let content = serde_json::to_vec_pretty(&SnapshotView::from(state))?;
        let temp = path.with_extension("tmp");
        tokio::fs::write(&temp, &content).await?;
        tokio::fs::rename(&temp, path).await?;
        debug!("Wrote snapshot {:?} ({} bytes)", path, content.len());
        Ok(())
    }
}

#[async_trait::async_trait]
impl LedgerStore for LocalStore {
    async fn profile(&self, profile_id: i64) -> Result<Option<Profile>, StoreError> {
        Ok(self.state.read().await.profiles.get(&profile_id).cloned())
    }

    async fn save_detected_version(
        &self,
        profile_id: i64,
        version: ServerVersion,
    ) -> Result<(), StoreError> {
        self.update_profiles(|profiles| {
            if let Some(profile) = profiles.get_mut(&profile_id) {
                profile.detected_version = Some(version);
            }
        })
        .await
    }

    async fn begin_accounts(&self) -> Result<Box<dyn StoreTransaction<Account>>, StoreError> {
        self.begin::<Account>().await
    }

    async fn begin_transactions(
        &self,
    ) -> Result<Box<dyn StoreTransaction<Transaction>>, StoreError> {
        self.begin::<Transaction>().await
    }

    async fn accounts(&self, profile_id: i64) -> Result<Vec<Account>, StoreError> {
        Ok(self.state.read().await.accounts.rows(profile_id))
    }

    async fn transactions(&self, profile_id: i64) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.state.read().await.transactions.rows(profile_id))
    }
}

struct LocalTransaction<E: StoredEntity> {
    _writer: OwnedMutexGuard<()>,
    working: Table<E::Key, E>,
    store: LocalStore,
}

#[async_trait::async_trait]
impl<E: StoredEntity> StoreTransaction<E> for LocalTransaction<E> {
    async fn generation(&mut self, profile_id: i64) -> Result<u64, StoreError> {
        Ok(self.working.generation(profile_id))
    }

    async fn find(&mut self, profile_id: i64, key: &E::Key) -> Result<Option<E>, StoreError> {
        Ok(self
            .working
            .rows
            .get(&profile_id)
            .and_then(|rows| rows.get(key))
            .cloned())
    }

    async fn upsert(&mut self, profile_id: i64, mut entity: E) -> Result<(), StoreError> {
        entity.on_upsert(&mut self.working.next_id);
        self.working
            .rows
            .entry(profile_id)
            .or_default()
            .insert(entity.key(), entity);
        Ok(())
    }

    async fn purge_older_than(
        &mut self,
        profile_id: i64,
        generation: u64,
    ) -> Result<u64, StoreError> {
        let Some(rows) = self.working.rows.get_mut(&profile_id) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|_, entity| entity.generation() >= generation);
        Ok((before - rows.len()) as u64)
    }

    async fn set_generation(&mut self, profile_id: i64, generation: u64) -> Result<(), StoreError> {
        self.working.generations.insert(profile_id, generation);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let LocalTransaction {
            _writer,
            working,
            store,
        } = *self;

        let mut state = store.state.write().await;
        let previous = std::mem::replace(E::table_mut(&mut state), working);
        if let Err(e) = store.persist(&state).await {
            *E::table_mut(&mut state) = previous;
            return Err(e);
        }
        debug!("Committed {} write transaction", E::KIND);
        Ok(())
    }
}
