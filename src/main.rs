use clap::{Parser, Subcommand};
use ledger_state_sync::config::{AppConfig, ConfigError};
use ledger_state_sync::model::{Account, Currency, CurrencyPosition, Transaction};
use ledger_state_sync::remote::HledgerClient;
use ledger_state_sync::sync::{
    CancellationToken, LedgerStore, LedgerSyncOrchestrator, LocalStore, StoreError, SyncError,
    SyncProgress, SyncResult, SyncState,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// ledger-sync: mirror hledger-web ledgers into a local snapshot.
///
/// Each profile in the configuration file points at one hledger-web server. `sync` fetches the
/// accounts and transactions of those servers into the local snapshot; `accounts` and
/// `transactions` show what has been mirrored.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Configuration file listing the profiles to mirror
    #[arg(long, short, env = "LEDGER_SYNC_CONFIG", default_value = "ledger-sync.json")]
    config: PathBuf,

    /// Log level for this program. Ignored when RUST_LOG is set.
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync one or all profiles with their remote ledgers.
    Sync {
        /// Only sync this profile
        #[arg(long)]
        profile: Option<i64>,

        /// Give up on the first failure instead of retrying network and server errors
        #[arg(long)]
        no_retry: bool,
    },

    /// Show the mirrored accounts of a profile as a tree.
    Accounts {
        #[arg(long)]
        profile: i64,
    },

    /// Show the mirrored transactions of a profile.
    Transactions {
        #[arg(long)]
        profile: i64,

        /// Only transactions with a line whose account name contains this text
        #[arg(long)]
        account: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Profile {0} is not in the configuration")]
    UnknownProfile(i64),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.log_level);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, CliError> {
    let config = AppConfig::load(&args.config).await?;
    let store = Arc::new(LocalStore::open(config.snapshot_path()).await?);
    config.register_profiles(&store).await?;

    match args.command {
        Command::Sync { profile, no_retry } => {
            let ids = match profile {
                Some(id) => {
                    config.profile(id).ok_or(CliError::UnknownProfile(id))?;
                    vec![id]
                }
                None => config.profiles.iter().map(|p| p.id).collect(),
            };
            sync_profiles(&config, store, ids, !no_retry).await
        }
        Command::Accounts { profile } => {
            config
                .profile(profile)
                .ok_or(CliError::UnknownProfile(profile))?;
            print_accounts(&store.accounts(profile).await?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Transactions { profile, account } => {
            config
                .profile(profile)
                .ok_or(CliError::UnknownProfile(profile))?;
            let transactions = store.transactions(profile).await?;
            let selected = transactions
                .iter()
                .filter(|t| account.as_deref().is_none_or(|term| t.has_account_named(term)));
            for transaction in selected {
                print_transaction(transaction);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn sync_profiles(
    config: &AppConfig,
    store: Arc<LocalStore>,
    ids: Vec<i64>,
    retry: bool,
) -> Result<ExitCode, CliError> {
    let client = Arc::new(HledgerClient::new(config.sync.request_timeout())?);
    let orchestrator = Arc::new(LedgerSyncOrchestrator::new(
        client.clone(),
        client,
        store,
        config.sync.settings(),
    ));

    let interrupt = CancellationToken::new();
    {
        let orchestrator = orchestrator.clone();
        let interrupt = interrupt.clone();
        let ids = ids.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling running syncs");
                interrupt.cancel();
                for id in ids {
                    orchestrator.cancel_sync(id);
                }
            }
        });
    }

    let mut failed = false;
    for id in ids {
        let name = config
            .profile(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| id.to_string());
        let watcher = watch_progress(&orchestrator, id, name.clone());

        let outcome = if retry {
            let orchestrator = &orchestrator;
            let interrupt = &interrupt;
            backoff::future::retry(config.sync.retry.backoff(), move || {
                attempt(orchestrator, id, interrupt)
            })
            .await
        } else {
            attempt(&orchestrator, id, &interrupt)
                .await
                .map_err(|e| match e {
                    backoff::Error::Permanent(e) => e,
                    backoff::Error::Transient { err, .. } => err,
                })
        };
        watcher.abort();

        match outcome {
            Ok(result) => print_result(&name, &result),
            Err(SyncError::Cancelled) => {
                println!("{}: cancelled", name);
                failed = true;
                break;
            }
            Err(e) => {
                println!("{}: failed: {}", name, e);
                failed = true;
            }
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// One sync attempt, with retryable failures marked transient for the backoff policy.
async fn attempt(
    orchestrator: &Arc<LedgerSyncOrchestrator>,
    profile_id: i64,
    interrupt: &CancellationToken,
) -> Result<SyncResult, backoff::Error<SyncError>> {
    interrupt.check().map_err(backoff::Error::permanent)?;

    let handle = orchestrator.start_sync(profile_id).ok_or_else(|| {
        backoff::Error::permanent(SyncError::unknown(format!(
            "Profile {} is already syncing",
            profile_id
        )))
    })?;
    let state = handle
        .await
        .map_err(|e| backoff::Error::permanent(SyncError::unknown_with("Sync task failed", e)))?;

    match state {
        SyncState::Completed(result) => Ok(result),
        SyncState::Failed(e) if e.is_retryable() => {
            warn!("Sync of profile {} failed, will retry: {}", profile_id, e);
            Err(backoff::Error::transient(e))
        }
        SyncState::Failed(e) => Err(backoff::Error::permanent(e)),
        SyncState::Cancelled => Err(backoff::Error::permanent(SyncError::Cancelled)),
        other => Err(backoff::Error::permanent(SyncError::unknown(format!(
            "Sync ended in unexpected state {}",
            other.label()
        )))),
    }
}

/// Print progress transitions of a profile until aborted.
fn watch_progress(
    orchestrator: &LedgerSyncOrchestrator,
    profile_id: i64,
    name: String,
) -> JoinHandle<()> {
    let mut states = orchestrator.subscribe(profile_id);
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            match state {
                SyncState::InProgress(SyncProgress::Starting) => println!("{}: starting", name),
                SyncState::InProgress(SyncProgress::Indeterminate { message }) => {
                    println!("{}: {}", name, message)
                }
                SyncState::InProgress(SyncProgress::Running {
                    current,
                    total,
                    message,
                }) => println!("{}: [{}/{}] {}", name, current, total, message),
                _ => {}
            }
        }
    })
}

fn print_result(name: &str, result: &SyncResult) {
    println!(
        "{}: {} accounts, {} transactions in {} ms ({} accounts and {} transactions removed upstream)",
        name,
        result.account_count,
        result.transaction_count,
        result.duration_ms,
        result.purged_accounts,
        result.purged_transactions
    );
    for skipped in &result.skipped {
        println!(
            "{}: skipped transaction {}: {}",
            name,
            skipped.ledger_id,
            skipped.reasons.join("; ")
        );
    }
}

fn print_accounts(accounts: &[Account]) {
    for account in accounts.iter().filter(|a| a.visible) {
        let balances: Vec<String> = account
            .amounts
            .iter()
            .map(|a| display_currency(&a.currency).format(a.quantity))
            .collect();
        println!(
            "{}{:<40} {}",
            "  ".repeat(account.level),
            account.short_name(),
            balances.join(", ")
        );
    }
}

fn print_transaction(transaction: &Transaction) {
    println!("{} {}", transaction.date, transaction.description);
    for line in &transaction.lines {
        let amount = line
            .amount
            .map(|q| display_currency(&line.currency).format(q))
            .unwrap_or_default();
        println!("    {:<40} {:>16}", line.account_name, amount);
    }
}

/// Single-character symbols such as `$` go before the number, everything else after it.
fn display_currency(name: &str) -> Currency {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(symbol), None) if !symbol.is_alphanumeric() => {
            Currency::new(name, CurrencyPosition::Before, false)
        }
        _ => Currency::plain(name),
    }
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => EnvFilter::from_default_env(),
        None => EnvFilter::new(format!(
            "ledger_state_sync={},{}={}",
            level,
            env!("CARGO_CRATE_NAME"),
            level
        )),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
