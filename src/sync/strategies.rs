use crate::model::{Account, Transaction, TransactionLine};
use crate::remote::{
    BalanceData, FlatAccount, PeriodAccount, ServerVersion, WireAmount, WireTransaction,
};
use crate::sync::SyncError;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Resource path of the account list
pub const ACCOUNTS_RESOURCE: &str = "accounts";
/// Resource path of the transaction list
pub const TRANSACTIONS_RESOURCE: &str = "transactions";

/// Human-readable list of supported releases, used in version errors
pub const SUPPORTED_VERSIONS: &str = "hledger-web 1.14 to 1.31 (flat balances), 1.32 and later 1.x (period balances)";

/// Trait for the per-version protocol adapters.
///
/// Each adapter turns the raw bytes of one hledger-web release range into the canonical model.
/// Unknown fields are ignored; a missing required field is a `SyncError::Parse`.
pub trait ProtocolAdapter: Send + Sync {
    /// Parse the response of the accounts resource
    fn parse_accounts(&self, raw: &[u8]) -> Result<Vec<Account>, SyncError>;

    /// Parse the response of the transactions resource
    fn parse_transactions(&self, raw: &[u8]) -> Result<Vec<Transaction>, SyncError>;

    /// Resource path for accounts, relative to the profile URL
    fn accounts_resource(&self) -> &'static str {
        ACCOUNTS_RESOURCE
    }

    /// Resource path for transactions, relative to the profile URL
    fn transactions_resource(&self) -> &'static str {
        TRANSACTIONS_RESOURCE
    }

    /// Get the name of this adapter
    fn name(&self) -> &'static str;
}

/// Pick the adapter for a detected server version.
pub fn select_adapter(version: ServerVersion) -> Result<Box<dyn ProtocolAdapter>, SyncError> {
    if version.legacy {
        return Ok(Box::new(FlatBalanceAdapter));
    }
    if version.major != 1 || !version.at_least(1, 14) {
        return Err(SyncError::ApiVersion {
            detected: version.to_string(),
            supported: SUPPORTED_VERSIONS.to_string(),
        });
    }
    if version.at_least(1, 32) {
        Ok(Box::new(PeriodBalanceAdapter))
    } else {
        Ok(Box::new(FlatBalanceAdapter))
    }
}

/// Adapter for 1.14 through 1.31, where accounts carry a flat `aibalance` array
pub struct FlatBalanceAdapter;

impl ProtocolAdapter for FlatBalanceAdapter {
    fn parse_accounts(&self, raw: &[u8]) -> Result<Vec<Account>, SyncError> {
        let wire: Vec<FlatAccount> = decode(raw, "account list")?;
        debug!("Decoded {} flat accounts", wire.len());
        Ok(wire
            .into_iter()
            .map(|a| canonical_account(a.aname, &a.aibalance, a.anumpostings))
            .collect())
    }

    fn parse_transactions(&self, raw: &[u8]) -> Result<Vec<Transaction>, SyncError> {
        parse_wire_transactions(raw)
    }

    fn name(&self) -> &'static str {
        "FlatBalanceAdapter"
    }
}

/// Adapter for 1.32 and later, where balances are nested in `adata.pdperiods`
pub struct PeriodBalanceAdapter;

impl PeriodBalanceAdapter {
    /// Posting count of a nested account: the explicit `anumpostings` when present, otherwise
    /// the count of the first report period. No periods at all means no postings.
    fn posting_count(account: &PeriodAccount) -> u64 {
        match account.anumpostings {
            Some(count) => count,
            None => Self::current_period(account)
                .map(|bd| bd.bdnumpostings)
                .unwrap_or(0),
        }
    }

    fn current_period(account: &PeriodAccount) -> Option<&BalanceData> {
        account.adata.pdperiods.first().map(|(_, bd)| bd)
    }
}

impl ProtocolAdapter for PeriodBalanceAdapter {
    fn parse_accounts(&self, raw: &[u8]) -> Result<Vec<Account>, SyncError> {
        let wire: Vec<PeriodAccount> = decode(raw, "account list")?;
        debug!("Decoded {} period accounts", wire.len());
        Ok(wire
            .iter()
            .map(|a| {
                let balance = Self::current_period(a)
                    .map(|bd| bd.bdincludingsubs.as_slice())
                    .unwrap_or(&[]);
                canonical_account(a.aname.clone(), balance, Self::posting_count(a))
            })
            .collect())
    }

    fn parse_transactions(&self, raw: &[u8]) -> Result<Vec<Transaction>, SyncError> {
        parse_wire_transactions(raw)
    }

    fn name(&self) -> &'static str {
        "PeriodBalanceAdapter"
    }
}

fn decode<T: DeserializeOwned>(raw: &[u8], what: &str) -> Result<T, SyncError> {
    serde_json::from_slice(raw)
        .map_err(|e| SyncError::parse_with(format!("Failed to parse {}: {}", what, e), e))
}

fn canonical_account(name: String, balance: &[WireAmount], posting_count: u64) -> Account {
    let mut account = Account::new(name);
    for amount in balance {
        account.add_amount(&amount.acommodity, amount.aquantity.value());
    }
    account.posting_count = posting_count;
    account
}

fn parse_wire_transactions(raw: &[u8]) -> Result<Vec<Transaction>, SyncError> {
    let wire: Vec<WireTransaction> = decode(raw, "transaction list")?;
    debug!("Decoded {} transactions", wire.len());
    wire.into_iter().map(canonical_transaction).collect()
}

fn canonical_transaction(wire: WireTransaction) -> Result<Transaction, SyncError> {
    let date = NaiveDate::parse_from_str(&wire.tdate, "%Y-%m-%d").map_err(|e| {
        SyncError::parse_with(
            format!("Transaction {} has invalid date '{}'", wire.tindex, wire.tdate),
            e,
        )
    })?;

    let mut transaction = Transaction::new(wire.tindex, date, wire.tdescription);
    transaction.comment = non_empty(wire.tcomment);

    for posting in wire.tpostings {
        let comment = non_empty(posting.pcomment);
        if posting.pamount.is_empty() {
            let mut line = TransactionLine::elided(posting.paccount);
            line.comment = comment;
            transaction.lines.push(line);
            continue;
        }
        for amount in &posting.pamount {
            let mut line = TransactionLine::new(
                posting.paccount.clone(),
                amount.aquantity.value(),
                amount.acommodity.clone(),
            );
            line.comment = comment.clone();
            transaction.lines.push(line);
        }
    }

    Ok(transaction)
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
