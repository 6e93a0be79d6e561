//! Canonical, version-independent ledger model.
//!
//! Every protocol adapter produces these shapes regardless of which hledger-web release the
//! data came from, and the reconciler stores exactly these shapes locally.

/// Accounts and their per-currency balances
pub mod account;
/// Display rules for commodities
pub mod currency;
/// Remote ledger connections
pub mod profile;
/// Transactions and their lines
pub mod transaction;

pub use account::{ACCOUNT_SEPARATOR, Account, AccountAmount};
pub use currency::{Currency, CurrencyPosition};
pub use profile::{Credentials, Profile, ProfilePreferences};
pub use transaction::{Transaction, TransactionLine};
