use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One posting line. `amount == None` means the server elided it and balances it implicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLine {
    pub account_name: String,
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: String,
    pub comment: Option<String>,
}

impl TransactionLine {
    pub fn new(account_name: impl Into<String>, amount: f64, currency: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            amount: Some(amount),
            currency: currency.into(),
            comment: None,
        }
    }

    /// A line whose amount is left for the ledger to infer.
    pub fn elided(account_name: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            amount: None,
            currency: String::new(),
            comment: None,
        }
    }
}

/// A ledger transaction.
///
/// `id` is assigned by local storage; `ledger_id` identifies the transaction upstream and is the
/// key used to match fetched transactions against stored ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Option<i64>,
    pub ledger_id: u64,
    pub date: NaiveDate,
    pub description: String,
    pub comment: Option<String>,
    pub lines: Vec<TransactionLine>,
    pub generation: u64,
}

impl Transaction {
    pub fn new(ledger_id: u64, date: NaiveDate, description: impl Into<String>) -> Self {
        Self {
            id: None,
            ledger_id,
            date,
            description: description.into(),
            comment: None,
            lines: Vec::new(),
            generation: 0,
        }
    }

    pub fn with_line(mut self, line: TransactionLine) -> Self {
        self.lines.push(line);
        self
    }

    /// Case-insensitive substring match against the account of any line.
    pub fn has_account_named(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.lines
            .iter()
            .any(|line| line.account_name.to_lowercase().contains(&term))
    }
}
