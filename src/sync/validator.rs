use crate::model::Transaction;
use crate::sync::SyncError;
use std::collections::BTreeMap;
use tracing::debug;

/// Largest per-currency imbalance still considered balanced
pub const BALANCE_EPSILON: f64 = 0.005;

/// Outcome of validating one transaction
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Success,
    /// Every rule violation found, in rule order
    Error(Vec<String>),
}

impl ValidationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ValidationResult::Success)
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            ValidationResult::Success => &[],
            ValidationResult::Error(reasons) => reasons,
        }
    }

    /// Collapse into a `SyncError::Validation` for callers that need a hard failure.
    pub fn into_result(self) -> Result<(), SyncError> {
        match self {
            ValidationResult::Success => Ok(()),
            ValidationResult::Error(reasons) => {
                Err(SyncError::validation("transaction", reasons.join("; ")))
            }
        }
    }
}

/// Checks the double-entry invariants of a transaction before it is stored or sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceValidator;

impl BalanceValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a transaction.
    ///
    /// A blank description or an empty line list ends validation immediately. Otherwise every
    /// line and every currency is checked and all violations are reported together. Lines without
    /// an amount are auto-balanced by the ledger and take no part in the sums.
    pub fn validate(&self, transaction: &Transaction) -> ValidationResult {
        if transaction.description.trim().is_empty() {
            return ValidationResult::Error(vec!["Description must not be empty".to_string()]);
        }
        if transaction.lines.is_empty() {
            return ValidationResult::Error(vec!["Transaction has no lines".to_string()]);
        }

        let mut reasons = Vec::new();

        for (ix, line) in transaction.lines.iter().enumerate() {
            if line.account_name.trim().is_empty() {
                reasons.push(format!("Line {} has no account name", ix + 1));
            }
        }

        let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
        for line in &transaction.lines {
            if let Some(amount) = line.amount {
                *sums.entry(line.currency.as_str()).or_insert(0.0) += amount;
            }
        }

        let unbalanced: Vec<(&str, f64)> = sums
            .iter()
            .filter(|(_, sum)| sum.abs() > BALANCE_EPSILON)
            .map(|(currency, sum)| (*currency, *sum))
            .collect();

        for (currency, sum) in &unbalanced {
            reasons.push(format!(
                "Amounts in {} do not balance (off by {:.4})",
                display_currency(currency),
                sum
            ));
        }

        if sums.len() > 1 && !unbalanced.is_empty() {
            let currencies: Vec<String> = sums.keys().map(|c| display_currency(c)).collect();
            reasons.push(format!(
                "Transaction mixes currencies {} and each must balance on its own",
                currencies.join(", ")
            ));
        }

        if reasons.is_empty() {
            ValidationResult::Success
        } else {
            debug!(
                "Transaction {} failed validation: {:?}",
                transaction.ledger_id, reasons
            );
            ValidationResult::Error(reasons)
        }
    }
}

fn display_currency(currency: &str) -> String {
    if currency.is_empty() {
        "the default currency".to_string()
    } else {
        currency.to_string()
    }
}
