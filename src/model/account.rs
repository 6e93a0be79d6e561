use serde::{Deserialize, Serialize};

/// Separator between the segments of a hierarchical account name.
pub const ACCOUNT_SEPARATOR: char = ':';

/// A signed quantity of one currency. An empty currency code is the ledger's default commodity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountAmount {
    pub currency: String,
    pub quantity: f64,
}

impl AccountAmount {
    pub fn new(currency: impl Into<String>, quantity: f64) -> Self {
        Self {
            currency: currency.into(),
            quantity,
        }
    }
}

/// A ledger account as mirrored locally.
///
/// `expanded` and `visible` belong to the local UI and are never taken from the server; the
/// reconciler carries them over when it refreshes an existing account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub level: usize,
    pub amounts: Vec<AccountAmount>,
    pub posting_count: u64,
    pub expanded: bool,
    pub visible: bool,
    pub generation: u64,
}

impl Account {
    /// Create an account with no balances. The level is derived from the name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            level: Self::level_of(&name),
            name,
            amounts: Vec::new(),
            posting_count: 0,
            expanded: false,
            visible: true,
            generation: 0,
        }
    }

    /// Depth of an account name: `Assets` is 0, `Assets:Bank` is 1.
    pub fn level_of(name: &str) -> usize {
        name.matches(ACCOUNT_SEPARATOR).count()
    }

    /// Everything before the last separator, or `None` for a top-level account.
    pub fn parent_name(&self) -> Option<&str> {
        self.name
            .rfind(ACCOUNT_SEPARATOR)
            .map(|ix| &self.name[..ix])
    }

    /// Everything after the last separator.
    pub fn short_name(&self) -> &str {
        match self.name.rfind(ACCOUNT_SEPARATOR) {
            Some(ix) => &self.name[ix + ACCOUNT_SEPARATOR.len_utf8()..],
            None => &self.name,
        }
    }

    /// Add `quantity` to the balance held in `currency`, creating the entry if needed.
    pub fn add_amount(&mut self, currency: &str, quantity: f64) {
        match self.amounts.iter_mut().find(|a| a.currency == currency) {
            Some(existing) => existing.quantity += quantity,
            None => self.amounts.push(AccountAmount::new(currency, quantity)),
        }
    }

    pub fn amount_for(&self, currency: &str) -> Option<f64> {
        self.amounts
            .iter()
            .find(|a| a.currency == currency)
            .map(|a| a.quantity)
    }

    /// Names of every ancestor, nearest last: `a:b:c` yields `a`, `a:b`.
    pub fn ancestor_names(&self) -> impl Iterator<Item = &str> {
        self.name
            .match_indices(ACCOUNT_SEPARATOR)
            .map(|(ix, _)| &self.name[..ix])
    }
}
