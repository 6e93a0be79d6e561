//! Wire shapes of the hledger-web JSON API.
//!
//! Only the fields the canonical model needs are declared. Everything else the server sends
//! (`aprice`, `acost`, `astyle`, `tsourcepos`, `adeclarationinfo`, ...) is ignored by serde, which
//! keeps older adapters working against newer servers. A declared field without `#[serde(default)]`
//! is required: its absence fails deserialization and surfaces as a parse error.

use crate::utils::quantity_from_mantissa;
use serde::{Deserialize, Serialize};

/// Decimal quantity as encoded by hledger: an integer mantissa and a decimal exponent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireQuantity {
    /// The integer digits of the quantity.
    #[serde(rename = "decimalMantissa")]
    pub decimal_mantissa: i64,
    /// How many of those digits are decimals.
    #[serde(rename = "decimalPlaces")]
    pub decimal_places: u32,
    /// Lossy float rendering some releases add alongside the mantissa.
    #[serde(rename = "floatingPoint", default)]
    pub floating_point: Option<f64>,
}

impl WireQuantity {
    pub fn value(&self) -> f64 {
        quantity_from_mantissa(self.decimal_mantissa, self.decimal_places)
    }
}

/// One commodity amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireAmount {
    /// Commodity symbol, empty for the default commodity.
    pub acommodity: String,
    /// The signed quantity.
    pub aquantity: WireQuantity,
}

/// Account in the flat shape served by 1.14 through 1.31.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatAccount {
    /// Full colon-separated account name.
    pub aname: String,
    /// Balance including all sub-accounts.
    pub aibalance: Vec<WireAmount>,
    /// Number of postings to this account.
    pub anumpostings: u64,
}

/// Account in the nested, per-period shape served by 1.32 and later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAccount {
    /// Full colon-separated account name.
    pub aname: String,
    /// Posting count. Optional here: when missing it is derived from `adata`.
    #[serde(default)]
    pub anumpostings: Option<u64>,
    /// Balances broken down by report period.
    pub adata: PeriodData,
}

/// Per-period balance breakdown (`adata`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodData {
    /// `(period start date, balance data)` pairs, newest report period first.
    pub pdperiods: Vec<(String, BalanceData)>,
}

/// Balance data for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceData {
    /// Balance including all sub-accounts.
    pub bdincludingsubs: Vec<WireAmount>,
    /// Number of postings in the period.
    pub bdnumpostings: u64,
}

/// Transaction as served by every supported release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTransaction {
    /// Position of the transaction in the journal; stable upstream identity.
    pub tindex: u64,
    /// Primary date, `YYYY-MM-DD`.
    pub tdate: String,
    /// Payee/description text.
    pub tdescription: String,
    /// Transaction comment, empty when absent.
    #[serde(default)]
    pub tcomment: String,
    /// Postings in journal order.
    pub tpostings: Vec<WirePosting>,
}

/// One posting of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePosting {
    /// Account name.
    pub paccount: String,
    /// Amounts; several for multi-commodity postings, none for an elided amount.
    #[serde(default)]
    pub pamount: Vec<WireAmount>,
    /// Posting comment, empty when absent.
    #[serde(default)]
    pub pcomment: String,
}
