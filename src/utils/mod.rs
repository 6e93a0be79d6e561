//!
//! Utility module for the ledger mirror.
//!
//! Re-exports amount formatting helpers used by the model and the CLI.
/// Number formatting and decimal decoding
pub mod format;

pub use format::{format_amount, quantity_from_mantissa};
