use crate::utils::format_amount;
use serde::{Deserialize, Serialize};

/// Default number of decimals used when rendering an amount.
pub const DISPLAY_DECIMALS: u32 = 2;

/// Where the currency symbol goes relative to the number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyPosition {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub name: String,
    pub position: CurrencyPosition,
    /// Insert a space between the symbol and the number
    pub has_gap: bool,
}

impl Currency {
    pub fn new(name: impl Into<String>, position: CurrencyPosition, has_gap: bool) -> Self {
        Self {
            name: name.into(),
            position,
            has_gap,
        }
    }

    /// Fallback rules for a currency without explicit configuration.
    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(name, CurrencyPosition::After, true)
    }

    /// Render `quantity` with this currency's symbol placement.
    pub fn format(&self, quantity: f64) -> String {
        let number = format_amount(quantity, DISPLAY_DECIMALS);
        if self.name.is_empty() {
            return number;
        }
        let gap = if self.has_gap { " " } else { "" };
        match self.position {
            CurrencyPosition::Before => format!("{}{}{}", self.name, gap, number),
            CurrencyPosition::After => format!("{}{}{}", number, gap, self.name),
        }
    }
}
