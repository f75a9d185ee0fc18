use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currencies accepted for wallet funding and course pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    NGN,
    GHS,
    KES,
    ZAR,
    USD,
    GBP,
    EUR,
}

impl Currency {
    /// Number of minor units per major unit, as a power of ten.
    pub fn decimal_places(&self) -> u32 {
        2
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::NGN => "₦",
            Currency::GHS => "GH₵",
            Currency::KES => "KSh",
            Currency::ZAR => "R",
            Currency::USD => "$",
            Currency::GBP => "£",
            Currency::EUR => "€",
        }
    }

    /// Converts an amount held in minor units to major units.
    pub fn to_major(&self, amount: i64) -> Decimal {
        Decimal::new(amount, self.decimal_places())
    }

    /// Renders an amount held in minor units, e.g. `150050` NGN as `₦1500.50`.
    pub fn format_minor(&self, amount: i64) -> String {
        format!("{}{}", self.symbol(), self.to_major(amount))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for Currency {
    type Err = CurrencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NGN" => Ok(Currency::NGN),
            "GHS" => Ok(Currency::GHS),
            "KES" => Ok(Currency::KES),
            "ZAR" => Ok(Currency::ZAR),
            "USD" => Ok(Currency::USD),
            "GBP" => Ok(Currency::GBP),
            "EUR" => Ok(Currency::EUR),
            _ => Err(CurrencyParseError(s.to_string())),
        }
    }
}

/// Formats a stored amount for display, falling back to the raw code for unknown currencies.
pub fn display_amount(amount: i64, currency: &str) -> String {
    match Currency::from_str(currency) {
        Ok(c) => c.format_minor(amount),
        Err(_) => format!("{} {}", Decimal::new(amount, 2), currency),
    }
}

#[derive(Debug, Clone)]
pub struct CurrencyParseError(String);

impl fmt::Display for CurrencyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown currency code: {}", self.0)
    }
}

impl std::error::Error for CurrencyParseError {}
