//! Wallet currencies and dual-currency balances using decimal arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A wallet currency.
///
/// Every wallet carries exactly two independent balances. USD only ever appears
/// as a freight quote intermediate and is not a wallet currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// Russian ruble.
    Rub,
    /// Chinese yuan.
    Cny,
}

impl Currency {
    /// ISO 4217 code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Rub => "RUB",
            Self::Cny => "CNY",
        }
    }

    /// Display symbol.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Rub => "₽",
            Self::Cny => "¥",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rub" => Ok(Self::Rub),
            "cny" => Ok(Self::Cny),
            _ => Err(format!("invalid currency: {s}")),
        }
    }
}

/// The two balances of a user wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balances {
    pub rub: Decimal,
    pub cny: Decimal,
}

impl Balances {
    /// Create balances from both amounts.
    #[must_use]
    pub const fn new(rub: Decimal, cny: Decimal) -> Self {
        Self { rub, cny }
    }

    /// Balance held in `currency`.
    #[must_use]
    pub const fn amount(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Rub => self.rub,
            Currency::Cny => self.cny,
        }
    }

    /// Returns the balances after adding `delta` to `currency`.
    #[must_use]
    pub fn with_delta(self, currency: Currency, delta: Decimal) -> Self {
        match currency {
            Currency::Rub => Self {
                rub: self.rub + delta,
                ..self
            },
            Currency::Cny => Self {
                cny: self.cny + delta,
                ..self
            },
        }
    }

    /// Whether `currency` holds at least `amount`.
    #[must_use]
    pub fn covers(&self, currency: Currency, amount: Decimal) -> bool {
        self.amount(currency) >= amount
    }
}
