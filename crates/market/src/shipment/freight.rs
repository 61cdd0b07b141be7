//! Freight cost formula.
//!
//! ```text
//! usd_total   = usd_per_kg * weight
//! cny_per_usd = usd_to_rub / cny_to_rub
//! cny_base    = usd_total * cny_per_usd
//! used_pct    = clamp(markup_pct, min_pct, max_pct)
//! cny_charge  = cny_base * (1 + used_pct) + fee_cny
//! rub         = cny_charge * cny_to_rub
//! ```
//!
//! Intermediate values stay unrounded; each output is rounded once when it is
//! reported. The cross rate is reported with 8 decimals.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::rates::Rates;

/// Largest supported output precision.
pub const MAX_ROUND_DIGITS: u32 = 8;

const CROSS_RATE_DIGITS: u32 = 8;

/// Markup, fee and rounding inputs to the freight formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingParams {
    /// Requested markup as a fraction (0.03 = 3%).
    pub markup_pct: Decimal,
    pub min_pct: Decimal,
    pub max_pct: Decimal,
    pub fee_cny: Decimal,
    pub round_digits: u32,
}

impl Default for PricingParams {
    fn default() -> Self {
        Self {
            markup_pct: Decimal::new(3, 2),
            min_pct: Decimal::ZERO,
            max_pct: Decimal::new(15, 2),
            fee_cny: Decimal::ZERO,
            round_digits: 2,
        }
    }
}

impl PricingParams {
    /// Check the bounds, fee and precision.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::Validation` if `min_pct > max_pct`, the fee is
    /// negative or `round_digits` exceeds [`MAX_ROUND_DIGITS`].
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.min_pct > self.max_pct {
            return Err(MarketError::Validation(format!(
                "markup bounds inverted: min {} > max {}",
                self.min_pct, self.max_pct
            )));
        }
        if self.fee_cny < Decimal::ZERO {
            return Err(MarketError::validation("freight fee must not be negative"));
        }
        if self.round_digits > MAX_ROUND_DIGITS {
            return Err(MarketError::Validation(format!(
                "round_digits must be at most {MAX_ROUND_DIGITS}"
            )));
        }
        Ok(())
    }

    /// Markup actually applied after clamping into `[min_pct, max_pct]`.
    #[must_use]
    pub fn used_pct(&self) -> Decimal {
        self.markup_pct.max(self.min_pct).min(self.max_pct)
    }

    /// Overlay per-request overrides onto these defaults.
    #[must_use]
    pub fn with_overrides(self, overrides: &PricingOverrides) -> Self {
        Self {
            markup_pct: overrides.markup_pct.unwrap_or(self.markup_pct),
            min_pct: overrides.min_pct.unwrap_or(self.min_pct),
            max_pct: overrides.max_pct.unwrap_or(self.max_pct),
            fee_cny: overrides.fee_cny.unwrap_or(self.fee_cny),
            round_digits: overrides.round_digits.unwrap_or(self.round_digits),
        }
    }
}

/// Optional per-request pricing parameters; unset fields use configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingOverrides {
    pub markup_pct: Option<Decimal>,
    pub min_pct: Option<Decimal>,
    pub max_pct: Option<Decimal>,
    pub fee_cny: Option<Decimal>,
    pub round_digits: Option<u32>,
}

/// Full cost breakdown of a freight quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreightQuote {
    pub weight_kg: Decimal,
    pub usd_per_kg: Decimal,
    pub usd_total: Decimal,
    pub cny_per_usd: Decimal,
    pub cny_base: Decimal,
    pub used_pct: Decimal,
    pub fee_cny: Decimal,
    pub cny_charge: Decimal,
    pub rub_equivalent: Decimal,
}

/// Compute a freight quote.
///
/// # Errors
///
/// Returns `MarketError::Validation` for a negative price or weight, or for
/// invalid pricing parameters.
pub fn quote(
    usd_per_kg: Decimal,
    weight_kg: Decimal,
    rates: &Rates,
    params: &PricingParams,
) -> Result<FreightQuote, MarketError> {
    if usd_per_kg < Decimal::ZERO {
        return Err(MarketError::validation("freight price must not be negative"));
    }
    if weight_kg < Decimal::ZERO {
        return Err(MarketError::validation("weight must not be negative"));
    }
    params.validate()?;

    let digits = params.round_digits;
    let used_pct = params.used_pct();

    let usd_total = usd_per_kg * weight_kg;
    let cny_per_usd = rates.cny_per_usd();
    let cny_base = usd_total * cny_per_usd;
    let cny_charge = cny_base * (Decimal::ONE + used_pct) + params.fee_cny;
    let rub_equivalent = cny_charge * rates.cny_to_rub();

    Ok(FreightQuote {
        weight_kg,
        usd_per_kg,
        usd_total: round(usd_total, digits),
        cny_per_usd: round(cny_per_usd, CROSS_RATE_DIGITS),
        cny_base: round(cny_base, digits),
        used_pct,
        fee_cny: params.fee_cny,
        cny_charge: round(cny_charge, digits),
        rub_equivalent: round(rub_equivalent, digits),
    })
}

fn round(value: Decimal, digits: u32) -> Decimal {
    value.round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero)
}
