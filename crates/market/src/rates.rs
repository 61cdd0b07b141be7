//! Rate gateway: spot USD/RUB and CNY/RUB exchange rates.
//!
//! Every call refetches; nothing is cached across requests and failures are
//! not retried. Callers decide whether a failure is fatal (freight quotes,
//! replenishment conversion) or skippable (RUB mirror bookkeeping).

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::config::RatesConfig;

/// Errors that can occur when fetching exchange rates.
#[derive(Debug, Error)]
pub enum RateError {
    /// HTTP request failed (including timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate source returned an error response.
    #[error("API error: status {status}")]
    Api { status: u16 },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A required currency is missing from the feed.
    #[error("currency {0} missing from rate feed")]
    MissingCurrency(&'static str),

    /// A quoted rate was zero or negative.
    #[error("non-positive exchange rate")]
    NonPositive,
}

/// Spot rates quoted against the ruble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rates {
    usd_to_rub: Decimal,
    cny_to_rub: Decimal,
}

impl Rates {
    /// Build a rate pair, rejecting non-positive quotes.
    ///
    /// # Errors
    ///
    /// Returns `RateError::NonPositive` if either rate is zero or negative.
    pub fn new(usd_to_rub: Decimal, cny_to_rub: Decimal) -> Result<Self, RateError> {
        if usd_to_rub <= Decimal::ZERO || cny_to_rub <= Decimal::ZERO {
            return Err(RateError::NonPositive);
        }
        Ok(Self {
            usd_to_rub,
            cny_to_rub,
        })
    }

    #[must_use]
    pub const fn usd_to_rub(&self) -> Decimal {
        self.usd_to_rub
    }

    #[must_use]
    pub const fn cny_to_rub(&self) -> Decimal {
        self.cny_to_rub
    }

    /// CNY per USD, derived through the ruble.
    #[must_use]
    pub fn cny_per_usd(&self) -> Decimal {
        self.usd_to_rub / self.cny_to_rub
    }

    /// Convert a CNY amount to RUB, rounded to kopecks.
    #[must_use]
    pub fn cny_to_rub_amount(&self, cny: Decimal) -> Decimal {
        money(cny * self.cny_to_rub)
    }

    /// Convert a RUB amount to CNY, rounded to fen.
    #[must_use]
    pub fn rub_to_cny_amount(&self, rub: Decimal) -> Decimal {
        money(rub / self.cny_to_rub)
    }
}

/// Round to two decimals, midpoint away from zero.
#[must_use]
pub fn money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A source of spot exchange rates.
pub trait RateSource: Clone + Send + Sync + 'static {
    /// Fetch the current USD/RUB and CNY/RUB rates.
    fn fetch_rates(&self) -> impl Future<Output = Result<Rates, RateError>> + Send;
}

// =============================================================================
// Central Bank daily feed
// =============================================================================

#[derive(Debug, Deserialize)]
struct DailyFeed {
    #[serde(rename = "Valute")]
    valute: std::collections::HashMap<String, FeedQuote>,
}

#[derive(Debug, Deserialize)]
struct FeedQuote {
    #[serde(rename = "Nominal")]
    nominal: Decimal,
    #[serde(rename = "Value")]
    value: Decimal,
}

impl DailyFeed {
    fn per_unit(&self, code: &'static str) -> Result<Decimal, RateError> {
        let quote = self
            .valute
            .get(code)
            .ok_or(RateError::MissingCurrency(code))?;
        if quote.nominal <= Decimal::ZERO {
            return Err(RateError::NonPositive);
        }
        Ok(quote.value / quote.nominal)
    }

    fn rates(&self) -> Result<Rates, RateError> {
        Rates::new(self.per_unit("USD")?, self.per_unit("CNY")?)
    }
}

/// Client for the Central Bank of Russia daily rates feed.
#[derive(Clone)]
pub struct CbrRateClient {
    client: reqwest::Client,
    url: String,
}

impl CbrRateClient {
    /// Create a new rate client with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &RatesConfig) -> Result<Self, RateError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

impl RateSource for CbrRateClient {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_rates(&self) -> Result<Rates, RateError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(RateError::Api {
                status: status.as_u16(),
            });
        }

        let feed: DailyFeed = response
            .json()
            .await
            .map_err(|e| RateError::Parse(e.to_string()))?;

        let rates = feed.rates()?;
        tracing::debug!(
            usd_to_rub = %rates.usd_to_rub,
            cny_to_rub = %rates.cny_to_rub,
            "Fetched exchange rates"
        );
        Ok(rates)
    }
}

// =============================================================================
// Fixed rates
// =============================================================================

/// Rate source returning preset rates, or failing every call.
///
/// Counts fetches so callers can verify rates are refetched per operation.
#[derive(Debug, Clone)]
pub struct FixedRates {
    rates: Option<Rates>,
    calls: Arc<AtomicUsize>,
}

impl FixedRates {
    /// Always return `rates`.
    #[must_use]
    pub fn new(rates: Rates) -> Self {
        Self {
            rates: Some(rates),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail every fetch as if the feed were down.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            rates: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of fetches so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RateSource for FixedRates {
    async fn fetch_rates(&self) -> Result<Rates, RateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rates.ok_or(RateError::Api { status: 503 })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rates_reject_non_positive() {
        assert!(matches!(
            Rates::new(dec!(0), dec!(13)),
            Err(RateError::NonPositive)
        ));
        assert!(matches!(
            Rates::new(dec!(95), dec!(-1)),
            Err(RateError::NonPositive)
        ));
    }

    #[test]
    fn test_cross_rate_and_conversions() {
        let rates = Rates::new(dec!(95), dec!(13)).unwrap();
        assert_eq!(rates.cny_per_usd().round_dp(4), dec!(7.3077));
        assert_eq!(rates.cny_to_rub_amount(dec!(280)), dec!(3640.00));
        assert_eq!(rates.rub_to_cny_amount(dec!(1000)), dec!(76.92));
    }

    #[test]
    fn test_money_rounds_half_away_from_zero() {
        assert_eq!(money(dec!(0.125)), dec!(0.13));
        assert_eq!(money(dec!(-0.125)), dec!(-0.13));
    }

    #[test]
    fn test_feed_parsing_divides_by_nominal() {
        let json = r#"{
            "Date": "2024-05-17T11:30:00+03:00",
            "Valute": {
                "USD": {"CharCode": "USD", "Nominal": 1, "Value": 91.2},
                "CNY": {"CharCode": "CNY", "Nominal": 10, "Value": 126.5}
            }
        }"#;
        let feed: DailyFeed = serde_json::from_str(json).unwrap();
        let rates = feed.rates().unwrap();
        assert_eq!(rates.usd_to_rub(), dec!(91.2));
        assert_eq!(rates.cny_to_rub(), dec!(12.65));
    }

    #[test]
    fn test_feed_missing_currency() {
        let json = r#"{"Valute": {"USD": {"Nominal": 1, "Value": 91.2}}}"#;
        let feed: DailyFeed = serde_json::from_str(json).unwrap();
        assert!(matches!(feed.rates(), Err(RateError::MissingCurrency("CNY"))));
    }

    #[tokio::test]
    async fn test_fixed_rates_count_calls() {
        let source = FixedRates::new(Rates::new(dec!(95), dec!(13)).unwrap());
        source.fetch_rates().await.unwrap();
        source.clone().fetch_rates().await.unwrap();
        assert_eq!(source.calls(), 2);

        let down = FixedRates::unavailable();
        assert!(down.fetch_rates().await.is_err());
    }
}
