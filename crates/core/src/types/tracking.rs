//! Tracking codes shared by orders checked out together and by shipments.

use serde::{Deserialize, Serialize};

/// Lowest numeric suffix of a tracking code.
pub const TRACKING_NUMBER_MIN: u64 = 100_000_000;

/// Highest numeric suffix of a tracking code.
pub const TRACKING_NUMBER_MAX: u64 = 9_999_999_999;

/// Which entity family a tracking code belongs to.
///
/// Uniqueness is enforced per namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingNamespace {
    /// Orders created by one checkout.
    Order,
    /// Outbound shipments.
    Shipment,
}

impl TrackingNamespace {
    /// Prefix placed before the numeric part.
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Order => "RUB",
            Self::Shipment => "RUBOX",
        }
    }
}

/// A tracking code such as `RUB123456789` or `RUBOX4200000001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(transparent))]
#[serde(transparent)]
pub struct TrackingCode(String);

impl TrackingCode {
    /// Build a code from its namespace and numeric part.
    ///
    /// Returns `None` when `number` is outside the allowed range.
    #[must_use]
    pub fn compose(namespace: TrackingNamespace, number: u64) -> Option<Self> {
        (TRACKING_NUMBER_MIN..=TRACKING_NUMBER_MAX)
            .contains(&number)
            .then(|| Self(format!("{}{number}", namespace.prefix())))
    }

    /// Wrap a stored code without validation.
    #[must_use]
    pub const fn from_stored(code: String) -> Self {
        Self(code)
    }

    /// Namespace inferred from the prefix.
    ///
    /// `RUBOX` is checked first since `RUB` is a prefix of it.
    #[must_use]
    pub fn namespace(&self) -> Option<TrackingNamespace> {
        [TrackingNamespace::Shipment, TrackingNamespace::Order]
            .into_iter()
            .find(|ns| {
                self.0
                    .strip_prefix(ns.prefix())
                    .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
            })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_uses_namespace_prefix() {
        let order = TrackingCode::compose(TrackingNamespace::Order, 123_456_789);
        assert_eq!(order.as_ref().map(TrackingCode::as_str), Some("RUB123456789"));

        let shipment = TrackingCode::compose(TrackingNamespace::Shipment, 9_999_999_999);
        assert_eq!(
            shipment.as_ref().map(TrackingCode::as_str),
            Some("RUBOX9999999999")
        );
    }

    #[test]
    fn test_compose_rejects_out_of_range() {
        assert!(TrackingCode::compose(TrackingNamespace::Order, 99_999_999).is_none());
        assert!(TrackingCode::compose(TrackingNamespace::Order, 10_000_000_000).is_none());
    }

    #[test]
    fn test_namespace_prefers_longer_prefix() {
        let code = TrackingCode::from_stored("RUBOX100000000".to_string());
        assert_eq!(code.namespace(), Some(TrackingNamespace::Shipment));

        let code = TrackingCode::from_stored("RUB100000000".to_string());
        assert_eq!(code.namespace(), Some(TrackingNamespace::Order));

        let code = TrackingCode::from_stored("RUBX1".to_string());
        assert_eq!(code.namespace(), None);
    }
}
