//! Unified error handling with Sentry integration.
//!
//! Every engine operation returns `Result<T, MarketError>`. The same type is
//! the HTTP error: server-side failures are captured to Sentry and logged
//! before a generic message is sent, user-correctable failures carry their
//! specific reason.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use rubuy_core::{Currency, ModelId};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::rates::RateError;

/// Entity kinds used in not-found errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Product,
    Model,
    CartEntry,
    Order,
    Shipment,
    Replenishment,
    Withdrawal,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Product => "product",
            Self::Model => "model",
            Self::CartEntry => "cart entry",
            Self::Order => "order",
            Self::Shipment => "shipment",
            Self::Replenishment => "replenishment",
            Self::Withdrawal => "withdrawal",
        })
    }
}

/// Failure taxonomy of the marketplace engine.
#[derive(Debug, Error)]
pub enum MarketError {
    /// Malformed or missing input the caller can correct.
    #[error("{0}")]
    Validation(String),

    #[error("insufficient {currency} balance: need {needed}, have {available}")]
    InsufficientFunds {
        currency: Currency,
        needed: Decimal,
        available: Decimal,
    },

    #[error("insufficient stock for model {model}: requested {requested}, available {available}")]
    InsufficientStock {
        model: ModelId,
        requested: i32,
        available: i32,
    },

    #[error("{0} {1} not found")]
    NotFound(Entity, i32),

    /// A request, payment or mirror entry that was already settled.
    #[error("{0} already processed")]
    AlreadyProcessed(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("exchange rates unavailable: {0}")]
    RatesUnavailable(#[from] RateError),

    #[error("persistence error: {0}")]
    Persistence(#[from] RepositoryError),
}

impl MarketError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the failure originates on the server side rather than in the request.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::RatesUnavailable(_) | Self::Persistence(_))
    }

    /// HTTP status for this failure.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientFunds { .. }
            | Self::InsufficientStock { .. }
            | Self::AlreadyProcessed(_) => StatusCode::CONFLICT,
            Self::NotFound(..) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RatesUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for MarketError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(RepositoryError::Database(err))
    }
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::RatesUnavailable(_) => {
                "Exchange rates are temporarily unavailable, please try again".to_string()
            }
            Self::Persistence(_) => "Internal server error, please try again".to_string(),
            _ => self.to_string(),
        };

        (self.status_code(), Json(ErrorBody { error: message })).into_response()
    }
}

/// Result type alias for `MarketError`.
pub type Result<T> = std::result::Result<T, MarketError>;

/// Set the Sentry user context for the acting user.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: MarketError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_display_is_specific_for_user_errors() {
        let err = MarketError::InsufficientFunds {
            currency: Currency::Cny,
            needed: Decimal::from(280),
            available: Decimal::from(50),
        };
        assert_eq!(
            err.to_string(),
            "insufficient CNY balance: need 280, have 50"
        );

        let err = MarketError::NotFound(Entity::Shipment, 12);
        assert_eq!(err.to_string(), "shipment 12 not found");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            status(MarketError::validation("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(MarketError::InsufficientStock {
                model: ModelId::new(1),
                requested: 3,
                available: 1,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(MarketError::NotFound(Entity::Order, 1)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(MarketError::AlreadyProcessed("withdrawal 3".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(MarketError::Forbidden("admin only".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(MarketError::RatesUnavailable(RateError::NonPositive)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(MarketError::Persistence(RepositoryError::NotFound)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_server_errors_are_flagged() {
        assert!(MarketError::RatesUnavailable(RateError::NonPositive).is_server_error());
        assert!(!MarketError::validation("x").is_server_error());
    }
}
