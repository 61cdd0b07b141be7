//! Replenishment and withdrawal requests.

use chrono::{DateTime, NaiveDate, Utc};
use rubuy_core::{Decision, ReplenishmentId, RequestStatus, UserId, WithdrawalId};
use rust_decimal::Decimal;
use serde::Serialize;

/// A request to fund the wallet, reviewed by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Replenishment {
    pub id: ReplenishmentId,
    pub user_id: UserId,
    pub amount_rub: Decimal,
    /// CNY credited on approval, fixed when the request was made.
    pub amount_cny: Decimal,
    pub payment_date: NaiveDate,
    /// Reference to the uploaded payment receipt.
    pub receipt_ref: Option<String>,
    pub status: RequestStatus,
    pub admin_id: Option<UserId>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewReplenishment {
    pub user_id: UserId,
    pub amount_rub: Decimal,
    pub amount_cny: Decimal,
    pub payment_date: NaiveDate,
    pub receipt_ref: Option<String>,
}

/// A request to pay out RUB to a bank card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub amount_rub: Decimal,
    /// CNY debited alongside the RUB amount, set on approval.
    pub amount_cny: Option<Decimal>,
    pub card_number: String,
    pub card_holder: String,
    pub name: Option<String>,
    pub status: RequestStatus,
    pub admin_id: Option<UserId>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Withdrawal {
    /// Copy with the card number reduced to its last four digits.
    #[must_use]
    pub fn masked(mut self) -> Self {
        let digits: Vec<char> = self.card_number.chars().collect();
        let last_four: String = digits
            .get(digits.len().saturating_sub(4)..)
            .unwrap_or_default()
            .iter()
            .collect();
        self.card_number = format!("**** **** **** {last_four}");
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub user_id: UserId,
    pub amount_rub: Decimal,
    pub card_number: String,
    pub card_holder: String,
    pub name: Option<String>,
}

/// An administrator's decision on a pending request.
#[derive(Debug, Clone)]
pub struct Review {
    pub admin: UserId,
    pub decision: Decision,
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_keeps_last_four() {
        let withdrawal = Withdrawal {
            id: WithdrawalId::new(1),
            user_id: UserId::new(1),
            amount_rub: Decimal::from(500),
            amount_cny: None,
            card_number: "2200700012345678".to_string(),
            card_holder: "IVAN PETROV".to_string(),
            name: None,
            status: RequestStatus::Pending,
            admin_id: None,
            comment: None,
            created_at: Utc::now(),
            processed_at: None,
        };

        assert_eq!(withdrawal.masked().card_number, "**** **** **** 5678");
    }
}
