//! Dual-currency wallet: balances, funding and payout requests, history.

pub mod history;

use chrono::NaiveDate;
use rubuy_core::{Balances, Currency, Decision, ReplenishmentId, UserId, WithdrawalId};
use rust_decimal::Decimal;
use tracing::instrument;

use crate::db::Store;
use crate::error::{MarketError, Result};
use crate::models::{NewReplenishment, NewWithdrawal, Replenishment, Review, User, Withdrawal};
use crate::rates::RateSource;
use history::History;

/// Smallest withdrawal accepted, in RUB.
pub const MIN_WITHDRAWAL_RUB: Decimal = Decimal::ONE_HUNDRED;

/// Digits in a payout card number.
pub const CARD_NUMBER_DIGITS: usize = 16;

/// Ledger operations over a [`Store`].
#[derive(Clone)]
pub struct LedgerService<S, R> {
    store: S,
    rates: R,
}

impl<S: Store, R: RateSource> LedgerService<S, R> {
    pub const fn new(store: S, rates: R) -> Self {
        Self { store, rates }
    }

    // -------------------------------------------------------------------------
    // Wallet owners
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn create_user(&self, name: &str, is_admin: bool) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MarketError::validation("user name is required"));
        }
        let user = self.store.create_user(name, is_admin).await?;
        tracing::info!(user_id = %user.id, is_admin, "User created");
        Ok(user)
    }

    pub async fn user(&self, id: UserId) -> Result<User> {
        self.store.user(id).await
    }

    async fn admin(&self, id: UserId) -> Result<User> {
        let user = self.store.user(id).await?;
        user.ensure_admin()?;
        Ok(user)
    }

    // -------------------------------------------------------------------------
    // Balances
    // -------------------------------------------------------------------------

    pub async fn balances(&self, user: UserId) -> Result<Balances> {
        Ok(self.store.user(user).await?.balances)
    }

    /// Apply an additive change to one balance.
    #[instrument(skip(self))]
    pub async fn adjust(&self, user: UserId, currency: Currency, delta: Decimal) -> Result<Balances> {
        self.store.adjust_balance(user, currency, delta).await
    }

    /// Overwrite one balance. Replay of earlier history no longer ends at zero afterwards.
    #[instrument(skip(self))]
    pub async fn correct_balance(
        &self,
        admin: UserId,
        user: UserId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Balances> {
        self.admin(admin).await?;
        let before = self.store.user(user).await?.balances;
        let after = self.store.set_balance(user, currency, amount).await?;
        tracing::warn!(
            admin_id = %admin,
            user_id = %user,
            %currency,
            before = %before.amount(currency),
            after = %after.amount(currency),
            "Balance corrected by administrator"
        );
        Ok(after)
    }

    /// Rebuild the balance history from the ledger-affecting rows.
    #[instrument(skip(self))]
    pub async fn history(&self, user: UserId) -> Result<History> {
        let snapshot = self.store.ledger_snapshot(user).await?;
        Ok(history::history(&snapshot))
    }

    // -------------------------------------------------------------------------
    // Replenishments
    // -------------------------------------------------------------------------

    /// File a funding request; the CNY credit is fixed at today's rate.
    #[instrument(skip(self, receipt_ref))]
    pub async fn request_replenishment(
        &self,
        user: UserId,
        amount_rub: Decimal,
        payment_date: NaiveDate,
        receipt_ref: Option<String>,
    ) -> Result<Replenishment> {
        if amount_rub <= Decimal::ZERO {
            return Err(MarketError::validation("amount must be positive"));
        }
        let rates = self.rates.fetch_rates().await?;
        let request = self
            .store
            .insert_replenishment(NewReplenishment {
                user_id: user,
                amount_rub,
                amount_cny: rates.rub_to_cny_amount(amount_rub),
                payment_date,
                receipt_ref: receipt_ref.filter(|r| !r.trim().is_empty()),
            })
            .await?;
        tracing::info!(
            replenishment_id = %request.id,
            amount_cny = %request.amount_cny,
            "Replenishment requested"
        );
        Ok(request)
    }

    #[instrument(skip(self, comment))]
    pub async fn review_replenishment(
        &self,
        admin: UserId,
        id: ReplenishmentId,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<Replenishment> {
        self.admin(admin).await?;
        let review = Review {
            admin,
            decision,
            comment,
        };
        let request = self.store.review_replenishment(id, &review).await?;
        tracing::info!(
            user_id = %request.user_id,
            status = %request.status,
            "Replenishment reviewed"
        );
        Ok(request)
    }

    pub async fn pending_replenishments(&self, admin: UserId) -> Result<Vec<Replenishment>> {
        self.admin(admin).await?;
        self.store.pending_replenishments().await
    }

    // -------------------------------------------------------------------------
    // Withdrawals
    // -------------------------------------------------------------------------

    /// File a payout request. Balances move only on approval.
    #[instrument(skip(self, card_number, card_holder, name))]
    pub async fn request_withdrawal(
        &self,
        user: UserId,
        amount_rub: Decimal,
        card_number: &str,
        card_holder: &str,
        name: Option<String>,
    ) -> Result<Withdrawal> {
        if amount_rub < MIN_WITHDRAWAL_RUB {
            return Err(MarketError::Validation(format!(
                "minimum withdrawal is {MIN_WITHDRAWAL_RUB} RUB"
            )));
        }
        let card_number = normalize_card_number(card_number)?;
        let card_holder = normalize_card_holder(card_holder)?;

        let request = self
            .store
            .insert_withdrawal(NewWithdrawal {
                user_id: user,
                amount_rub,
                card_number,
                card_holder,
                name: name.filter(|n| !n.trim().is_empty()),
            })
            .await?;
        tracing::info!(withdrawal_id = %request.id, "Withdrawal requested");
        Ok(request.masked())
    }

    /// Approve or reject a payout. Approval also takes the CNY equivalent at
    /// the current rate, capped at what the wallet holds.
    #[instrument(skip(self, comment))]
    pub async fn review_withdrawal(
        &self,
        admin: UserId,
        id: WithdrawalId,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<Withdrawal> {
        self.admin(admin).await?;
        let cny_debit = match decision {
            Decision::Approve => {
                let request = self.store.withdrawal(id).await?;
                let rates = self.rates.fetch_rates().await?;
                rates.rub_to_cny_amount(request.amount_rub)
            }
            Decision::Reject => Decimal::ZERO,
        };

        let review = Review {
            admin,
            decision,
            comment,
        };
        let request = self.store.review_withdrawal(id, &review, cny_debit).await?;
        tracing::info!(
            user_id = %request.user_id,
            status = %request.status,
            amount_cny = ?request.amount_cny,
            "Withdrawal reviewed"
        );
        Ok(request.masked())
    }

    pub async fn pending_withdrawals(&self, admin: UserId) -> Result<Vec<Withdrawal>> {
        self.admin(admin).await?;
        Ok(self
            .store
            .pending_withdrawals()
            .await?
            .into_iter()
            .map(Withdrawal::masked)
            .collect())
    }
}

/// Strip spaces and require exactly sixteen digits.
fn normalize_card_number(raw: &str) -> Result<String> {
    let digits: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() != CARD_NUMBER_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MarketError::Validation(format!(
            "card number must be {CARD_NUMBER_DIGITS} digits"
        )));
    }
    Ok(digits)
}

/// Letters and single spaces only, upper-cased.
fn normalize_card_holder(raw: &str) -> Result<String> {
    let holder = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if holder.is_empty() || !holder.chars().all(|c| c.is_alphabetic() || c == ' ') {
        return Err(MarketError::validation(
            "card holder must contain only letters and spaces",
        ));
    }
    Ok(holder.to_uppercase())
}
