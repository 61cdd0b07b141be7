//! Marketplace user with its wallet.

use chrono::{DateTime, Utc};
use rubuy_core::{Balances, UserId};
use serde::Serialize;

use crate::error::MarketError;

/// A user and the two wallet balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub is_admin: bool,
    pub balances: Balances,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Fail unless this user is an administrator.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::Forbidden` for regular users.
    pub fn ensure_admin(&self) -> Result<(), MarketError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(MarketError::Forbidden(format!(
                "user {} is not an administrator",
                self.id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_admin() {
        let mut user = User {
            id: UserId::new(4),
            name: "Lena".to_string(),
            is_admin: false,
            balances: Balances::default(),
            created_at: Utc::now(),
        };
        assert!(matches!(user.ensure_admin(), Err(MarketError::Forbidden(_))));

        user.is_admin = true;
        assert!(user.ensure_admin().is_ok());
    }
}
