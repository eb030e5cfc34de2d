//! Account balances.
//!
//! One balance per owner. The balance only moves inside a ledger unit of work:
//! position settlement, deposit approval, or a withdrawal request.

use crate::position::calculate_required_margin;
use crate::types::{Leverage, OwnerId, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub owner: OwnerId,
    pub balance: Quote,
    pub total_deposited: Quote,
    pub total_withdrawn: Quote,
    pub realized_pnl: Quote,
    pub created_at: Timestamp,
}

impl Account {
    pub fn new(owner: OwnerId, initial_balance: Quote, timestamp: Timestamp) -> Self {
        Self {
            owner,
            balance: initial_balance,
            total_deposited: Quote::zero(),
            total_withdrawn: Quote::zero(),
            realized_pnl: Quote::zero(),
            created_at: timestamp,
        }
    }

    pub fn deposit(&mut self, amount: Quote) -> Result<(), AccountError> {
        let overflow = AccountError::BalanceOverflow { amount };
        let balance = self.balance.checked_add(amount).ok_or(overflow.clone())?;
        let total_deposited = self.total_deposited.checked_add(amount).ok_or(overflow)?;
        self.balance = balance;
        self.total_deposited = total_deposited;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: Quote) -> Result<(), AccountError> {
        if amount.value() > self.balance.value() {
            return Err(AccountError::InsufficientBalance {
                requested: amount,
                available: self.balance,
            });
        }
        self.balance = self.balance.sub(amount);
        self.total_withdrawn = self.total_withdrawn.add(amount);
        Ok(())
    }

    // losses may take the balance below zero; there is no liquidation
    pub fn realize_pnl(&mut self, pnl: Quote) -> Result<(), AccountError> {
        let overflow = AccountError::BalanceOverflow { amount: pnl };
        let balance = self.balance.checked_add(pnl).ok_or(overflow.clone())?;
        let realized_pnl = self.realized_pnl.checked_add(pnl).ok_or(overflow)?;
        self.balance = balance;
        self.realized_pnl = realized_pnl;
        Ok(())
    }
}

/// Margin check for a new position. Read-only: margin is never reserved.
pub fn check_margin(
    account: &Account,
    size: Decimal,
    entry_price: Price,
    leverage: Leverage,
) -> Result<Quote, AccountError> {
    let required = calculate_required_margin(size, entry_price, leverage)
        .ok_or(AccountError::MarginOverflow { size })?;
    if account.balance.value() < required.value() {
        return Err(AccountError::InsufficientMargin {
            required,
            available: account.balance,
        });
    }
    Ok(required)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Quote, available: Quote },

    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Quote, available: Quote },

    #[error("Margin for size {size} is out of range")]
    MarginOverflow { size: Decimal },

    #[error("Balance change {amount} is out of range")]
    BalanceOverflow { amount: Quote },
}
