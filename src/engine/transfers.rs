//! Accounts, deposits and withdrawals.

use super::core::Engine;
use super::results::EngineError;
use crate::account::Account;
use crate::custody::Transfer;
use crate::events::{DepositEvent, DepositRequestedEvent, EventPayload, WithdrawalEvent, WithdrawalRejectedEvent};
use crate::types::{OwnerId, Quote, TransferId};
use tracing::info;

impl Engine {
    pub fn create_account(&self, owner: OwnerId, initial_balance: Quote) -> Result<Account, EngineError> {
        if initial_balance.is_negative() {
            return Err(EngineError::InvalidAmount(initial_balance));
        }
        Ok(self.ledger.create_account(owner, initial_balance, self.time())?)
    }

    /// Record a pending deposit. The balance moves only on approval.
    pub fn request_deposit(&self, owner: OwnerId, amount: Quote) -> Result<TransferId, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(amount));
        }

        let transfer = self.ledger.request_deposit(owner, amount, self.time())?;

        self.emit_event(EventPayload::DepositRequested(DepositRequestedEvent {
            transfer_id: transfer.id,
            owner,
            amount,
        }));

        Ok(transfer.id)
    }

    /// Approve a pending deposit and credit it. Returns the new balance.
    pub fn approve_deposit(&self, transfer_id: TransferId) -> Result<Quote, EngineError> {
        let (transfer, account) = self.ledger.approve_deposit(transfer_id, self.time())?;

        info!(transfer = transfer.id.0, owner = transfer.owner.0, amount = %transfer.amount, "deposit approved");

        self.emit_event(EventPayload::DepositApproved(DepositEvent {
            transfer_id: transfer.id,
            owner: transfer.owner,
            amount: transfer.amount,
            new_balance: account.balance,
        }));

        Ok(account.balance)
    }

    /// Debit the balance and record the withdrawal. Returns the new balance.
    pub fn request_withdrawal(&self, owner: OwnerId, amount: Quote) -> Result<Quote, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(amount));
        }

        let (transfer, account) = match self.ledger.request_withdrawal(owner, amount, self.time()) {
            Ok(done) => done,
            Err(e) => {
                let e = EngineError::from(e);
                if e.is_rejection() {
                    // emit rejection event for audit
                    self.emit_event(EventPayload::WithdrawalRejected(WithdrawalRejectedEvent {
                        owner,
                        amount,
                        reason: e.to_string(),
                    }));
                }
                return Err(e);
            }
        };

        info!(transfer = transfer.id.0, owner = owner.0, amount = %amount, "withdrawal recorded");

        self.emit_event(EventPayload::Withdrawal(WithdrawalEvent {
            transfer_id: transfer.id,
            owner,
            amount,
            new_balance: account.balance,
        }));

        Ok(account.balance)
    }

    /// An owner's deposits and withdrawals, newest first.
    pub fn transfers(&self, owner: OwnerId) -> Result<Vec<Transfer>, EngineError> {
        Ok(self.ledger.transfers_for(owner)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::custody::TransferKind;
    use rust_decimal_macros::dec;

    fn setup_engine() -> Engine {
        let engine = Engine::from_config(SimConfig::default().with_seed(3)).unwrap();
        engine.create_account(OwnerId(1), Quote::new(dec!(500))).unwrap();
        engine
    }

    #[test]
    fn duplicate_account_rejected() {
        let engine = setup_engine();
        let err = engine.create_account(OwnerId(1), Quote::zero()).unwrap_err();
        assert_eq!(err, EngineError::AccountExists(OwnerId(1)));
    }

    #[test]
    fn deposit_flow() {
        let engine = setup_engine();
        let id = engine.request_deposit(OwnerId(1), Quote::new(dec!(250))).unwrap();
        assert_eq!(engine.balance(OwnerId(1)).unwrap().value(), dec!(500));

        let balance = engine.approve_deposit(id).unwrap();
        assert_eq!(balance.value(), dec!(750));
        assert_eq!(engine.approve_deposit(id), Err(EngineError::TransferNotPending(id)));
        assert_eq!(engine.approve_deposit(TransferId(99)), Err(EngineError::TransferNotFound(TransferId(99))));
    }

    #[test]
    fn withdrawal_flow() {
        let engine = setup_engine();

        let err = engine.request_withdrawal(OwnerId(1), Quote::new(dec!(600))).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance { .. }));
        assert_eq!(engine.balance(OwnerId(1)).unwrap().value(), dec!(500));

        let balance = engine.request_withdrawal(OwnerId(1), Quote::new(dec!(200))).unwrap();
        assert_eq!(balance.value(), dec!(300));

        let events = engine.events();
        assert!(matches!(events[0].payload, EventPayload::WithdrawalRejected(_)));
        assert!(matches!(events[1].payload, EventPayload::Withdrawal(_)));
    }

    #[test]
    fn amounts_must_be_positive() {
        let engine = setup_engine();
        assert!(matches!(engine.request_deposit(OwnerId(1), Quote::zero()), Err(EngineError::InvalidAmount(_))));
        assert!(matches!(
            engine.request_withdrawal(OwnerId(1), Quote::new(dec!(-5))),
            Err(EngineError::InvalidAmount(_))
        ));
    }

    #[test]
    fn transfers_newest_first() {
        let engine = setup_engine();
        let deposit = engine.request_deposit(OwnerId(1), Quote::new(dec!(10))).unwrap();
        engine.request_withdrawal(OwnerId(1), Quote::new(dec!(20))).unwrap();

        let transfers = engine.transfers(OwnerId(1)).unwrap();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].kind, TransferKind::Withdrawal);
        assert_eq!(transfers[1].id, deposit);
    }
}
