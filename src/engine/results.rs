// 8.0.2: result types and errors for engine operations.

use crate::account::AccountError;
use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::market::PriceMap;
use crate::position::Position;
use crate::settlement::{BatchStatus, FailedSettlement};
use crate::types::{InstrumentId, OwnerId, PositionId, Quote, Timestamp, TransferId};
use rust_decimal::Decimal;

/// What one tick did.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub time: Timestamp,
    pub prices: PriceMap,
    pub evaluated: usize,
    pub closed: Vec<Position>,
    pub failed: Vec<FailedSettlement>,
    pub observers: usize,
}

impl TickReport {
    pub fn settlement_status(&self) -> BatchStatus {
        BatchStatus::of(self.closed.len(), self.failed.len())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Instrument {0} not found")]
    UnknownInstrument(InstrumentId),

    #[error("No usable price for instrument {0}")]
    NoPrice(InstrumentId),

    #[error("Invalid size {0}")]
    InvalidSize(Decimal),

    #[error("Invalid price {0}")]
    InvalidPrice(Decimal),

    #[error("Invalid amount {0}")]
    InvalidAmount(Quote),

    #[error("Account {0:?} not found")]
    AccountNotFound(OwnerId),

    #[error("Account {0:?} already exists")]
    AccountExists(OwnerId),

    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Quote, available: Quote },

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Quote, available: Quote },

    #[error("Position {0:?} not found")]
    PositionNotFound(PositionId),

    #[error("Position {position:?} is not owned by {owner:?}")]
    NotOwner { position: PositionId, owner: OwnerId },

    #[error("Position {0:?} is already closed")]
    AlreadyClosed(PositionId),

    #[error("Transfer {0:?} not found")]
    TransferNotFound(TransferId),

    #[error("Transfer {0:?} is not a pending deposit")]
    TransferNotPending(TransferId),

    #[error("Storage error: {0}")]
    Storage(LedgerError),
}

impl EngineError {
    /// Business rejections leave state untouched and are reported to the caller as-is.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, EngineError::Config(_) | EngineError::Storage(_))
    }
}

impl From<AccountError> for EngineError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::InsufficientBalance { requested, available } => {
                EngineError::InsufficientBalance { requested, available }
            }
            AccountError::InsufficientMargin { required, available } => {
                EngineError::InsufficientMargin { required, available }
            }
            AccountError::MarginOverflow { size } => EngineError::InvalidSize(size),
            AccountError::BalanceOverflow { amount } => EngineError::InvalidAmount(amount),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::AccountNotFound(owner) => EngineError::AccountNotFound(owner),
            LedgerError::AccountExists(owner) => EngineError::AccountExists(owner),
            LedgerError::PositionNotFound(id) => EngineError::PositionNotFound(id),
            LedgerError::PositionClosed(id) => EngineError::AlreadyClosed(id),
            LedgerError::NotOwner { position, owner } => EngineError::NotOwner { position, owner },
            LedgerError::TransferNotFound(id) => EngineError::TransferNotFound(id),
            LedgerError::TransferNotPending(id) => EngineError::TransferNotPending(id),
            LedgerError::Account(inner) => inner.into(),
            fault @ (LedgerError::Fault(_) | LedgerError::Timeout(_)) => EngineError::Storage(fault),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::FaultPoint;
    use rust_decimal_macros::dec;

    #[test]
    fn faults_are_not_rejections() {
        let fault: EngineError = LedgerError::Fault(FaultPoint::Commit).into();
        assert!(!fault.is_rejection());

        let timeout: EngineError = LedgerError::Timeout(std::time::Duration::from_millis(5)).into();
        assert!(matches!(timeout, EngineError::Storage(_)));
        assert!(!timeout.is_rejection());

        let closed: EngineError = LedgerError::PositionClosed(PositionId(3)).into();
        assert_eq!(closed, EngineError::AlreadyClosed(PositionId(3)));
        assert!(closed.is_rejection());
    }

    #[test]
    fn account_errors_flatten() {
        let err: EngineError = LedgerError::Account(AccountError::InsufficientBalance {
            requested: Quote::new(dec!(10)),
            available: Quote::new(dec!(5)),
        })
        .into();
        assert!(matches!(err, EngineError::InsufficientBalance { .. }));
    }
}
