// 9.2 custody.rs: deposit and withdrawal records. separate from trading positions.
// a deposit is requested, then approved (which credits the balance). a withdrawal
// debits at request time and is recorded already approved.

use serde::{Deserialize, Serialize};

use crate::types::{OwnerId, Quote, Timestamp, TransferId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Approved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub owner: OwnerId,
    pub kind: TransferKind,
    pub amount: Quote,
    pub status: TransferStatus,
    pub created_at: Timestamp,
    pub approved_at: Option<Timestamp>,
}

impl Transfer {
    pub fn deposit_request(id: TransferId, owner: OwnerId, amount: Quote, created_at: Timestamp) -> Self {
        Self {
            id,
            owner,
            kind: TransferKind::Deposit,
            amount,
            status: TransferStatus::Pending,
            created_at,
            approved_at: None,
        }
    }

    pub fn withdrawal(id: TransferId, owner: OwnerId, amount: Quote, created_at: Timestamp) -> Self {
        Self {
            id,
            owner,
            kind: TransferKind::Withdrawal,
            amount,
            status: TransferStatus::Approved,
            created_at,
            approved_at: Some(created_at),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransferStatus::Pending
    }

    pub fn approve(&mut self, timestamp: Timestamp) {
        self.status = TransferStatus::Approved;
        self.approved_at = Some(timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn deposit_starts_pending() {
        let mut t = Transfer::deposit_request(TransferId(1), OwnerId(1), Quote::new(dec!(100)), Timestamp::from_millis(5));
        assert!(t.is_pending());
        t.approve(Timestamp::from_millis(9));
        assert_eq!(t.status, TransferStatus::Approved);
        assert_eq!(t.approved_at, Some(Timestamp::from_millis(9)));
    }

    #[test]
    fn withdrawal_is_approved_on_creation() {
        let t = Transfer::withdrawal(TransferId(2), OwnerId(1), Quote::new(dec!(50)), Timestamp::from_millis(5));
        assert!(!t.is_pending());
        assert_eq!(t.kind, TransferKind::Withdrawal);
    }
}
