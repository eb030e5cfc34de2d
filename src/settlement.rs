// 9.1 settlement.rs: settlement executor. applies closure instructions through the
// ledger, one unit of work per position. a failed unit leaves its position open and
// the rest of the batch keeps going; the position is re-evaluated on the next tick.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::conditional::ClosureInstruction;
use crate::ledger::{Ledger, LedgerError};
use crate::position::Position;
use crate::types::Timestamp;

// Outcome of a whole batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Empty,
    Committed,
    Partial,
    Failed,
}

impl BatchStatus {
    pub fn of(settled: usize, failed: usize) -> Self {
        match (settled, failed) {
            (0, 0) => BatchStatus::Empty,
            (_, 0) => BatchStatus::Committed,
            (0, _) => BatchStatus::Failed,
            _ => BatchStatus::Partial,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailedSettlement {
    pub instruction: ClosureInstruction,
    pub error: LedgerError,
}

impl FailedSettlement {
    // storage faults get another chance next tick; rejections will not succeed on retry
    pub fn will_retry(&self) -> bool {
        self.error.is_fault()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettlementReport {
    pub settled: Vec<Position>,
    pub failed: Vec<FailedSettlement>,
}

impl SettlementReport {
    pub fn status(&self) -> BatchStatus {
        BatchStatus::of(self.settled.len(), self.failed.len())
    }

    pub fn instruction_count(&self) -> usize {
        self.settled.len() + self.failed.len()
    }
}

/// Settle one instruction as an atomic unit.
pub fn settle(ledger: &dyn Ledger, instruction: &ClosureInstruction, at: Timestamp) -> Result<Position, LedgerError> {
    let closed = ledger.settle(instruction, at)?;
    info!(
        position = closed.id.0,
        owner = closed.owner.0,
        reason = ?instruction.reason,
        close_price = %instruction.close_price.value(),
        pnl = %instruction.pnl,
        "position settled"
    );
    Ok(closed)
}

/// Settle a batch, isolating failures per instruction.
pub fn settle_all(
    ledger: &dyn Ledger,
    instructions: impl IntoIterator<Item = ClosureInstruction>,
    at: Timestamp,
) -> SettlementReport {
    let mut report = SettlementReport::default();

    for instruction in instructions {
        match settle(ledger, &instruction, at) {
            Ok(position) => report.settled.push(position),
            Err(error) => {
                warn!(
                    position = instruction.position_id.0,
                    owner = instruction.owner.0,
                    error = %error,
                    "settlement failed"
                );
                report.failed.push(FailedSettlement { instruction, error });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditional::evaluate;
    use crate::ledger::{FaultPoint, MemoryLedger};
    use crate::market::PriceMap;
    use crate::position::{CloseReason, OpenRequest};
    use crate::types::{InstrumentId, OwnerId, Price, Quote, Side};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn ledger_with_two_longs() -> MemoryLedger {
        let ledger = MemoryLedger::new();
        let ts = Timestamp::from_millis(0);
        ledger.create_account(OwnerId(1), Quote::new(dec!(100)), ts).unwrap();
        ledger.create_account(OwnerId(2), Quote::new(dec!(100)), ts).unwrap();

        for owner in [OwnerId(1), OwnerId(2)] {
            let req = OpenRequest::new(owner, InstrumentId::new("EUR/USD"), Side::Long, dec!(10), Price::new_unchecked(dec!(1.10)))
                .with_take_profit(Price::new_unchecked(dec!(1.20)));
            ledger.insert_position(req, ts).unwrap();
        }
        ledger
    }

    fn crossing_prices() -> PriceMap {
        let mut prices = PriceMap::new();
        prices.insert(InstrumentId::new("EUR/USD"), 1.25);
        prices
    }

    #[test]
    fn batch_settles_everything() {
        let ledger = ledger_with_two_longs();
        let open = ledger.open_positions().unwrap();
        let instructions = evaluate(&open, &crossing_prices());

        let report = settle_all(&ledger, instructions, Timestamp::from_millis(5));
        assert_eq!(report.status(), BatchStatus::Committed);
        assert_eq!(report.settled.len(), 2);
        assert!(report.settled.iter().all(|p| p.close_reason == Some(CloseReason::TakeProfit)));
        assert_eq!(ledger.account(OwnerId(1)).unwrap().balance.value(), dec!(101.00));
        assert_eq!(ledger.account(OwnerId(2)).unwrap().balance.value(), dec!(101.00));
    }

    #[test]
    fn one_fault_does_not_block_the_rest() {
        let ledger = ledger_with_two_longs();
        ledger.inject_fault(FaultPoint::AfterBalanceWrite, 1);

        let open = ledger.open_positions().unwrap();
        let report = settle_all(&ledger, evaluate(&open, &crossing_prices()), Timestamp::from_millis(5));

        assert_eq!(report.status(), BatchStatus::Partial);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].will_retry());

        // first position rolled back, second committed
        assert!(ledger.position(open[0].id).unwrap().is_open());
        assert_eq!(ledger.account(OwnerId(1)).unwrap().balance.value(), dec!(100));
        assert!(!ledger.position(open[1].id).unwrap().is_open());
        assert_eq!(ledger.account(OwnerId(2)).unwrap().balance.value(), dec!(101.00));
    }

    #[test]
    fn stale_instruction_is_rejected_not_retried() {
        let ledger = ledger_with_two_longs();
        let open = ledger.open_positions().unwrap();
        let instructions = evaluate(&open, &crossing_prices());

        // closed manually between evaluation and settlement
        ledger
            .settle(&ClosureInstruction::manual(&open[0], Price::new_unchecked(dec!(1.15))).unwrap(), Timestamp::from_millis(3))
            .unwrap();

        let report = settle_all(&ledger, instructions, Timestamp::from_millis(5));
        assert_eq!(report.failed.len(), 1);
        assert!(!report.failed[0].will_retry());
        assert_eq!(ledger.account(OwnerId(1)).unwrap().balance.value(), dec!(100.50));
    }

    #[test]
    fn stalled_settlement_does_not_hold_up_the_batch() {
        let ledger = MemoryLedger::with_timeout(Duration::from_millis(40));
        let ts = Timestamp::from_millis(0);
        for owner in [OwnerId(1), OwnerId(2)] {
            ledger.create_account(owner, Quote::new(dec!(100)), ts).unwrap();
            let req = OpenRequest::new(owner, InstrumentId::new("EUR/USD"), Side::Long, dec!(10), Price::new_unchecked(dec!(1.10)))
                .with_take_profit(Price::new_unchecked(dec!(1.20)));
            ledger.insert_position(req, ts).unwrap();
        }
        ledger.inject_delay(FaultPoint::AfterBalanceWrite, Duration::from_millis(100), 1);

        let open = ledger.open_positions().unwrap();
        let report = settle_all(&ledger, evaluate(&open, &crossing_prices()), Timestamp::from_millis(5));

        assert_eq!(report.status(), BatchStatus::Partial);
        assert_eq!(report.failed[0].instruction.position_id, open[0].id);
        assert_eq!(report.failed[0].error, LedgerError::Timeout(Duration::from_millis(40)));
        assert!(report.failed[0].will_retry());
        assert_eq!(report.settled[0].id, open[1].id);
        assert_eq!(ledger.account(OwnerId(1)).unwrap().balance.value(), dec!(100));
    }

    #[test]
    fn batch_status_from_counts() {
        assert_eq!(BatchStatus::of(0, 0), BatchStatus::Empty);
        assert_eq!(BatchStatus::of(3, 0), BatchStatus::Committed);
        assert_eq!(BatchStatus::of(2, 1), BatchStatus::Partial);
        assert_eq!(BatchStatus::of(0, 2), BatchStatus::Failed);
    }

    #[test]
    fn empty_batch() {
        let ledger = MemoryLedger::new();
        let report = settle_all(&ledger, Vec::new(), Timestamp::from_millis(0));
        assert_eq!(report.status(), BatchStatus::Empty);
        assert_eq!(report.instruction_count(), 0);
    }
}
