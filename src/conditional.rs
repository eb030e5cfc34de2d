//! Take-profit and stop-loss evaluation.
//!
//! Thresholds live on the position itself. Each tick the evaluator compares the
//! latest feed price against them and produces closure instructions; it never
//! mutates anything. A crossed threshold fills at the threshold price, not at the
//! market price that crossed it.
//!
//! When both thresholds are crossed in the same tick, take-profit wins.

use crate::market::PriceMap;
use crate::position::{CloseReason, Position};
use crate::types::{OwnerId, PositionId, Price, Quote, Side};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How the trigger price should be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerCondition {
    /// Triggers when price is at or above the trigger.
    AtOrAbove,
    /// Triggers when price is at or below the trigger.
    AtOrBelow,
}

impl TriggerCondition {
    pub fn take_profit(side: Side) -> Self {
        match side {
            Side::Long => TriggerCondition::AtOrAbove,
            Side::Short => TriggerCondition::AtOrBelow,
        }
    }

    pub fn stop_loss(side: Side) -> Self {
        match side {
            Side::Long => TriggerCondition::AtOrBelow,
            Side::Short => TriggerCondition::AtOrAbove,
        }
    }

    pub fn is_met(&self, current: Price, trigger: Price) -> bool {
        match self {
            TriggerCondition::AtOrAbove => current >= trigger,
            TriggerCondition::AtOrBelow => current <= trigger,
        }
    }
}

/// Instruction for the settlement executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureInstruction {
    pub position_id: PositionId,
    pub owner: OwnerId,
    pub close_price: Price,
    pub pnl: Quote,
    pub reason: CloseReason,
}

impl ClosureInstruction {
    /// Manual close at a caller-supplied price. Same formula as the automatic path.
    /// None if the pnl is out of range.
    pub fn manual(position: &Position, close_price: Price) -> Option<Self> {
        Some(Self {
            position_id: position.id,
            owner: position.owner,
            close_price,
            pnl: position.pnl_at(close_price)?,
            reason: CloseReason::UserClosed,
        })
    }
}

/// Which threshold, if any, `current` crosses for this position.
pub fn check_trigger(position: &Position, current: Price) -> Option<(CloseReason, Price)> {
    if !position.is_open() {
        return None;
    }

    if let Some(tp) = position.take_profit {
        if TriggerCondition::take_profit(position.side).is_met(current, tp) {
            return Some((CloseReason::TakeProfit, tp));
        }
    }

    if let Some(sl) = position.stop_loss {
        if TriggerCondition::stop_loss(position.side).is_met(current, sl) {
            return Some((CloseReason::StopLoss, sl));
        }
    }

    None
}

/// Scan open positions against the latest prices.
///
/// Positions whose instrument has no usable price this tick are left alone, and so
/// is a crossed position whose pnl does not fit in a `Decimal`.
pub fn evaluate<'a>(
    positions: impl IntoIterator<Item = &'a Position>,
    prices: &PriceMap,
) -> Vec<ClosureInstruction> {
    positions
        .into_iter()
        .filter_map(|position| {
            let current = prices
                .get(&position.instrument)
                .copied()
                .and_then(Price::from_f64)?;

            let (reason, close_price) = check_trigger(position, current)?;

            let Some(pnl) = position.pnl_at(close_price) else {
                warn!(position = position.id.0, close_price = %close_price, "pnl out of range, position left open");
                return None;
            };

            Some(ClosureInstruction {
                position_id: position.id,
                owner: position.owner,
                close_price,
                pnl,
                reason,
            })
        })
        .collect()
}
