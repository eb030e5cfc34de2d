// 4.0: position records. one owner, one instrument, fixed size and direction.
// closure is a single transition: status, close price, pnl and closed_at are set together.
// 4.1 holds the pnl and margin formulas shared by automatic and manual closes.

use crate::types::{InstrumentId, Leverage, OwnerId, PositionId, Price, Quote, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    UserClosed,
    StopLoss,
    TakeProfit,
}

/// Validated request to open a position, before it gets an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRequest {
    pub owner: OwnerId,
    pub instrument: InstrumentId,
    pub size: Decimal,
    pub side: Side,
    pub entry_price: Price,
    pub take_profit: Option<Price>,
    pub stop_loss: Option<Price>,
}

impl OpenRequest {
    pub fn new(
        owner: OwnerId,
        instrument: InstrumentId,
        side: Side,
        size: Decimal,
        entry_price: Price,
    ) -> Self {
        Self {
            owner,
            instrument,
            size,
            side,
            entry_price,
            take_profit: None,
            stop_loss: None,
        }
    }

    pub fn with_take_profit(mut self, price: Price) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_stop_loss(mut self, price: Price) -> Self {
        self.stop_loss = Some(price);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub owner: OwnerId,
    pub instrument: InstrumentId,
    pub size: Decimal,
    pub side: Side,
    pub entry_price: Price,
    pub take_profit: Option<Price>,
    pub stop_loss: Option<Price>,
    pub status: PositionStatus,
    pub close_price: Option<Price>,
    pub realized_pnl: Option<Quote>,
    pub close_reason: Option<CloseReason>,
    pub opened_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl Position {
    pub fn open(id: PositionId, request: OpenRequest, timestamp: Timestamp) -> Self {
        Self {
            id,
            owner: request.owner,
            instrument: request.instrument,
            size: request.size,
            side: request.side,
            entry_price: request.entry_price,
            take_profit: request.take_profit,
            stop_loss: request.stop_loss,
            status: PositionStatus::Open,
            close_price: None,
            realized_pnl: None,
            close_reason: None,
            opened_at: timestamp,
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    // pnl if the position were closed at `price`, None on overflow
    pub fn pnl_at(&self, price: Price) -> Option<Quote> {
        calculate_realized_pnl(self.side, self.size, self.entry_price, price)
    }

    /// Returns the closed form of this position. The caller persists it.
    pub fn closed(
        &self,
        close_price: Price,
        pnl: Quote,
        reason: CloseReason,
        timestamp: Timestamp,
    ) -> Position {
        debug_assert!(self.is_open(), "closing an already closed position");
        Position {
            status: PositionStatus::Closed,
            close_price: Some(close_price),
            realized_pnl: Some(pnl),
            close_reason: Some(reason),
            closed_at: Some(timestamp),
            ..self.clone()
        }
    }
}

// 4.1: the pnl formula. long: (close - entry) * size. short: (entry - close) * size.
// None when the product leaves Decimal's range.
pub fn calculate_realized_pnl(side: Side, size: Decimal, entry_price: Price, close_price: Price) -> Option<Quote> {
    let delta = side.sign().checked_mul(close_price.value().checked_sub(entry_price.value())?)?;
    delta.checked_mul(size).map(Quote::new)
}

// 4.2: collateral needed to open. size * entry / leverage. checked, never debited.
pub fn calculate_required_margin(size: Decimal, entry_price: Price, leverage: Leverage) -> Option<Quote> {
    size.checked_mul(entry_price.value())?
        .checked_mul(leverage.initial_margin_fraction())
        .map(Quote::new)
}
