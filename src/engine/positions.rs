//! Opening, manually closing and querying positions.

use super::core::Engine;
use super::results::EngineError;
use crate::account::{check_margin, Account};
use crate::conditional::ClosureInstruction;
use crate::events::{EventPayload, OpenRejectedEvent, PositionClosedEvent, PositionOpenedEvent};
use crate::position::{OpenRequest, Position};
use crate::settlement::settle;
use crate::types::{OwnerId, PositionId, Price, Quote};
use rust_decimal::Decimal;
use tracing::info;

impl Engine {
    /// Open a position after checking margin against the current balance.
    ///
    /// The check reads the balance and then inserts; nothing is reserved or debited.
    pub fn open_position(&self, request: OpenRequest) -> Result<PositionId, EngineError> {
        if let Err(e) = self.validate_open(&request) {
            self.reject_open(&request, &e);
            return Err(e);
        }

        let account = self.ledger.account(request.owner)?;
        let required = match check_margin(&account, request.size, request.entry_price, self.config.leverage) {
            Ok(required) => required,
            Err(e) => {
                let e = EngineError::from(e);
                self.reject_open(&request, &e);
                return Err(e);
            }
        };

        let position = self.ledger.insert_position(request, self.time())?;

        info!(
            position = position.id.0,
            owner = position.owner.0,
            instrument = %position.instrument,
            side = ?position.side,
            size = %position.size,
            entry = %position.entry_price,
            "position opened"
        );

        self.emit_event(EventPayload::PositionOpened(PositionOpenedEvent {
            position_id: position.id,
            owner: position.owner,
            instrument: position.instrument.clone(),
            side: position.side,
            size: position.size,
            entry_price: position.entry_price,
            take_profit: position.take_profit,
            stop_loss: position.stop_loss,
            required_margin: required,
        }));

        Ok(position.id)
    }

    fn validate_open(&self, request: &OpenRequest) -> Result<(), EngineError> {
        if self.config.instrument(&request.instrument).is_none() {
            return Err(EngineError::UnknownInstrument(request.instrument.clone()));
        }
        if request.size <= Decimal::ZERO {
            return Err(EngineError::InvalidSize(request.size));
        }
        // deserialized prices skip Price::new
        for price in [Some(request.entry_price), request.take_profit, request.stop_loss].into_iter().flatten() {
            if price.value() <= Decimal::ZERO {
                return Err(EngineError::InvalidPrice(price.value()));
            }
        }
        Ok(())
    }

    fn reject_open(&self, request: &OpenRequest, reason: &EngineError) {
        info!(owner = request.owner.0, instrument = %request.instrument, reason = %reason, "open rejected");
        self.emit_event(EventPayload::OpenRejected(OpenRejectedEvent {
            owner: request.owner,
            instrument: request.instrument.clone(),
            size: request.size,
            reason: reason.to_string(),
        }));
    }

    /// Close a position at a caller-supplied price and return the realized pnl.
    pub fn close_position(
        &self,
        owner: OwnerId,
        position_id: PositionId,
        close_price: Price,
    ) -> Result<Quote, EngineError> {
        if close_price.value() <= Decimal::ZERO {
            return Err(EngineError::InvalidPrice(close_price.value()));
        }
        let position = self.ledger.position(position_id)?;
        if position.owner != owner {
            return Err(EngineError::NotOwner { position: position_id, owner });
        }
        if !position.is_open() {
            return Err(EngineError::AlreadyClosed(position_id));
        }

        let instruction = ClosureInstruction::manual(&position, close_price)
            .ok_or(EngineError::InvalidPrice(close_price.value()))?;
        let closed = settle(self.ledger.as_ref(), &instruction, self.time())?;

        self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
            position_id: closed.id,
            owner: closed.owner,
            instrument: closed.instrument.clone(),
            close_price,
            realized_pnl: instruction.pnl,
            close_reason: instruction.reason,
        }));

        Ok(instruction.pnl)
    }

    /// Close at the instrument's latest price.
    pub fn close_at_market(&self, owner: OwnerId, position_id: PositionId) -> Result<Quote, EngineError> {
        let position = self.ledger.position(position_id)?;
        let price = self
            .market
            .lock()
            .price(&position.instrument)
            .and_then(Price::from_f64)
            .ok_or_else(|| EngineError::NoPrice(position.instrument.clone()))?;

        self.close_position(owner, position_id, price)
    }

    pub fn position(&self, position_id: PositionId) -> Result<Position, EngineError> {
        Ok(self.ledger.position(position_id)?)
    }

    pub fn open_positions(&self, owner: OwnerId) -> Result<Vec<Position>, EngineError> {
        Ok(self.ledger.open_positions_for(owner)?)
    }

    /// Closed positions, most recently closed first, capped at `history_limit`.
    pub fn position_history(&self, owner: OwnerId) -> Result<Vec<Position>, EngineError> {
        Ok(self.ledger.closed_positions_for(owner, self.config.history_limit)?)
    }

    pub fn account(&self, owner: OwnerId) -> Result<Account, EngineError> {
        Ok(self.ledger.account(owner)?)
    }

    pub fn balance(&self, owner: OwnerId) -> Result<Quote, EngineError> {
        Ok(self.ledger.account(owner)?.balance)
    }
}
