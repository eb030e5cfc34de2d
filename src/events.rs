// 11.0: every state change the core makes produces an event. used as an audit trail
// of opens, closes, rejections and transfers. the EventPayload enum lists all of them.

use crate::position::CloseReason;
use crate::types::{InstrumentId, OwnerId, PositionId, Price, Quote, Side, Timestamp, TransferId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Position events
    PositionOpened(PositionOpenedEvent),
    PositionClosed(PositionClosedEvent),
    OpenRejected(OpenRejectedEvent),
    SettlementFailed(SettlementFailedEvent),

    // Custody events
    DepositRequested(DepositRequestedEvent),
    DepositApproved(DepositEvent),
    Withdrawal(WithdrawalEvent),
    WithdrawalRejected(WithdrawalRejectedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub position_id: PositionId,
    pub owner: OwnerId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Price,
    pub take_profit: Option<Price>,
    pub stop_loss: Option<Price>,
    pub required_margin: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub position_id: PositionId,
    pub owner: OwnerId,
    pub instrument: InstrumentId,
    pub close_price: Price,
    pub realized_pnl: Quote,
    pub close_reason: CloseReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRejectedEvent {
    pub owner: OwnerId,
    pub instrument: InstrumentId,
    pub size: Decimal,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementFailedEvent {
    pub position_id: PositionId,
    pub owner: OwnerId,
    pub reason: String,
    pub will_retry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequestedEvent {
    pub transfer_id: TransferId,
    pub owner: OwnerId,
    pub amount: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositEvent {
    pub transfer_id: TransferId,
    pub owner: OwnerId,
    pub amount: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalEvent {
    pub transfer_id: TransferId,
    pub owner: OwnerId,
    pub amount: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRejectedEvent {
    pub owner: OwnerId,
    pub amount: Quote,
    pub reason: String,
}

pub trait EventEmitter {
    fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId;
}

/// Bounded in-memory event log. Oldest events are drained once `max_events` is exceeded.
#[derive(Debug)]
pub struct EventCollector {
    events: Vec<Event>,
    next_id: u64,
    max_events: usize,
}

impl EventCollector {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
            max_events,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn next_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl EventEmitter for EventCollector {
    fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = self.next_id();
        self.events.push(Event::new(id, timestamp, payload));

        if self.events.len() > self.max_events {
            let drain_count = self.events.len() - self.max_events;
            self.events.drain(0..drain_count);
        }
        id
    }
}
