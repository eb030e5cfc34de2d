// 8.0 engine/core.rs: main engine. owns the market state, the storage port, the
// observer sink and the audit log. every method takes &self so one engine can be
// shared between the tick driver and request handlers.

use super::results::EngineError;
use crate::broadcast::BroadcastSink;
use crate::config::SimConfig;
use crate::events::{Event, EventCollector, EventEmitter, EventPayload};
use crate::ledger::{Ledger, MemoryLedger};
use crate::market::MarketState;
use crate::price_feed::{PriceSource, RandomWalk};
use crate::types::Timestamp;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/** 8.1: main engine struct. all state lives here */
pub struct Engine {
    pub(super) config: SimConfig,
    pub(super) market: Mutex<MarketState>,
    pub(super) ledger: Arc<dyn Ledger>,
    pub(super) sink: BroadcastSink,
    pub(super) events: Mutex<EventCollector>,
    pub(super) current_time: Mutex<Timestamp>,
    // held for a whole tick so ticks never overlap
    pub(super) tick_lock: Mutex<()>,
}

impl Engine {
    pub fn new(
        config: SimConfig,
        source: Box<dyn PriceSource>,
        ledger: Arc<dyn Ledger>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        Ok(Self {
            market: Mutex::new(MarketState::new(&config, source)),
            sink: BroadcastSink::new(config.broadcast_capacity),
            events: Mutex::new(EventCollector::new(config.max_events)),
            ledger,
            current_time: Mutex::new(Timestamp::from_millis(0)),
            tick_lock: Mutex::new(()),
            config,
        })
    }

    /// Random-walk prices (seeded from `config.seed` if set) over an in-memory ledger.
    pub fn from_config(config: SimConfig) -> Result<Self, EngineError> {
        let source = Box::new(RandomWalk::new(config.seed));
        let ledger = MemoryLedger::with_timeout(Duration::from_millis(config.settlement_timeout_ms));
        Self::new(config, source, Arc::new(ledger))
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn sink(&self) -> &BroadcastSink {
        &self.sink
    }

    pub fn set_time(&self, timestamp: Timestamp) {
        *self.current_time.lock() = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        *self.current_time.lock()
    }

    pub fn advance_time(&self, millis: i64) {
        let mut now = self.current_time.lock();
        *now = Timestamp::from_millis(now.as_millis() + millis);
    }

    pub fn recent_events(&self, count: usize) -> Vec<Event> {
        self.events.lock().recent(count).to_vec()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().events().to_vec()
    }

    pub(super) fn emit_event(&self, payload: EventPayload) {
        let timestamp = self.time();
        let mut events = self.events.lock();
        let id = events.emit(timestamp, payload);
        tracing::trace!(event = id.0, "event recorded");
    }
}
