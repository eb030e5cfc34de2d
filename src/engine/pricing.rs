//! The tick pipeline and market queries.

use super::core::Engine;
use super::results::TickReport;
use crate::candles::CandleMap;
use crate::conditional::evaluate;
use crate::events::{EventPayload, PositionClosedEvent, SettlementFailedEvent};
use crate::market::{MarketSnapshot, PriceMap};
use crate::settlement::settle_all;
use crate::types::Timestamp;
use tracing::{debug, warn};

impl Engine {
    /// One tick: generate prices, fold them into candles, evaluate open positions,
    /// settle whatever crossed a threshold, then publish to observers.
    ///
    /// Ticks are serialized; a second caller waits until the first has settled.
    pub fn tick(&self, now: Timestamp) -> TickReport {
        let _tick = self.tick_lock.lock();
        self.set_time(now);

        let (prices, candles) = {
            let mut market = self.market.lock();
            let prices = market.tick(now);
            (prices, market.candles().to_map())
        };

        let open = match self.ledger.open_positions() {
            Ok(open) => open,
            Err(e) => {
                // nothing is lost: the positions stay open for the next tick
                warn!(error = %e, "could not load open positions");
                Vec::new()
            }
        };

        let instructions = evaluate(&open, &prices);
        let report = settle_all(self.ledger.as_ref(), instructions, now);

        for position in &report.settled {
            if let (Some(close_price), Some(realized_pnl), Some(close_reason)) =
                (position.close_price, position.realized_pnl, position.close_reason)
            {
                self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
                    position_id: position.id,
                    owner: position.owner,
                    instrument: position.instrument.clone(),
                    close_price,
                    realized_pnl,
                    close_reason,
                }));
            }
        }

        for failed in &report.failed {
            self.emit_event(EventPayload::SettlementFailed(SettlementFailedEvent {
                position_id: failed.instruction.position_id,
                owner: failed.instruction.owner,
                reason: failed.error.to_string(),
                will_retry: failed.will_retry(),
            }));
        }

        let observers = self.sink.publish(&prices, &candles);

        debug!(
            time = now.as_millis(),
            evaluated = open.len(),
            closed = report.settled.len(),
            failed = report.failed.len(),
            observers,
            "tick"
        );

        TickReport {
            time: now,
            prices,
            evaluated: open.len(),
            closed: report.settled,
            failed: report.failed,
            observers,
        }
    }

    pub fn prices(&self) -> PriceMap {
        self.market.lock().prices()
    }

    pub fn candles(&self) -> CandleMap {
        self.market.lock().candles().to_map()
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        let time = self.time();
        self.market.lock().snapshot(time)
    }

    pub fn last_tick(&self) -> Option<Timestamp> {
        self.market.lock().last_tick()
    }
}
