//! Fan-out of market updates to observers.
//!
//! One message per tick, serialized once and shared by every receiver. Sending
//! never waits: a receiver that falls more than the channel capacity behind
//! skips the oldest messages, and dropped receivers simply stop counting.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::candles::CandleMap;
use crate::market::PriceMap;

/// Message pushed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ObserverMessage {
    MarketUpdate { prices: PriceMap, candles: CandleMap },
}

pub type Frame = Arc<str>;

/// Broadcast side of the observer channel. Clone-able; all clones share one channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Frame>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish the latest prices and candles and return the receiver count.
    /// Returns 0 when nobody is listening.
    pub fn publish(&self, prices: &PriceMap, candles: &CandleMap) -> usize {
        let message = ObserverMessage::MarketUpdate {
            prices: prices.clone(),
            candles: candles.clone(),
        };

        let frame: Frame = match serde_json::to_string(&message) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(error = %e, "failed to encode market update");
                return 0;
            }
        };

        match self.tx.send(frame) {
            Ok(n) => n,
            Err(_) => {
                trace!("market update dropped, no observers");
                0
            }
        }
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(16)
    }
}
