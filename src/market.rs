//! Market state: instruments and their candle series.
//!
//! `MarketState` is the owned simulation state the tick driver advances. It is
//! passed explicitly instead of living in process-wide globals so tests can build
//! one with a seeded or scripted price source.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::candles::{CandleBook, CandleMap};
use crate::config::{InstrumentSpec, SimConfig};
use crate::price_feed::{advance, PriceSource};
use crate::types::{InstrumentId, Timestamp};

/// Live instrument. Created at startup, mutated every tick, never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub price: f64,
    pub default_price: f64,
    pub volatility: f64,
}

impl Instrument {
    pub fn from_spec(spec: &InstrumentSpec) -> Self {
        Self {
            id: spec.id.clone(),
            price: spec.default_price,
            default_price: spec.default_price,
            volatility: spec.volatility,
        }
    }

    /// Resets a non-finite or non-positive price to the default. Returns true if it did.
    pub fn heal(&mut self) -> bool {
        if self.price.is_finite() && self.price > 0.0 {
            return false;
        }
        self.price = self.default_price;
        true
    }
}

/// instrument -> latest price.
pub type PriceMap = BTreeMap<InstrumentId, f64>;

/// Read-only copy handed to queries and observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub time: Timestamp,
    pub prices: PriceMap,
    pub candles: CandleMap,
}

pub struct MarketState {
    instruments: Vec<Instrument>,
    candles: CandleBook,
    source: Box<dyn PriceSource>,
    last_tick: Option<Timestamp>,
}

impl MarketState {
    pub fn new(config: &SimConfig, source: Box<dyn PriceSource>) -> Self {
        let instruments: Vec<Instrument> =
            config.instruments.iter().map(Instrument::from_spec).collect();
        let candles = CandleBook::new(
            instruments.iter().map(|i| &i.id),
            &config.timeframes,
            config.candle_history,
        );

        Self {
            instruments,
            candles,
            source,
            last_tick: None,
        }
    }

    /// Generator then aggregator, for every instrument.
    pub fn tick(&mut self, now: Timestamp) -> PriceMap {
        let now_secs = now.as_secs();
        let mut prices = PriceMap::new();

        for instrument in self.instruments.iter_mut() {
            let price = advance(self.source.as_mut(), instrument);
            self.candles.on_tick(&instrument.id, price, now_secs);
            prices.insert(instrument.id.clone(), price);
        }

        self.last_tick = Some(now);
        prices
    }

    pub fn price(&self, id: &InstrumentId) -> Option<f64> {
        self.instrument(id).map(|i| i.price)
    }

    pub fn instrument(&self, id: &InstrumentId) -> Option<&Instrument> {
        self.instruments.iter().find(|i| &i.id == id)
    }

    pub fn instrument_mut(&mut self, id: &InstrumentId) -> Option<&mut Instrument> {
        self.instruments.iter_mut().find(|i| &i.id == id)
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn candles(&self) -> &CandleBook {
        &self.candles
    }

    pub fn last_tick(&self) -> Option<Timestamp> {
        self.last_tick
    }

    pub fn prices(&self) -> PriceMap {
        self.instruments
            .iter()
            .map(|i| (i.id.clone(), i.price))
            .collect()
    }

    pub fn snapshot(&self, time: Timestamp) -> MarketSnapshot {
        MarketSnapshot {
            time,
            prices: self.prices(),
            candles: self.candles.to_map(),
        }
    }
}

impl std::fmt::Debug for MarketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketState")
            .field("instruments", &self.instruments)
            .field("last_tick", &self.last_tick)
            .finish_non_exhaustive()
    }
}
