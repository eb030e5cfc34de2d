// 9.0 price_feed.rs: simulated feed. a bounded random walk per instrument, plus a scripted
// source so tests can drive exact price paths through the engine.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::market::Instrument;
use crate::types::InstrumentId;

/// Source of the next raw price for an instrument. Implementations only compute;
/// [`advance`] owns the write and the corruption guard.
pub trait PriceSource: Send {
    fn next_price(&mut self, instrument: &Instrument) -> f64;
}

/// Uniform random walk: `price += U(-0.5, 0.5) * volatility * price`.
#[derive(Debug)]
pub struct RandomWalk {
    rng: StdRng,
}

impl RandomWalk {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }
}

impl PriceSource for RandomWalk {
    fn next_price(&mut self, instrument: &Instrument) -> f64 {
        let draw: f64 = self.rng.gen_range(-0.5..=0.5);
        let perturbation = draw * instrument.volatility * instrument.price;
        instrument.price + perturbation
    }
}

/// Replays queued prices per instrument. An instrument with nothing queued holds its price.
#[derive(Debug, Default)]
pub struct ScriptedFeed {
    queued: HashMap<InstrumentId, VecDeque<f64>>,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instrument: &InstrumentId, prices: impl IntoIterator<Item = f64>) {
        self.queued
            .entry(instrument.clone())
            .or_default()
            .extend(prices);
    }

    pub fn remaining(&self, instrument: &InstrumentId) -> usize {
        self.queued.get(instrument).map_or(0, VecDeque::len)
    }
}

impl PriceSource for ScriptedFeed {
    fn next_price(&mut self, instrument: &Instrument) -> f64 {
        self.queued
            .get_mut(&instrument.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(instrument.price)
    }
}

// 9.1: one tick for one instrument. a stored price that is not finite and positive is
// reset to the instrument default instead of being fed into the walk. the same guard runs
// on the result so a bad draw never lands in state either.
pub fn advance(source: &mut dyn PriceSource, instrument: &mut Instrument) -> f64 {
    instrument.heal();
    let next = source.next_price(instrument);
    instrument.price = next;
    if instrument.heal() {
        debug!(instrument = %instrument.id, raw = next, "discarded non-finite price");
    }
    instrument.price
}
