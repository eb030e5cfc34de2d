//! Candle aggregation.
//!
//! Every tick updates every (instrument, timeframe) series. A series keeps the most
//! recent `capacity` candles in ascending `period_start` order and evicts the oldest
//! on overflow. Only the last candle is ever mutated.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::config::Timeframe;
use crate::types::InstrumentId;

/// OHLC summary for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Epoch seconds, a multiple of the timeframe duration.
    pub period_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(period_start: i64, price: f64) -> Self {
        Self {
            period_start,
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }

    // open never changes once the candle exists
    pub fn update(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    pub fn is_consistent(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
    }
}

/// Bounded FIFO of candles for one (instrument, timeframe).
#[derive(Debug, Clone)]
pub struct CandleSeries {
    seconds: i64,
    capacity: usize,
    candles: VecDeque<Candle>,
}

impl CandleSeries {
    pub fn new(seconds: i64, capacity: usize) -> Self {
        debug_assert!(seconds > 0);
        Self {
            seconds,
            capacity,
            candles: VecDeque::with_capacity(capacity.min(1024) + 1),
        }
    }

    /// Start of the bucket containing `epoch_secs`. Floors, so pre-epoch times align too.
    pub fn period_start(&self, epoch_secs: i64) -> i64 {
        epoch_secs.div_euclid(self.seconds) * self.seconds
    }

    /// Fold one price observed at `now_secs` into the series.
    pub fn on_tick(&mut self, price: f64, now_secs: i64) {
        let period_start = self.period_start(now_secs);

        match self.candles.back_mut() {
            Some(last) if last.period_start >= period_start => last.update(price),
            _ => {
                self.candles.push_back(Candle::new(period_start, price));
                while self.candles.len() > self.capacity {
                    self.candles.pop_front();
                }
            }
        }
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }
}

/// instrument -> timeframe label -> candles, the shape pushed to observers.
pub type CandleMap = BTreeMap<InstrumentId, BTreeMap<String, Vec<Candle>>>;

/// All series for all instruments.
#[derive(Debug, Clone)]
pub struct CandleBook {
    timeframes: Vec<Timeframe>,
    series: BTreeMap<InstrumentId, Vec<CandleSeries>>,
}

impl CandleBook {
    pub fn new<'a>(
        instruments: impl IntoIterator<Item = &'a InstrumentId>,
        timeframes: &[Timeframe],
        capacity: usize,
    ) -> Self {
        let series = instruments
            .into_iter()
            .map(|id| {
                let per_tf = timeframes
                    .iter()
                    .map(|tf| CandleSeries::new(tf.seconds, capacity))
                    .collect();
                (id.clone(), per_tf)
            })
            .collect();

        Self {
            timeframes: timeframes.to_vec(),
            series,
        }
    }

    // every timeframe for the instrument, same tick, no coalescing
    pub fn on_tick(&mut self, instrument: &InstrumentId, price: f64, now_secs: i64) {
        if let Some(all) = self.series.get_mut(instrument) {
            for series in all.iter_mut() {
                series.on_tick(price, now_secs);
            }
        }
    }

    pub fn series(&self, instrument: &InstrumentId, label: &str) -> Option<&CandleSeries> {
        let idx = self.timeframes.iter().position(|tf| tf.label == label)?;
        self.series.get(instrument).and_then(|all| all.get(idx))
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    pub fn to_map(&self) -> CandleMap {
        self.series
            .iter()
            .map(|(id, all)| {
                let by_label = self
                    .timeframes
                    .iter()
                    .zip(all.iter())
                    .map(|(tf, series)| (tf.label.clone(), series.to_vec()))
                    .collect();
                (id.clone(), by_label)
            })
            .collect()
    }
}
