// 7.0 config.rs: all settings in one place. instruments, timeframes, tick cadence, accounting limits.
// 7.1 the default preset is the static instrument list the process starts with.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::{InstrumentId, Leverage};

/// Static definition of one simulated instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub id: InstrumentId,
    // price the feed starts at, and the value a corrupted price is reset to
    pub default_price: f64,
    // fraction of the current price the random walk may move per tick
    pub volatility: f64,
}

impl InstrumentSpec {
    pub fn new(id: &str, default_price: f64, volatility: f64) -> Self {
        Self {
            id: InstrumentId::new(id),
            default_price,
            volatility,
        }
    }
}

/// Named candle bucket duration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timeframe {
    pub label: String,
    pub seconds: i64,
}

impl Timeframe {
    pub fn new(label: &str, seconds: i64) -> Self {
        Self {
            label: label.to_string(),
            seconds,
        }
    }
}

/** 7.2: complete simulation configuration */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub instruments: Vec<InstrumentSpec>,
    pub timeframes: Vec<Timeframe>,
    // tick driver period
    pub tick_period_ms: u64,
    // candles kept per (instrument, timeframe)
    pub candle_history: usize,
    // margin = size * entry / leverage
    pub leverage: Leverage,
    // cap on closed-position history queries
    pub history_limit: usize,
    // fixed seed for reproducible runs; None seeds from entropy
    pub seed: Option<u64>,
    // audit events kept in memory
    pub max_events: usize,
    // observer messages buffered before a slow observer starts skipping
    pub broadcast_capacity: usize,
    // longest one storage unit (lock wait or settlement) may take before it is retried
    pub settlement_timeout_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            instruments: vec![
                InstrumentSpec::new("EUR/USD", 1.0850, 0.0002),
                InstrumentSpec::new("GBP/USD", 1.2650, 0.0002),
                InstrumentSpec::new("USD/JPY", 149.50, 0.0002),
                InstrumentSpec::new("XAU/USD", 2030.0, 0.0005),
                InstrumentSpec::new("BTC/USD", 43_000.0, 0.001),
                InstrumentSpec::new("ETH/USD", 2_300.0, 0.001),
            ],
            timeframes: vec![
                Timeframe::new("1m", 60),
                Timeframe::new("5m", 300),
                Timeframe::new("15m", 900),
                Timeframe::new("1h", 3_600),
                Timeframe::new("4h", 14_400),
                Timeframe::new("1d", 86_400),
            ],
            tick_period_ms: 1_000,
            candle_history: 200,
            leverage: Leverage::new(dec!(100)).unwrap(),
            history_limit: 50,
            seed: None,
            max_events: 10_000,
            broadcast_capacity: 16,
            settlement_timeout_ms: 250,
        }
    }
}

impl SimConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn instrument(&self, id: &InstrumentId) -> Option<&InstrumentSpec> {
        self.instruments.iter().find(|spec| &spec.id == id)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return Err(ConfigError::InvalidInstrument {
                reason: "at least one instrument is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for spec in &self.instruments {
            if !seen.insert(&spec.id) {
                return Err(ConfigError::InvalidInstrument {
                    reason: format!("duplicate instrument {}", spec.id),
                });
            }
            if !spec.default_price.is_finite() || spec.default_price <= 0.0 {
                return Err(ConfigError::InvalidInstrument {
                    reason: format!("{} default price must be finite and positive", spec.id),
                });
            }
            if !(spec.volatility > 0.0 && spec.volatility < 1.0) {
                return Err(ConfigError::InvalidInstrument {
                    reason: format!("{} volatility must be in (0, 1)", spec.id),
                });
            }
        }

        if self.timeframes.is_empty() {
            return Err(ConfigError::InvalidTimeframe {
                reason: "at least one timeframe is required".to_string(),
            });
        }

        let mut labels = HashSet::new();
        for tf in &self.timeframes {
            if tf.seconds <= 0 {
                return Err(ConfigError::InvalidTimeframe {
                    reason: format!("{} must span a positive number of seconds", tf.label),
                });
            }
            if !labels.insert(&tf.label) {
                return Err(ConfigError::InvalidTimeframe {
                    reason: format!("duplicate timeframe {}", tf.label),
                });
            }
        }

        // serde bypasses Leverage::new, so check the bound again
        if self.leverage.value() < Decimal::ONE {
            return Err(ConfigError::InvalidLimit {
                reason: "leverage must be at least 1x".to_string(),
            });
        }

        if self.candle_history == 0 {
            return Err(ConfigError::InvalidLimit {
                reason: "candle history must keep at least one candle".to_string(),
            });
        }

        if self.history_limit == 0 {
            return Err(ConfigError::InvalidLimit {
                reason: "history limit must be positive".to_string(),
            });
        }

        if self.tick_period_ms == 0 {
            return Err(ConfigError::InvalidLimit {
                reason: "tick period must be positive".to_string(),
            });
        }

        if self.broadcast_capacity == 0 {
            return Err(ConfigError::InvalidLimit {
                reason: "broadcast capacity must be positive".to_string(),
            });
        }

        if self.settlement_timeout_ms == 0 {
            return Err(ConfigError::InvalidLimit {
                reason: "settlement timeout must be positive".to_string(),
            });
        }

        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid instrument: {reason}")]
    InvalidInstrument { reason: String },

    #[error("invalid timeframe: {reason}")]
    InvalidTimeframe { reason: String },

    #[error("invalid limit: {reason}")]
    InvalidLimit { reason: String },

    #[error("config parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.candle_history, 200);
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.leverage.value(), dec!(100));
    }

    #[test]
    fn test_currency_pairs_calmer_than_crypto() {
        let config = SimConfig::default();
        let eur = config.instrument(&InstrumentId::new("EUR/USD")).unwrap();
        let btc = config.instrument(&InstrumentId::new("BTC/USD")).unwrap();
        assert!(eur.volatility < btc.volatility);
    }

    #[test]
    fn test_zero_settlement_timeout_rejected() {
        let mut config = SimConfig::default();
        config.settlement_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLimit { .. })));
    }

    #[test]
    fn test_duplicate_instrument_rejected() {
        let mut config = SimConfig::default();
        config.instruments.push(InstrumentSpec::new("EUR/USD", 1.1, 0.0002));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidInstrument { .. })));
    }

    #[test]
    fn test_bad_default_price_rejected() {
        let mut config = SimConfig::default();
        config.instruments[0].default_price = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidInstrument { .. })));
    }

    #[test]
    fn test_zero_second_timeframe_rejected() {
        let mut config = SimConfig::default();
        config.timeframes.push(Timeframe::new("0s", 0));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeframe { .. })));
    }

    #[test]
    fn test_zero_history_rejected() {
        let mut config = SimConfig::default();
        config.candle_history = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLimit { .. })));
    }

    #[test]
    fn test_config_serialization() {
        let config = SimConfig::default().with_seed(7);
        let json = serde_json::to_string(&config).unwrap();
        let back = SimConfig::from_json(&json).unwrap();
        assert_eq!(back.seed, Some(7));
        assert_eq!(back.instruments.len(), config.instruments.len());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(SimConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }
}
