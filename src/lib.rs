// market-sim-core: simulated market data and bracketed position settlement.
// prices come from a bounded random walk, fold into per-timeframe candles, and
// every tick closes positions whose take-profit or stop-loss was crossed.
// the tick is synchronous and deterministic given a seed and an explicit time.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: InstrumentId, Side, Price, Quote, Leverage, Timestamp
//   2.x  candles.rs: OHLC buckets, bounded series per instrument and timeframe
//   2.1x conditional.rs: take-profit / stop-loss evaluation
//   4.x  position.rs: position record, pnl and margin formulas
//   7.x  config.rs: instruments, timeframes, limits, default preset
//   8.x  engine/: tick pipeline, positions, transfers, queries, driver
//   9.x  price_feed.rs: random walk and scripted price sources
//   9.1  settlement.rs: settlement executor, per-position isolation
//   9.2  custody.rs: deposit/withdraw records
//   9.3  ledger.rs: storage port, unit of work, fault injection
//   9.4  broadcast.rs: observer fan-out
//   10.x account.rs: balances + margin check
//   11.x events.rs: state transition events for audit
//   12.x market.rs: instruments + owned simulation state

// core modules
pub mod account;
pub mod candles;
pub mod engine;
pub mod events;
pub mod market;
pub mod position;
pub mod types;

// evaluation and settlement
pub mod conditional;
pub mod settlement;

// integration modules
pub mod broadcast;
pub mod config;
pub mod custody;
pub mod ledger;
pub mod price_feed;

// re exports for convenience
pub use account::*;
pub use candles::*;
pub use conditional::*;
pub use engine::*;
pub use events::*;
pub use market::*;
pub use position::*;
pub use types::*;
pub use broadcast::{BroadcastSink, Frame, ObserverMessage};
pub use config::{ConfigError, InstrumentSpec, SimConfig, Timeframe};
pub use custody::{Transfer, TransferKind, TransferStatus};
pub use ledger::{FaultPoint, Ledger, LedgerError, MemoryLedger, UnitOfWork};
pub use price_feed::{PriceSource, RandomWalk, ScriptedFeed};
pub use settlement::{settle_all, BatchStatus, FailedSettlement, SettlementReport};
