// 8.0: simulation engine. coordinates the tick pipeline (prices, candles,
// threshold evaluation, settlement, broadcast), position requests, transfers
// and queries. the tick itself is synchronous; driver.rs schedules it.

mod core;
mod driver;
mod positions;
mod pricing;
mod results;
mod transfers;

pub use core::Engine;
pub use driver::{run_ticker, run_ticker_with_clock};
pub use results::{EngineError, TickReport};
