//! Fixed-period tick driver.

use super::core::Engine;
use crate::types::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Drive `Engine::tick` every `tick_period_ms` with wall-clock timestamps until
/// `token` is cancelled. Returns the number of ticks run.
pub async fn run_ticker(engine: Arc<Engine>, token: CancellationToken) -> u64 {
    run_ticker_with_clock(engine, token, Timestamp::now).await
}

/// Same as [`run_ticker`] with the tick timestamps taken from `clock`.
///
/// A tick always finishes, settlement included, before the next one starts. A
/// late interval is delayed rather than fired in a burst.
pub async fn run_ticker_with_clock<C>(engine: Arc<Engine>, token: CancellationToken, mut clock: C) -> u64
where
    C: FnMut() -> Timestamp + Send,
{
    let period = Duration::from_millis(engine.config().tick_period_ms);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(period_ms = engine.config().tick_period_ms, "ticker started");
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                engine.tick(clock());
                ticks += 1;
            }
        }
    }

    info!(ticks, "ticker stopped");
    ticks
}
