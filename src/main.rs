//! Market simulation service.
//!
//! Runs the tick loop with a demo account holding two bracketed positions and a
//! logging observer, until Ctrl-C.

use market_sim_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_OWNER: OwnerId = OwnerId(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = SimConfig::default();
    if let Ok(seed) = std::env::var("MARKET_SIM_SEED") {
        config.seed = Some(seed.parse()?);
    }
    info!(seed = ?config.seed, instruments = config.instruments.len(), "starting market simulation");

    let engine = Arc::new(Engine::from_config(config)?);
    engine.set_time(Timestamp::now());
    seed_demo_account(&engine)?;

    let token = CancellationToken::new();
    let observer = tokio::spawn(log_updates(engine.sink().subscribe(), token.clone()));
    let ticker = tokio::spawn(run_ticker(engine.clone(), token.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    token.cancel();

    let ticks = ticker.await?;
    observer.await?;

    let balance = engine.balance(DEMO_OWNER)?;
    let closed = engine.position_history(DEMO_OWNER)?.len();
    info!(ticks, %balance, closed, "simulation stopped");
    Ok(())
}

/// One funded account with a long EUR/USD and a short XAU/USD, both bracketed
/// around the opening price.
fn seed_demo_account(engine: &Engine) -> Result<(), EngineError> {
    engine.create_account(DEMO_OWNER, Quote::new(dec!(10000)))?;

    let prices = engine.prices();
    let brackets = [
        ("EUR/USD", Side::Long, dec!(1000), dec!(0.0005)),
        ("XAU/USD", Side::Short, dec!(0.5), dec!(0.0010)),
    ];

    for (symbol, side, size, band) in brackets {
        let instrument = InstrumentId::new(symbol);
        let entry = prices
            .get(&instrument)
            .copied()
            .and_then(Price::from_f64)
            .ok_or_else(|| EngineError::NoPrice(instrument.clone()))?;

        let up = bracket(entry, Decimal::ONE + band);
        let down = bracket(entry, Decimal::ONE - band);
        let (tp, sl) = match side {
            Side::Long => (up, down),
            Side::Short => (down, up),
        };

        let request = OpenRequest::new(DEMO_OWNER, instrument, side, size, entry)
            .with_take_profit(tp)
            .with_stop_loss(sl);
        let id = engine.open_position(request)?;
        info!(position = id.0, symbol, "demo position opened");
    }

    Ok(())
}

fn bracket(entry: Price, factor: Decimal) -> Price {
    Price::new_unchecked((entry.value() * factor).round_dp(6))
}

async fn log_updates(mut rx: tokio::sync::broadcast::Receiver<Frame>, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            msg = rx.recv() => match msg {
                Ok(frame) => debug!(bytes = frame.len(), "market update"),
                Err(RecvError::Lagged(n)) => {
                    warn!("observer lagged by {} messages", n);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}
