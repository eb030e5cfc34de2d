//! Balance conservation under random price paths and storage faults.
//!
//! Whatever happens during ticks, every balance must equal its starting value
//! plus the pnl of that owner's closed positions, and every position is settled
//! at most once.

use market_sim_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const OWNERS: [OwnerId; 3] = [OwnerId(1), OwnerId(2), OwnerId(3)];
const START_BALANCE: Decimal = dec!(10000);

fn fault_strategy() -> impl Strategy<Value = Option<(FaultPoint, u32)>> {
    prop::option::of((
        prop_oneof![
            Just(FaultPoint::AfterPositionWrite),
            Just(FaultPoint::AfterBalanceWrite),
            Just(FaultPoint::Commit),
        ],
        1u32..4,
    ))
}

fn build(path: &[f64]) -> (Engine, Arc<MemoryLedger>) {
    let eur = InstrumentId::new("EUR/USD");
    let mut feed = ScriptedFeed::new();
    feed.push(&eur, path.iter().copied());

    let ledger = Arc::new(MemoryLedger::new());
    let engine = Engine::new(SimConfig::default(), Box::new(feed), ledger.clone()).unwrap();
    engine.set_time(Timestamp::from_secs(0));

    for owner in OWNERS {
        engine.create_account(owner, Quote::new(START_BALANCE)).unwrap();
    }
    (engine, ledger)
}

fn bracket(owner: OwnerId, side: Side, band: Decimal) -> OpenRequest {
    let entry = dec!(1.0850);
    let (tp, sl) = match side {
        Side::Long => (entry + band, entry - band),
        Side::Short => (entry - band, entry + band),
    };
    OpenRequest::new(owner, InstrumentId::new("EUR/USD"), side, dec!(1000), Price::new_unchecked(entry))
        .with_take_profit(Price::new_unchecked(tp))
        .with_stop_loss(Price::new_unchecked(sl))
}

fn check_conservation(engine: &Engine) -> Result<(), TestCaseError> {
    for owner in OWNERS {
        let history = engine.position_history(owner).unwrap();
        let realized: Quote = history.iter().filter_map(|p| p.realized_pnl).sum();
        let balance = engine.balance(owner).unwrap();
        prop_assert_eq!(balance.value(), START_BALANCE + realized.value());

        for closed in &history {
            let price = closed.close_price.unwrap();
            prop_assert_eq!(closed.realized_pnl, closed.pnl_at(price));
            prop_assert!(Some(price) == closed.take_profit || Some(price) == closed.stop_loss);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Balances only move by realized pnl, even when settlements fail and retry
    #[test]
    fn balances_track_realized_pnl(
        path in prop::collection::vec(1.0700f64..1.1000f64, 1..80),
        bands in prop::collection::vec(1i64..100i64, 3),
        fault in fault_strategy(),
    ) {
        let (engine, ledger) = build(&path);
        let sides = [Side::Long, Side::Short, Side::Long];
        for ((owner, side), band) in OWNERS.into_iter().zip(sides).zip(&bands) {
            engine.open_position(bracket(owner, side, Decimal::new(*band, 4))).unwrap();
        }
        if let Some((point, times)) = fault {
            ledger.inject_fault(point, times);
        }

        for i in 0..path.len() {
            engine.tick(Timestamp::from_secs(1 + i as i64));
            check_conservation(&engine)?;
        }

        // a few quiet ticks drain any armed fault and retry what failed
        ledger.clear_faults();
        let last = Timestamp::from_secs(path.len() as i64 + 1);
        let report = engine.tick(last);
        prop_assert!(report.failed.is_empty());
        check_conservation(&engine)?;

        let closed: usize = OWNERS.iter().map(|o| engine.position_history(*o).unwrap().len()).sum();
        let open: usize = OWNERS.iter().map(|o| engine.open_positions(*o).unwrap().len()).sum();
        prop_assert_eq!(closed + open, 3);
    }

    /// Deposits and withdrawals change balances by exactly the amounts that went through
    #[test]
    fn transfers_conserve_balance(
        ops in prop::collection::vec((any::<bool>(), 1i64..5_000i64, any::<bool>()), 1..40),
    ) {
        let (engine, ledger) = build(&[]);
        let owner = OwnerId(1);
        let mut expected = START_BALANCE;

        for (is_deposit, amount, faulty) in ops {
            let amount = Quote::new(Decimal::from(amount));
            if faulty {
                ledger.inject_fault(FaultPoint::AfterBalanceWrite, 1);
            }

            if is_deposit {
                let id = engine.request_deposit(owner, amount).unwrap();
                if engine.approve_deposit(id).is_ok() {
                    expected += amount.value();
                }
            } else {
                match engine.request_withdrawal(owner, amount) {
                    Ok(_) => expected -= amount.value(),
                    Err(e) => prop_assert!(
                        faulty || matches!(e, EngineError::InsufficientBalance { .. }),
                        "unexpected error {}", e
                    ),
                }
            }
            ledger.clear_faults();

            prop_assert_eq!(engine.balance(owner).unwrap().value(), expected);
            prop_assert!(expected >= Decimal::ZERO);
        }
    }
}

#[test]
fn losses_can_take_balance_below_zero() {
    // margin is checked on open, never reserved
    let (engine, _) = build(&[1.0000]);
    let request = OpenRequest::new(OwnerId(1), InstrumentId::new("EUR/USD"), Side::Long, dec!(900000), Price::new_unchecked(dec!(1.0850)))
        .with_stop_loss(Price::new_unchecked(dec!(1.0)));
    engine.open_position(request).unwrap();

    engine.tick(Timestamp::from_secs(1));

    let balance = engine.balance(OwnerId(1)).unwrap();
    assert_eq!(balance.value(), dec!(10000) - dec!(0.0850) * dec!(900000));
    assert!(balance.is_negative());
}
