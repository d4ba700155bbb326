//! GridSell scenarios: counter-sells carry the executed buy volume, and
//! a failed counter-sell drops the source buy while the unsold
//! bookkeeping keeps the attempt alive.

use rust_decimal_macros::dec;
use std::sync::Arc;

use weir_core::config::StrategyKind;
use weir_core::core::{ExecType, Side};
use weir_core::testing::{test_config, MockExchange, TestRig};
use weir_strategies::GridSell;

fn rig() -> TestRig {
    TestRig::new(test_config(StrategyKind::GridSell), Box::new(GridSell))
}

#[test]
fn test_counter_sell_uses_executed_volume() {
    let rig = rig();
    rig.ticker(dec!(50000)).unwrap();
    rig.connect_executions().unwrap();
    rig.ticker(dec!(60000)).unwrap();
    rig.ticker(dec!(59000)).unwrap();

    let top = rig.orderbook.all().unwrap().remove(0);
    assert_eq!(top.price, dec!(59405.9));
    assert_eq!(top.volume, dec!(0.00168333));
    rig.fill(&top.txid).unwrap();

    let sells = rig.orderbook.by_side(Side::Sell).unwrap();
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].price, dec!(59999.9));
    // The bought volume is passed straight through, no fee correction
    assert_eq!(sells[0].volume, dec!(0.00168333));
}

#[test]
fn test_failed_counter_sell_drops_buy_but_keeps_unsold_entry() {
    let exchange = Arc::new(MockExchange::new());
    let rig = TestRig::with_exchange(
        test_config(StrategyKind::GridSell),
        Box::new(GridSell),
        exchange.clone(),
    );
    rig.ticker(dec!(50000)).unwrap();
    rig.connect_executions().unwrap();

    let top = rig.orderbook.all().unwrap().remove(0);
    // Fill upstream, then starve the base balance before the execution
    // report arrives - the sell placement must fail
    exchange.fill_order(&top.txid);
    exchange.set_base_balance(dec!(0));
    rig.execution(&top.txid, ExecType::Filled).unwrap();

    // Misconfiguration path: the buy is gone from the local orderbook...
    assert!(rig.orderbook.get(&top.txid).unwrap().is_none());
    assert_eq!(rig.orderbook.count(Some(Side::Sell)).unwrap(), 0);
    // ...but the unsold entry survives for the retry
    assert!(rig.unsold.contains(&top.txid).unwrap());
    assert!(rig
        .notifications
        .lock()
        .iter()
        .any(|m| m.contains("not enough")));

    // Once funds are back, the next ticker retries the sell
    exchange.set_base_balance(dec!(100));
    rig.ticker(dec!(50000)).unwrap();
    assert!(!rig.unsold.contains(&top.txid).unwrap());
    let sells = rig.orderbook.by_side(Side::Sell).unwrap();
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].price, dec!(50500.0));
    // Still the executed volume of the original buy
    assert_eq!(sells[0].volume, dec!(0.00202));
}
