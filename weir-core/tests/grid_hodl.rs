//! End-to-end scenarios for the GridHODL variant, driven through the
//! real stream router against the mock exchange.
//!
//! Balances start at 100 base / 1_000_000 quote; the grid runs BTC/USD
//! with a 1 % interval, 100 USD per level, five open buys and a 10_000
//! USD investment cap. The maker fee derives from the top tier (0.25 %).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use weir_core::config::StrategyKind;
use weir_core::core::{Order, Side, State};
use weir_core::testing::{test_config, TestRig};
use weir_strategies::GridHodl;

fn rig() -> TestRig {
    TestRig::new(test_config(StrategyKind::GridHodl), Box::new(GridHodl))
}

fn prices(orders: &[Order]) -> Vec<Decimal> {
    orders.iter().map(|order| order.price).collect()
}

fn volumes(orders: &[Order]) -> Vec<Decimal> {
    orders.iter().map(|order| order.volume).collect()
}

/// Bring a rig into the initial five-buys state at ticker 50_000.
fn start(rig: &TestRig) {
    rig.ticker(dec!(50000)).unwrap();
    assert!(!rig.state_machine.fact("ready_to_trade"));
    rig.connect_executions().unwrap();
    assert!(rig.state_machine.fact("ready_to_trade"));
    assert_eq!(rig.state_machine.state(), State::Running);
}

#[test]
fn test_initial_grid_placement() {
    let rig = rig();
    start(&rig);

    let orders = rig.orderbook.all().unwrap();
    assert_eq!(orders.len(), 5);
    assert_eq!(
        prices(&orders),
        vec![
            dec!(49504.9),
            dec!(49014.7),
            dec!(48529.4),
            dec!(48048.9),
            dec!(47573.1)
        ]
    );
    assert_eq!(
        volumes(&orders),
        vec![
            dec!(0.00202),
            dec!(0.0020402),
            dec!(0.0020606),
            dec!(0.00208121),
            dec!(0.00210202)
        ]
    );
    for order in &orders {
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.symbol, "BTCUSD");
        assert_eq!(order.userref, rig.userref());
        // Grid buys never pay taker fees
        assert_eq!(rig.exchange.is_post_only(&order.txid), Some(true));
    }
    assert_eq!(rig.pending.count().unwrap(), 0);
    assert_eq!(rig.unsold.count().unwrap(), 0);
}

#[test]
fn test_shift_up_rebuilds_the_ladder() {
    let rig = rig();
    start(&rig);

    rig.ticker(dec!(60000)).unwrap();

    let orders = rig.orderbook.all().unwrap();
    assert_eq!(
        prices(&orders),
        vec![
            dec!(59405.9),
            dec!(58817.7),
            dec!(58235.3),
            dec!(57658.7),
            dec!(57087.8)
        ]
    );
    assert_eq!(
        volumes(&orders),
        vec![
            dec!(0.00168333),
            dec!(0.00170016),
            dec!(0.00171717),
            dec!(0.00173434),
            dec!(0.00175168)
        ]
    );
    // The old five buys were really canceled upstream
    assert_eq!(rig.exchange.open_order_count(), 5);
    assert_eq!(rig.exchange.orders().len(), 10);
}

#[test]
fn test_filled_buy_gets_fee_corrected_counter_sell() {
    let rig = rig();
    start(&rig);
    rig.ticker(dec!(60000)).unwrap();
    // A small drop does not touch the grid
    rig.ticker(dec!(59000)).unwrap();
    let before = rig.orderbook.all().unwrap();
    assert_eq!(before.len(), 5);

    let top = &before[0];
    assert_eq!(top.price, dec!(59405.9));
    rig.fill(&top.txid).unwrap();

    let orders = rig.orderbook.all().unwrap();
    assert_eq!(orders.len(), 5);
    let buys: Vec<&Order> = orders.iter().filter(|o| o.side == Side::Buy).collect();
    let sells: Vec<&Order> = orders.iter().filter(|o| o.side == Side::Sell).collect();
    assert_eq!(buys.len(), 4);
    assert_eq!(sells.len(), 1);

    // One interval above the buy, volume corrected for the double fee
    assert_eq!(sells[0].price, dec!(59999.9));
    assert_eq!(sells[0].volume, dec!(0.00167504));
    assert_eq!(rig.exchange.is_post_only(&sells[0].txid), Some(false));

    // The filled buy now has its sell attempt completed
    assert_eq!(rig.unsold.count().unwrap(), 0);
    // The highest buy price was recorded
    assert_eq!(
        rig.configuration.get().unwrap().price_of_highest_buy,
        dec!(59405.9)
    );
}

#[test]
fn test_filled_sell_places_new_buy_while_other_sells_remain() {
    let rig = rig();
    start(&rig);
    rig.ticker(dec!(60000)).unwrap();
    rig.ticker(dec!(59000)).unwrap();

    // Fill the two top buys so two sells are open
    let buys = rig.orderbook.by_side(Side::Buy).unwrap();
    rig.fill(&buys[0].txid).unwrap();
    rig.fill(&buys[1].txid).unwrap();
    assert_eq!(rig.orderbook.count(Some(Side::Sell)).unwrap(), 2);

    // Fill one of the sells: a buy one interval below its price appears
    let sells = rig.orderbook.by_side(Side::Sell).unwrap();
    let n_buys = rig.orderbook.count(Some(Side::Buy)).unwrap();
    rig.fill(&sells[0].txid).unwrap();
    assert_eq!(rig.orderbook.count(Some(Side::Sell)).unwrap(), 1);
    assert_eq!(rig.orderbook.count(Some(Side::Buy)).unwrap(), n_buys + 1);
}

#[test]
fn test_last_filled_sell_is_only_removed() {
    let rig = rig();
    start(&rig);
    rig.ticker(dec!(60000)).unwrap();
    rig.ticker(dec!(59000)).unwrap();

    let buys = rig.orderbook.by_side(Side::Buy).unwrap();
    rig.fill(&buys[0].txid).unwrap();
    let sells = rig.orderbook.by_side(Side::Sell).unwrap();
    assert_eq!(sells.len(), 1);

    // The single open sell fills: no re-buy, the shift-up rule will
    // rebuild the grid on the next ticker
    let n_buys = rig.orderbook.count(Some(Side::Buy)).unwrap();
    rig.fill(&sells[0].txid).unwrap();
    assert_eq!(rig.orderbook.count(Some(Side::Sell)).unwrap(), 0);
    assert_eq!(rig.orderbook.count(Some(Side::Buy)).unwrap(), n_buys);
}

#[test]
fn test_shift_up_hysteresis_boundary() {
    let rig = rig();
    start(&rig);

    // Exactly max_buy * (1 + interval)^2 * 1.001 must not trigger
    let threshold = dec!(49504.9) * dec!(1.01) * dec!(1.01) * dec!(1.001);
    rig.ticker(threshold).unwrap();
    assert_eq!(
        rig.orderbook.highest_buy().unwrap().unwrap().price,
        dec!(49504.9)
    );

    // One tick above does
    rig.ticker(threshold + dec!(0.1)).unwrap();
    assert!(rig.orderbook.highest_buy().unwrap().unwrap().price > dec!(49504.9));
}

#[test]
fn test_max_investment_caps_the_ladder() {
    let mut config = test_config(StrategyKind::GridHodl);
    config.max_investment = dec!(250);
    let rig = TestRig::new(config, Box::new(GridHodl));
    start(&rig);

    // Two buys of ~100 USD fit; a third would breach the cap including
    // the reserved amount-per-grid-plus-fee
    let orders = rig.orderbook.all().unwrap();
    assert_eq!(orders.len(), 2);
    let investment: Decimal = orders.iter().map(|o| o.price * o.volume).sum();
    assert!(investment <= dec!(250) + dec!(100) * (Decimal::ONE + dec!(0.0025)));
}

#[test]
fn test_no_buys_without_quote_balance() {
    let rig = TestRig::with_exchange(
        test_config(StrategyKind::GridHodl),
        Box::new(GridHodl),
        std::sync::Arc::new(weir_core::testing::MockExchange::with_balances(
            dec!(100),
            dec!(50),
        )),
    );
    start(&rig);
    assert_eq!(rig.orderbook.count(None).unwrap(), 0);
}

#[test]
fn test_live_again_notification_is_sent_first() {
    let rig = rig();
    start(&rig);
    let notifications = rig.notifications.lock();
    assert!(notifications[0].contains("is live again"));
}
