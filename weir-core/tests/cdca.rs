//! cDCA end-to-end: the full buy-only lifecycle including a rapid price
//! drop that fills the whole ladder without ever producing a sell.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use weir_core::config::StrategyKind;
use weir_core::core::{Order, Side};
use weir_core::testing::{test_config, TestRig};
use weir_strategies::Cdca;

fn prices(orders: &[Order]) -> Vec<Decimal> {
    orders.iter().map(|order| order.price).collect()
}

#[test]
fn test_cdca_full_cycle_without_sells() {
    let rig = TestRig::new(test_config(StrategyKind::Cdca), Box::new(Cdca));

    // 1. Initial placement at 50_000
    rig.ticker(dec!(50000)).unwrap();
    rig.connect_executions().unwrap();
    assert_eq!(
        prices(&rig.orderbook.all().unwrap()),
        vec![
            dec!(49504.9),
            dec!(49014.7),
            dec!(48529.4),
            dec!(48048.9),
            dec!(47573.1)
        ]
    );

    // 2. Shift up at 60_000
    rig.ticker(dec!(60000)).unwrap();
    assert_eq!(
        prices(&rig.orderbook.all().unwrap()),
        vec![
            dec!(59405.9),
            dec!(58817.7),
            dec!(58235.3),
            dec!(57658.7),
            dec!(57087.8)
        ]
    );

    // 3. A filled buy is consumed without any counter-sell
    rig.ticker(dec!(59000)).unwrap();
    let top = rig.orderbook.all().unwrap().remove(0);
    rig.fill(&top.txid).unwrap();
    assert_eq!(rig.orderbook.count(None).unwrap(), 4);
    assert_eq!(rig.orderbook.count(Some(Side::Sell)).unwrap(), 0);
    assert_eq!(rig.unsold.count().unwrap(), 0);
    // cDCA never updates the highest buy price
    assert_eq!(
        rig.configuration.get().unwrap().price_of_highest_buy,
        Decimal::ZERO
    );

    // 4. The next ticker tops the ladder back up to five
    rig.ticker(dec!(59100)).unwrap();
    let orders = rig.orderbook.all().unwrap();
    assert_eq!(
        prices(&orders),
        vec![
            dec!(58817.7),
            dec!(58235.3),
            dec!(57658.7),
            dec!(57087.8),
            dec!(56522.5)
        ]
    );
    assert_eq!(orders[4].volume, dec!(0.0017692));

    // 5. Rapid drop: every buy fills, nothing is sold
    rig.ticker(dec!(50000)).unwrap();
    for order in rig.orderbook.all().unwrap() {
        rig.fill(&order.txid).unwrap();
    }
    assert_eq!(rig.orderbook.count(None).unwrap(), 0);
    assert_eq!(rig.orderbook.count(Some(Side::Sell)).unwrap(), 0);

    // 6. The ladder regrows below the new price
    rig.ticker(dec!(50100)).unwrap();
    let orders = rig.orderbook.all().unwrap();
    assert_eq!(
        prices(&orders),
        vec![
            dec!(49603.9),
            dec!(49112.7),
            dec!(48626.4),
            dec!(48144.9),
            dec!(47668.2)
        ]
    );
    assert_eq!(
        orders.iter().map(|o| o.volume).collect::<Vec<_>>(),
        vec![
            dec!(0.00201597),
            dec!(0.00203613),
            dec!(0.00205649),
            dec!(0.00207706),
            dec!(0.00209783)
        ]
    );
    for order in &orders {
        assert_eq!(order.side, Side::Buy);
    }
}
