//! Property tests: whatever the ticker does (without fills), the grid
//! keeps its structural invariants.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use weir_core::config::StrategyKind;
use weir_core::core::Side;
use weir_core::testing::{test_config, TestRig};
use weir_strategies::GridHodl;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_ticker_walks_preserve_grid_invariants(
        walk in prop::collection::vec(45_000u32..=65_000, 1..6)
    ) {
        let rig = TestRig::new(test_config(StrategyKind::GridHodl), Box::new(GridHodl));
        rig.ticker(Decimal::from(walk[0])).unwrap();
        rig.connect_executions().unwrap();
        for step in &walk[1..] {
            rig.ticker(Decimal::from(*step)).unwrap();
        }

        let buys = rig.orderbook.by_side(Side::Buy).unwrap();

        // With ample quote balance the ladder is always full
        prop_assert_eq!(buys.len(), 5);

        // Basic per-order sanity
        for order in &buys {
            prop_assert!(order.price > Decimal::ZERO);
            prop_assert!(order.volume > Decimal::ZERO);
            prop_assert!(order.volume_executed <= order.volume);
            prop_assert_eq!(rig.exchange.is_post_only(&order.txid), Some(true));
        }

        // Minimum spacing of interval/2 between any two open buys
        let mut prices: Vec<Decimal> = buys.iter().map(|o| o.price).collect();
        prices.sort_unstable_by(|a, b| b.cmp(a));
        for pair in prices.windows(2) {
            prop_assert!(pair[0] / pair[1] - Decimal::ONE >= dec!(0.005));
        }

        // The investment cap is never exceeded by more than one level
        let investment: Decimal = buys.iter().map(|o| o.price * o.volume).sum();
        prop_assert!(investment <= dec!(10000) + dec!(100) * (Decimal::ONE + dec!(0.0025)));

        // Nothing is left half-reconciled after a quiet tick
        prop_assert_eq!(rig.pending.count().unwrap(), 0);
        prop_assert_eq!(rig.unsold.count().unwrap(), 0);
    }
}
