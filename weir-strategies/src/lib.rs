//! Weir Strategies - the four grid variants.
//!
//! Each variant is a thin pricing policy over the grid core in
//! `weir-core`:
//!
//! - **GridHODL**: buys and fee-corrected sells, slowly accumulating base
//! - **GridSell**: sells exactly the bought volume, accumulating quote
//! - **SWING**: GridHODL plus an extra sell two intervals above the top
//! - **cDCA**: buy-only; filled buys are simply consumed

mod cdca;
mod hodl;
mod sell;
mod swing;

pub use cdca::Cdca;
pub use hodl::GridHodl;
pub use sell::GridSell;
pub use swing::Swing;

use rust_decimal::Decimal;
use weir_core::config::StrategyKind;
use weir_core::grid::{Policy, PriceCtx};

/// Build the policy for a configured strategy kind.
pub fn policy_for(kind: StrategyKind) -> Box<dyn Policy> {
    match kind {
        StrategyKind::GridHodl => Box::new(GridHodl),
        StrategyKind::GridSell => Box::new(GridSell),
        StrategyKind::Swing => Box::new(Swing),
        StrategyKind::Cdca => Box::new(Cdca),
    }
}

/// The regular sell price shared by every variant that sells: one
/// interval above the reference, clamped so it stays above the ticker.
pub(crate) fn regular_sell_price(ctx: &PriceCtx, reference: Decimal) -> Decimal {
    let step = Decimal::ONE + ctx.interval;
    let price = reference * step;
    if ctx.ticker > price {
        ctx.ticker * step
    } else {
        price
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use rust_decimal::Decimal;
    use weir_core::grid::PriceCtx;

    pub fn ctx(ticker: Decimal, highest_buy: Decimal) -> PriceCtx {
        PriceCtx {
            interval: Decimal::new(1, 2),
            ticker,
            highest_buy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_policy_for_names() {
        assert_eq!(policy_for(StrategyKind::GridHodl).name(), "GridHODL");
        assert_eq!(policy_for(StrategyKind::GridSell).name(), "GridSell");
        assert_eq!(policy_for(StrategyKind::Swing).name(), "SWING");
        assert_eq!(policy_for(StrategyKind::Cdca).name(), "cDCA");
    }

    #[test]
    fn test_only_swing_has_extra_sell() {
        assert!(policy_for(StrategyKind::Swing).has_extra_sell());
        for kind in [
            StrategyKind::GridHodl,
            StrategyKind::GridSell,
            StrategyKind::Cdca,
        ] {
            assert!(!policy_for(kind).has_extra_sell());
        }
    }

    #[test]
    fn test_only_grid_sell_passes_executed_volume() {
        assert!(policy_for(StrategyKind::GridSell).sells_executed_volume());
        for kind in [
            StrategyKind::GridHodl,
            StrategyKind::Swing,
            StrategyKind::Cdca,
        ] {
            assert!(!policy_for(kind).sells_executed_volume());
        }
    }

    #[test]
    fn test_buy_price_is_shared_and_below_ticker() {
        // All variants share the buy formula: reference / (1 + interval)
        let ctx = test_support::ctx(dec!(50000), dec!(0));
        for kind in [
            StrategyKind::GridHodl,
            StrategyKind::GridSell,
            StrategyKind::Swing,
            StrategyKind::Cdca,
        ] {
            let price = policy_for(kind).buy_price(&ctx, dec!(50000));
            assert_eq!(
                weir_core::core::truncate_to_scale(price, 1),
                dec!(49504.9)
            );
            assert!(price < ctx.ticker);
        }
    }

    #[test]
    fn test_buy_price_reclamps_on_high_reference() {
        // A reference above the ticker must not produce a buy above it
        let ctx = test_support::ctx(dec!(50000), dec!(0));
        let price = policy_for(StrategyKind::GridHodl).buy_price(&ctx, dec!(60000));
        assert_eq!(weir_core::core::truncate_to_scale(price, 1), dec!(49504.9));
    }
}
