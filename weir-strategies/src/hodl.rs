//! GridHODL: the default variant. Counter-sells are fee-corrected so the
//! quote balance stays constant over a full cycle while base accumulates.

use rust_decimal::Decimal;
use tracing::debug;
use weir_core::grid::{Policy, PriceCtx};

use crate::regular_sell_price;

pub struct GridHodl;

impl Policy for GridHodl {
    fn name(&self) -> &'static str {
        "GridHODL"
    }

    fn sell_price(&self, ctx: &PriceCtx, reference: Decimal, _extra: bool) -> Option<Decimal> {
        debug!("Computing the sell order price...");
        Some(regular_sell_price(ctx, reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ctx;
    use rust_decimal_macros::dec;
    use weir_core::core::truncate_to_scale;

    #[test]
    fn test_sell_one_interval_above_buy() {
        // Top buy of the shifted grid fills at 59405.9, ticker at 59000
        let price = GridHodl
            .sell_price(&ctx(dec!(59000), dec!(0)), dec!(59405.9), false)
            .unwrap();
        assert_eq!(truncate_to_scale(price, 1), dec!(59999.9));
    }

    #[test]
    fn test_sell_reclamps_when_ticker_ran_away() {
        // Ticker already above the one-interval level: price anchors on
        // the ticker instead
        let price = GridHodl
            .sell_price(&ctx(dec!(200), dec!(0)), dec!(100), false)
            .unwrap();
        assert_eq!(price, dec!(202.00));
    }

    #[test]
    fn test_extra_flag_is_ignored() {
        let regular = GridHodl.sell_price(&ctx(dec!(59000), dec!(0)), dec!(59405.9), false);
        let extra = GridHodl.sell_price(&ctx(dec!(59000), dec!(0)), dec!(59405.9), true);
        assert_eq!(regular, extra);
    }
}
