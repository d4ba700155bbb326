//! SWING: GridHODL plus an extra sell when no sell order is open and
//! free base remains. The extra sell sits two intervals above the
//! reference - or above the highest buy ever seen, whichever is higher,
//! so swing trades never undercut the accumulation price.

use rust_decimal::Decimal;
use tracing::debug;
use weir_core::grid::{Policy, PriceCtx};

use crate::regular_sell_price;

pub struct Swing;

impl Policy for Swing {
    fn name(&self) -> &'static str {
        "SWING"
    }

    fn sell_price(&self, ctx: &PriceCtx, reference: Decimal, extra: bool) -> Option<Decimal> {
        debug!("Computing the sell order price...");
        if extra {
            let step = (Decimal::ONE + ctx.interval) * (Decimal::ONE + ctx.interval);
            let price = reference * step;
            let floor = ctx.highest_buy * step;
            Some(if price < floor { floor } else { price })
        } else {
            Some(regular_sell_price(ctx, reference))
        }
    }

    fn has_extra_sell(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ctx;
    use rust_decimal_macros::dec;

    #[test]
    fn test_regular_sell_matches_hodl_formula() {
        let price = Swing
            .sell_price(&ctx(dec!(59000), dec!(0)), dec!(59405.9), false)
            .unwrap();
        assert_eq!(price, dec!(59999.959));
    }

    #[test]
    fn test_extra_sell_two_intervals_above_ticker() {
        let price = Swing
            .sell_price(&ctx(dec!(50000), dec!(0)), dec!(50000), true)
            .unwrap();
        // 50000 * 1.01^2
        assert_eq!(price, dec!(51005.0000));
    }

    #[test]
    fn test_extra_sell_floors_at_highest_buy() {
        // The highest buy is above the ticker: the extra sell must not
        // undercut it
        let price = Swing
            .sell_price(&ctx(dec!(50000), dec!(60000)), dec!(50000), true)
            .unwrap();
        assert_eq!(price, dec!(60000) * dec!(1.01) * dec!(1.01));
    }
}
