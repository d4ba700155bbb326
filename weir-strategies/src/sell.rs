//! GridSell: sells exactly the executed buy volume. Quote accumulates,
//! the base position stays flat.

use rust_decimal::Decimal;
use tracing::debug;
use weir_core::grid::{Policy, PriceCtx};

use crate::regular_sell_price;

pub struct GridSell;

impl Policy for GridSell {
    fn name(&self) -> &'static str {
        "GridSell"
    }

    fn sell_price(&self, ctx: &PriceCtx, reference: Decimal, _extra: bool) -> Option<Decimal> {
        debug!("Computing the sell order price...");
        Some(regular_sell_price(ctx, reference))
    }

    fn sells_executed_volume(&self) -> bool {
        true
    }
}
