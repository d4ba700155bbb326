//! cDCA: cost-average buys only. There is no sell side; a filled buy is
//! simply consumed and the ladder rebuilt below the price.

use rust_decimal::Decimal;
use tracing::debug;
use weir_core::grid::{Policy, PriceCtx};

pub struct Cdca;

impl Policy for Cdca {
    fn name(&self) -> &'static str {
        "cDCA"
    }

    fn sell_price(&self, _ctx: &PriceCtx, _reference: Decimal, _extra: bool) -> Option<Decimal> {
        debug!("cDCA has no sell side.");
        None
    }
}
