//! Pricing policy injected into the grid core.
//!
//! The four strategy variants differ only in whether and how sell-side
//! orders are produced; everything else lives in the grid core. A policy
//! is two price functions plus two predicates - no inheritance, no state.

use rust_decimal::Decimal;

/// Inputs every price computation may need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceCtx {
    /// The configured grid interval, e.g. 0.02 for 2 %.
    pub interval: Decimal,
    /// Latest observed trade price.
    pub ticker: Decimal,
    /// Highest buy price seen so far (persisted).
    pub highest_buy: Decimal,
}

/// A strategy variant as seen by the grid core.
pub trait Policy: Send {
    /// Human-readable variant name, e.g. "GridHODL".
    fn name(&self) -> &'static str;

    /// Price for the next buy order, one interval below `reference`.
    /// Clamped so the result is always strictly below the ticker.
    fn buy_price(&self, ctx: &PriceCtx, reference: Decimal) -> Decimal {
        let hundred = Decimal::ONE_HUNDRED;
        let price = reference * hundred / (hundred + hundred * ctx.interval);
        if price > ctx.ticker {
            ctx.ticker * hundred / (hundred + hundred * ctx.interval)
        } else {
            price
        }
    }

    /// Price for the next sell order, or `None` when the variant has no
    /// sell side. `extra` requests the extra-sell price (SWING only).
    fn sell_price(&self, ctx: &PriceCtx, reference: Decimal, extra: bool) -> Option<Decimal>;

    /// Whether the variant places an extra sell when no sell is open.
    fn has_extra_sell(&self) -> bool {
        false
    }

    /// Whether counter-sells use the executed buy volume instead of the
    /// fee-corrected volume (GridSell accumulates quote, not base).
    fn sells_executed_volume(&self) -> bool {
        false
    }
}
