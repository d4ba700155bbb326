//! The grid strategy core.
//!
//! Reacts to ticker and execution events, maintains the ladder of open
//! buy (and possibly sell) orders, and reconciles the local orderbook
//! against the upstream one. The price formulas of the four variants are
//! injected through the [`Policy`] trait; everything here is common to
//! all of them.
//!
//! The decision loop runs once per ticker:
//!
//! 1. drain pending placements first (skip the rest of the tick),
//! 2. cancel near-duplicate buys (minimum spacing of interval/2),
//! 3. top the ladder up to `n_open_buy_orders`,
//! 4. trim surplus buys from the bottom,
//! 5. shift the whole ladder up after a sufficient upward move,
//! 6. place the extra sell (SWING only).

mod orders;
mod policy;
mod sync;

pub use policy::{Policy, PriceCtx};

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::core::{
    AssetPairInfo, Error, Event, EventBus, Order, Result, Side, State, StateMachine, Ticker,
};
use crate::db::{ConfigurationTable, Database, Orderbook, PendingTxids, UnsoldBuyTxids};
use crate::exchange::ExchangeRest;

/// Hysteresis band on the shift-up trigger, preventing oscillation when
/// the ticker sits exactly on the boundary.
fn shift_up_hysteresis() -> Decimal {
    Decimal::new(1001, 3) // 1.001
}

/// Sleep lengths used by the strategy. Tests run with [`Timing::none`].
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Pause after every placement, respecting exchange rate limits.
    pub order_throttle: Duration,
    /// Base unit for retry waits while the REST view lags the stream.
    pub retry_unit: Duration,
}

impl Timing {
    pub fn live() -> Self {
        Self {
            order_throttle: Duration::from_millis(200),
            retry_unit: Duration::from_secs(1),
        }
    }

    pub fn none() -> Self {
        Self {
            order_throttle: Duration::ZERO,
            retry_unit: Duration::ZERO,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::live()
    }
}

/// The price-range controller and order bookkeeper for one trading pair.
pub struct GridStrategy {
    config: BotConfig,
    policy: Box<dyn Policy>,
    rest: Arc<dyn ExchangeRest>,
    bus: Arc<EventBus>,
    state_machine: Arc<StateMachine>,
    orderbook: Orderbook,
    configuration: ConfigurationTable,
    pending: PendingTxids,
    unsold: UnsoldBuyTxids,
    pair_info: Option<AssetPairInfo>,
    fee: Decimal,
    ticker: Option<Decimal>,
    timing: Timing,
}

impl GridStrategy {
    pub fn new(
        config: BotConfig,
        policy: Box<dyn Policy>,
        rest: Arc<dyn ExchangeRest>,
        bus: Arc<EventBus>,
        state_machine: Arc<StateMachine>,
        db: &Database,
    ) -> Result<Self> {
        config.validate()?;
        let userref = config.userref;
        Ok(Self {
            config,
            policy,
            rest,
            bus,
            state_machine,
            orderbook: Orderbook::new(db.clone(), userref),
            configuration: ConfigurationTable::new(db.clone(), userref),
            pending: PendingTxids::new(db.clone(), userref),
            unsold: UnsoldBuyTxids::new(db.clone(), userref),
            pair_info: None,
            fee: Decimal::ZERO,
            ticker: None,
            timing: Timing::default(),
        })
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn set_timing(&mut self, timing: Timing) {
        self.timing = timing;
    }

    // ======================================================================
    // Event handlers

    pub fn on_ticker(&mut self, ticker: &Ticker) -> Result<()> {
        self.ticker = Some(ticker.last);
        self.configuration.touch_last_price_time()?;

        if self.state_machine.state() == State::Running {
            if self.unsold.count()? != 0 {
                self.place_missed_sell_orders()?;
            }
            self.check_price_range()?;
        }
        Ok(())
    }

    pub fn on_order_placed(&mut self, txid: &str) -> Result<()> {
        debug!(txid, "Got an order placed event");
        self.assign_order_by_txid(txid)
    }

    pub fn on_order_filled(&mut self, txid: &str) -> Result<()> {
        debug!(txid, "Got an order filled event");
        self.handle_filled_order(txid)
    }

    pub fn on_order_cancelled(&mut self, txid: &str) -> Result<()> {
        debug!(txid, "Got an order cancelled event");
        self.handle_cancel_order(txid)
    }

    /// One-shot setup once the execution stream is live: sync the local
    /// orderbook with upstream, retry missed sells, then enter RUNNING.
    pub fn on_prepare_for_trading(&mut self) -> Result<()> {
        info!("Preparing for trading by initializing and updating the local orderbook...");
        self.notify(format!(
            "{} - {} is live again!",
            self.config.name,
            self.config.symbol()
        ))?;

        self.check_asset_pair_parameter()?;
        self.assign_all_pending()?;
        self.place_missed_sell_orders()?;
        self.sync_local_orderbook()?;
        self.check_configuration_changes()?;

        self.state_machine.set_fact("ready_to_trade", true);
        info!("Algorithm is ready to trade!");

        self.check_price_range()?;
        self.state_machine.transition_to(State::Running)?;
        Ok(())
    }

    // ======================================================================
    // Decision loop

    /// The heart of the algorithm; runs on every price change.
    fn check_price_range(&mut self) -> Result<()> {
        if self.config.dry_run {
            debug!("Dry run, not checking the price range.");
            return Ok(());
        }
        if self.ticker.is_none() {
            debug!("No ticker observed yet, skipping the price range check.");
            return Ok(());
        }
        debug!("Checking the grid against the current price...");

        if self.pending.count()? != 0 {
            // Placements must be reconciled first or the same level
            // could be bought twice.
            debug!("Skipping the price range check, pending transactions exist.");
            self.assign_all_pending()?;
            return Ok(());
        }

        self.check_near_buy_orders()?;
        self.ensure_n_open_buy_orders()?;

        if self.pending.count()? != 0 {
            return Ok(());
        }

        self.cancel_surplus_buy_orders()?;

        if self.shift_buy_orders_up()? {
            return Ok(());
        }

        self.check_extra_sell_order()
    }

    /// Cancel buy orders that sit closer than interval/2 to each other.
    /// Only the lower of two colliding orders survives.
    fn check_near_buy_orders(&mut self) -> Result<()> {
        debug!("Checking if the distance between buy orders is too small...");
        let mut buy_prices = self.orderbook.buy_prices()?;
        if buy_prices.is_empty() {
            return Ok(());
        }
        buy_prices.sort_unstable_by(|a, b| b.cmp(a));

        let min_spacing = self.config.interval / Decimal::TWO;
        for i in 1..buy_prices.len() {
            let higher = buy_prices[i - 1];
            let lower = buy_prices[i];
            if lower == higher || higher / lower - Decimal::ONE < min_spacing {
                for order in self.orderbook.by_side(Side::Buy)? {
                    if order.price == higher {
                        self.handle_cancel_order(&order.txid)?;
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Place buy orders until the configured count is reached, funds run
    /// out or the investment cap is hit.
    fn ensure_n_open_buy_orders(&mut self) -> Result<()> {
        debug!(
            n = self.config.n_open_buy_orders,
            "Ensuring the configured number of open buy orders..."
        );
        let mut can_place = true;
        let mut buy_prices = self.orderbook.buy_prices()?;
        loop {
            let active = self.orderbook.count(Some(Side::Buy))?;
            if active >= i64::from(self.config.n_open_buy_orders)
                || !can_place
                || self.pending.count()? != 0
                || self.max_investment_reached()?
            {
                break;
            }
            let balances = self.rest.pair_balance(self.pair_info()?)?;
            if balances.quote_available > self.amount_per_grid_plus_fee() {
                let reference = match buy_prices.iter().copied().min() {
                    Some(lowest) if active != 0 => lowest,
                    _ => self.ticker_or_err()?,
                };
                let price = self.order_price(Side::Buy, reference, false)?;
                self.handle_arbitrage(Side::Buy, price, None)?;
                buy_prices = self.orderbook.buy_prices()?;
                debug!(active = active + 1, "Placed another grid buy order");
            } else {
                warn!("Not enough quote currency available to place a buy order!");
                can_place = false;
            }
        }
        Ok(())
    }

    /// Cancel the lowest buy orders while more than `n_open_buy_orders`
    /// are open.
    fn cancel_surplus_buy_orders(&mut self) -> Result<()> {
        debug!("Checking if the lowest buy orders need to be cancelled...");
        let surplus =
            self.orderbook.count(Some(Side::Buy))? - i64::from(self.config.n_open_buy_orders);
        if surplus > 0 {
            for order in self.orderbook.lowest_buys(surplus)? {
                self.handle_cancel_order(&order.txid)?;
            }
        }
        Ok(())
    }

    /// Rebuild the whole ladder after the price moved more than two
    /// intervals (plus hysteresis) above the highest buy. Returns true
    /// when the ladder was rebuilt.
    fn shift_buy_orders_up(&mut self) -> Result<bool> {
        debug!("Checking if the buy orders need to be shifted up...");
        let Some(max_buy) = self.orderbook.highest_buy()? else {
            return Ok(false);
        };
        let step = Decimal::ONE + self.config.interval;
        let threshold = max_buy.price * step * step * shift_up_hysteresis();
        if self.ticker_or_err()? > threshold {
            self.cancel_all_open_buy_orders()?;
            self.check_price_range()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// SWING only: sell surplus base that is not bound to any grid level.
    fn check_extra_sell_order(&mut self) -> Result<()> {
        if !self.policy.has_extra_sell() {
            return Ok(());
        }
        debug!("Checking if an extra sell order can be placed...");
        if self.orderbook.count(Some(Side::Sell))? != 0 {
            return Ok(());
        }
        let balances = self.rest.pair_balance(self.pair_info()?)?;
        let ticker = self.ticker_or_err()?;
        if balances.base_available * ticker > self.amount_per_grid_plus_fee() {
            let price = self.order_price(Side::Sell, ticker, true)?;
            self.notify(format!("{}: placing an extra sell order", self.config.name))?;
            self.handle_arbitrage(Side::Sell, price, None)?;
        }
        Ok(())
    }

    // ======================================================================
    // Shared helpers

    /// Compute the order price for the given side via the injected
    /// policy. A new highest buy price is persisted when a regular sell
    /// price was produced from a reference above the stored one.
    fn order_price(
        &mut self,
        side: Side,
        reference: Decimal,
        extra: bool,
    ) -> Result<Option<Decimal>> {
        debug!("Computing the order price...");
        let highest_buy = self.configuration.get()?.price_of_highest_buy;
        let ctx = PriceCtx {
            interval: self.config.interval,
            ticker: self.ticker_or_err()?,
            highest_buy,
        };
        match side {
            Side::Buy => Ok(Some(self.policy.buy_price(&ctx, reference))),
            Side::Sell => {
                let price = self.policy.sell_price(&ctx, reference, extra);
                if price.is_some() && !extra && reference > highest_buy {
                    self.configuration.set_price_of_highest_buy(reference)?;
                }
                Ok(price)
            }
        }
    }

    pub(crate) fn pair_info(&self) -> Result<&AssetPairInfo> {
        self.pair_info
            .as_ref()
            .ok_or_else(|| Error::Lifecycle("asset pair parameters not loaded yet".into()))
    }

    pub(crate) fn ticker_or_err(&self) -> Result<Decimal> {
        self.ticker
            .ok_or_else(|| Error::Lifecycle("no ticker observed yet".into()))
    }

    pub(crate) fn amount_per_grid_plus_fee(&self) -> Decimal {
        self.config.amount_per_grid * (Decimal::ONE + self.fee)
    }

    /// Quote value currently bound in tracked orders.
    pub fn investment(&self) -> Result<Decimal> {
        Ok(self.orderbook.all()?.iter().map(Order::notional).sum())
    }

    pub fn max_investment_reached(&self) -> Result<bool> {
        let investment = self.investment()?;
        Ok(self.config.max_investment <= investment + self.amount_per_grid_plus_fee()
            || self.config.max_investment <= investment)
    }

    /// Effective maker fee (override or exchange tier).
    pub fn effective_fee(&self) -> Decimal {
        self.fee
    }

    pub(crate) fn notify(&self, message: impl Into<String>) -> Result<()> {
        self.bus.publish(Event::Notification {
            message: message.into(),
        })
    }

    pub(crate) fn throttle(&self) {
        if !self.timing.order_throttle.is_zero() {
            std::thread::sleep(self.timing.order_throttle);
        }
    }
}
