//! Order placement, cancellation and the arbitrage path.

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::core::{Error, Order, OrderStatus, Result, Side, State};
use crate::exchange::{AmountKind, OrderRequest};
use crate::grid::GridStrategy;

impl GridStrategy {
    /// Place the next leg of a buy/sell round trip.
    ///
    /// `txid_to_delete` is the order consumed by this placement: the
    /// filled buy a sell answers, or the filled sell a buy answers.
    pub(crate) fn handle_arbitrage(
        &mut self,
        side: Side,
        order_price: Option<Decimal>,
        txid_to_delete: Option<&str>,
    ) -> Result<()> {
        debug!(?side, ?order_price, ?txid_to_delete, "Handling arbitrage");
        if self.config.dry_run {
            info!("Dry run, not placing a {side} order.");
            return Ok(());
        }

        match side {
            Side::Buy => {
                let price = order_price
                    .ok_or_else(|| Error::Lifecycle("buy order requested without a price".into()))?;
                self.new_buy_order(price, txid_to_delete)?;
            }
            Side::Sell => self.new_sell_order(order_price, txid_to_delete)?,
        }

        // Pause to respect exchange rate limits.
        self.throttle();
        Ok(())
    }

    fn new_buy_order(&mut self, order_price: Decimal, txid_to_delete: Option<&str>) -> Result<()> {
        if let Some(txid) = txid_to_delete {
            self.orderbook.remove(txid)?;
        }
        if self.orderbook.count(Some(Side::Buy))? >= i64::from(self.config.n_open_buy_orders) {
            return Ok(());
        }
        if self.max_investment_reached()? {
            return Ok(());
        }

        let pair = self.pair_info()?.clone();
        let price = self.rest.truncate(order_price, AmountKind::Price, &pair);
        // The fee is accounted for on the sell side.
        let volume =
            self.rest
                .truncate(self.config.amount_per_grid / price, AmountKind::Volume, &pair);

        let balances = self.rest.pair_balance(&pair)?;
        if balances.quote_available > self.amount_per_grid_plus_fee() {
            info!(
                "Placing order to buy {volume} {} @ {price} {}.",
                self.config.base_currency, self.config.quote_currency
            );
            let placed = self.rest.create_order(&OrderRequest {
                side: Side::Buy,
                symbol: self.config.symbol(),
                price,
                volume,
                userref: self.config.userref,
                validate: self.config.dry_run,
                post_only: true,
            })?;
            self.pending.add(&placed.txid)?;
            self.assign_order_by_txid(&placed.txid)?;
            return Ok(());
        }

        self.notify(format!(
            "{}: not enough {} to buy {volume} {} for {price} {}",
            self.config.symbol(),
            self.config.quote_currency,
            self.config.base_currency,
            self.config.quote_currency,
        ))?;
        warn!(?balances, "Not enough quote balance for a buy order");
        Ok(())
    }

    fn new_sell_order(
        &mut self,
        order_price: Option<Decimal>,
        txid_to_delete: Option<&str>,
    ) -> Result<()> {
        let Some(order_price) = order_price else {
            // Variant without a sell side: only consume the filled buy.
            debug!("Strategy has no sell side, not placing a sell order.");
            if let Some(txid) = txid_to_delete {
                self.orderbook.remove(txid)?;
            }
            return Ok(());
        };
        debug!("Checking conditions for placing a sell order...");

        let mut corresponding_buy: Option<Order> = None;
        if let Some(buy_txid) = txid_to_delete {
            // Record the unsold buy before talking to the exchange: a
            // crash between here and the placement must not lose the
            // sell. Re-entry keeps the first recorded price.
            if !self.unsold.contains(buy_txid)? {
                self.unsold.add(buy_txid, order_price)?;
            }

            corresponding_buy = loop {
                let buy = self.order_required_with_retry(buy_txid)?;
                if buy.status == OrderStatus::Closed && buy.volume_executed != Decimal::ZERO {
                    break Some(buy);
                }
                if self.state_machine.state().is_terminal() {
                    return Ok(());
                }
                warn!(
                    txid = buy_txid,
                    "Corresponding buy order is not closed yet, retrying shortly..."
                );
                std::thread::sleep(self.timing.retry_unit);
            };
        }

        let pair = self.pair_info()?.clone();
        let price = self.rest.truncate(order_price, AmountKind::Price, &pair);
        let volume = match (&corresponding_buy, self.policy.sells_executed_volume()) {
            // GridSell passes the bought base straight through.
            (Some(buy), true) => buy.volume_executed,
            // Correct for the fee twice so the quote balance stays
            // constant over a full buy/sell cycle while base accumulates.
            _ => {
                self.config.amount_per_grid
                    / (price * (Decimal::ONE - Decimal::TWO * self.fee))
            }
        };
        let volume = self.rest.truncate(volume, AmountKind::Volume, &pair);

        let balances = self.rest.pair_balance(&pair)?;
        if balances.base_available >= volume {
            info!(
                "Placing order to sell {volume} {} @ {price} {}.",
                self.config.base_currency, self.config.quote_currency
            );
            let placed = self.rest.create_order(&OrderRequest {
                side: Side::Sell,
                symbol: self.config.symbol(),
                price,
                volume,
                userref: self.config.userref,
                validate: self.config.dry_run,
                post_only: false,
            })?;
            self.pending.add(&placed.txid)?;

            if let Some(buy_txid) = txid_to_delete {
                // The source buy is only consumed once the sell was
                // accepted by the exchange.
                self.orderbook.remove(buy_txid)?;
                self.unsold.remove(buy_txid)?;
            }
            self.assign_order_by_txid(&placed.txid)?;
            return Ok(());
        }

        self.notify(format!(
            "{}: not enough {} to sell {volume} {} for {price} {}",
            self.config.symbol(),
            self.config.base_currency,
            self.config.base_currency,
            self.config.quote_currency,
        ))?;
        warn!(?balances, "Not enough base balance for a sell order");

        if self.policy.sells_executed_volume() {
            if let Some(buy_txid) = txid_to_delete {
                // Misconfiguration path: drop the source buy here; the
                // unsold entry keeps the sell attempt alive across the
                // restart the supervisor is expected to perform.
                self.orderbook.remove(buy_txid)?;
            }
        }
        Ok(())
    }

    /// Cancel an order and salvage any partially executed volume.
    ///
    /// The local orderbook is the gatekeeper: txids it does not track
    /// are ignored, which makes this handler idempotent and lets
    /// stream-initiated and self-initiated cancels share one path.
    pub(crate) fn handle_cancel_order(&mut self, txid: &str) -> Result<()> {
        if self.orderbook.get(txid)?.is_none() {
            return Ok(());
        }

        let order = self.order_required_with_retry(txid)?;
        if order.symbol != self.pair_info()?.altname || order.userref != self.config.userref {
            return Ok(());
        }
        if self.config.dry_run {
            info!("Dry run, not cancelling order '{txid}'");
            return Ok(());
        }

        info!("Cancelling order '{txid}'");
        match self.rest.cancel_order(txid) {
            Ok(()) => {}
            Err(Error::UnknownOrder(_)) => {
                info!("Order '{txid}' is already closed, removing from the orderbook...");
            }
            Err(other) => return Err(other),
        }
        self.orderbook.remove(txid)?;

        if order.volume_executed != Decimal::ZERO {
            info!("Order '{txid}' was partly filled - saving those funds.");
            self.configuration.add_unfilled_volume(order.volume_executed)?;
            let row = self.configuration.get()?;
            if row.vol_of_unfilled_remaining_max_price < order.price {
                self.configuration.set_unfilled_max_price(order.price)?;
            }

            // Sell the remainder once enough partial fills accumulated.
            // Not perfect - some dust can stay behind - but better than
            // leaving everything stuck.
            let row = self.configuration.get()?;
            if row.vol_of_unfilled_remaining * row.vol_of_unfilled_remaining_max_price
                >= self.config.amount_per_grid
            {
                info!("Collected enough partly filled volume to create a sell order...");
                let price =
                    self.order_price(Side::Sell, row.vol_of_unfilled_remaining_max_price, false)?;
                self.handle_arbitrage(Side::Sell, price, None)?;
                self.configuration.reset_unfilled()?;
            }
        }
        Ok(())
    }

    /// Cancel every open buy order of this instance upstream and wipe
    /// the buy side of the local orderbook.
    pub(crate) fn cancel_all_open_buy_orders(&mut self) -> Result<()> {
        info!("Cancelling all open buy orders...");
        let altname = self.pair_info()?.altname.clone();
        for order in self.rest.open_orders(self.config.userref)? {
            if order.side == Side::Buy && order.symbol == altname {
                self.handle_cancel_order(&order.txid)?;
                self.throttle();
            }
        }
        self.orderbook.remove_side(Side::Buy)
    }

    /// Handle a `filled` execution report.
    pub(crate) fn handle_filled_order(&mut self, txid: &str) -> Result<()> {
        self.handle_filled_order_inner(txid, false)
    }

    fn handle_filled_order_inner(&mut self, txid: &str, requeued: bool) -> Result<()> {
        debug!(txid, "Handling a new filled order event");

        let mut order = self.order_required_with_retry(txid)?;
        if order.symbol != self.pair_info()?.altname || order.userref != self.config.userref {
            debug!(txid, "Filled order was not from this instance or pair.");
            return Ok(());
        }

        // The REST view can lag behind the execution stream.
        let mut tries: u32 = 1;
        while order.status != OrderStatus::Closed && tries <= 3 {
            warn!(txid, tries, "Order is not closed yet upstream, retrying...");
            std::thread::sleep(self.timing.retry_unit * (2 + tries));
            if let Some(fresh) = self.rest.get_order(txid)? {
                order = fresh;
            }
            tries += 1;
        }
        if order.status != OrderStatus::Closed {
            if requeued {
                warn!(txid, "Upstream never reported the order closed, giving up.");
                return Ok(());
            }
            warn!(
                txid,
                "REST view still lags the execution stream, re-enqueueing once..."
            );
            return self.handle_filled_order_inner(txid, true);
        }

        if self.config.dry_run {
            info!("Dry run, not handling the filled order event.");
            return Ok(());
        }

        self.notify_executed(&order)?;
        self.settle_filled_order(&order)
    }

    /// Place the counter-order for a filled one.
    pub(crate) fn settle_filled_order(&mut self, order: &Order) -> Result<()> {
        match order.side {
            Side::Buy => {
                let price = self.order_price(Side::Sell, order.price, false)?;
                self.handle_arbitrage(Side::Sell, price, Some(&order.txid))
            }
            Side::Sell => {
                if self.orderbook.count_excluding(Side::Sell, &order.txid)? != 0 {
                    let price = self.order_price(Side::Buy, order.price, false)?;
                    self.handle_arbitrage(Side::Buy, price, Some(&order.txid))
                } else {
                    // After the last sell the price is high enough that
                    // the shift-up rule rebuilds the grid on the next
                    // ticker anyway.
                    self.orderbook.remove(&order.txid)
                }
            }
        }
    }

    pub(crate) fn notify_executed(&self, order: &Order) -> Result<()> {
        self.notify(format!(
            "{}: {} order executed\n - price: {} {}\n - size: {} {}\n - value: {} {}",
            self.config.symbol(),
            order.side,
            order.price,
            self.config.quote_currency,
            order.volume_executed,
            self.config.base_currency,
            order.price * order.volume_executed,
            self.config.quote_currency,
        ))
    }

    /// Fetch an order that must exist; exhausted retries escalate to
    /// ERROR.
    pub(crate) fn order_required_with_retry(&self, txid: &str) -> Result<Order> {
        match self.rest.order_with_retry(txid, 5)? {
            Some(order) => Ok(order),
            None => {
                error!(txid, "Failed to retrieve order info after retries!");
                self.state_machine.transition_to(State::Error)?;
                Err(Error::Exchange(format!(
                    "failed to retrieve order info for '{txid}'"
                )))
            }
        }
    }
}
