//! Reconciliation of the local orderbook against the upstream one.
//!
//! Runs once at startup and lazily whenever pending placements exist.
//! Running it twice in a row produces no further changes.

use std::collections::HashSet;
use tracing::{debug, info};

use crate::core::{Error, OrderStatus, Result, Side};
use crate::grid::GridStrategy;

impl GridStrategy {
    /// Fetch the pair parameters and derive the effective maker fee.
    pub(crate) fn check_asset_pair_parameter(&mut self) -> Result<()> {
        info!("- Checking asset pair parameters...");
        let info = self
            .rest
            .asset_pair_info(&self.config.base_currency, &self.config.quote_currency)?;
        debug!(?info, "Fetched asset pair parameters");

        self.fee = match self.config.fee {
            Some(fee) => fee,
            // No override passed: assume the highest maker fee tier.
            None => info.top_maker_fee().ok_or_else(|| {
                Error::Exchange(format!("no maker fee tiers reported for {}", info.altname))
            })?,
        };
        self.pair_info = Some(info);
        Ok(())
    }

    /// Reconcile one order by txid: a pending placement moves into the
    /// orderbook, an already tracked order is refreshed in place.
    pub(crate) fn assign_order_by_txid(&mut self, txid: &str) -> Result<()> {
        info!("Processing order '{txid}'...");
        let order = self.order_required_with_retry(txid)?;
        debug!(?order, "- Order information");

        if order.symbol != self.pair_info()?.altname || order.userref != self.config.userref {
            info!("Order '{txid}' does not belong to this instance.");
            return Ok(());
        }

        if self.pending.contains(txid)? {
            self.orderbook.add(&order)?;
            self.pending.remove(txid)?;
        } else {
            self.orderbook.update(&order)?;
            info!("Updated order '{txid}' in the orderbook.");
        }

        info!(
            "Current investment: {} / {} {}",
            self.investment()?,
            self.config.max_investment,
            self.config.quote_currency
        );
        Ok(())
    }

    /// Drain the pending set into the orderbook.
    pub(crate) fn assign_all_pending(&mut self) -> Result<()> {
        info!("- Checking pending transactions...");
        for txid in self.pending.all()? {
            self.assign_order_by_txid(&txid)?;
        }
        Ok(())
    }

    /// Attempt the counter-sell for every recorded unsold buy. Entries
    /// exist when placing the sell failed earlier (e.g. missing funds)
    /// or the process died between fill and placement.
    pub(crate) fn place_missed_sell_orders(&mut self) -> Result<()> {
        info!("- Creating sell orders based on unsold buy orders...");
        for entry in self.unsold.all()? {
            info!("  - {}: sell at {}", entry.txid, entry.price);
            self.handle_arbitrage(Side::Sell, Some(entry.price), Some(&entry.txid))?;
        }
        Ok(())
    }

    /// Compare the local orderbook with the upstream one: adopt untracked
    /// upstream orders, settle locally tracked orders that got filled and
    /// drop the ones canceled while the engine was away.
    pub(crate) fn sync_local_orderbook(&mut self) -> Result<()> {
        info!("- Syncing the orderbook with upstream...");

        let altname = self.pair_info()?.altname.clone();
        info!("  - Retrieving open orders from upstream...");
        let upstream: Vec<_> = self
            .rest
            .open_orders(self.config.userref)?
            .into_iter()
            .filter(|order| order.symbol == altname)
            .collect();
        let upstream_txids: HashSet<String> =
            upstream.iter().map(|order| order.txid.clone()).collect();
        let local_txids: HashSet<String> = self
            .orderbook
            .all()?
            .into_iter()
            .map(|order| order.txid)
            .collect();

        let mut changed = false;
        for order in &upstream {
            if !local_txids.contains(&order.txid) {
                info!(
                    "  - Adding upstream order to the local orderbook: {}",
                    order.txid
                );
                self.orderbook.add(order)?;
                changed = true;
            }
        }
        if !changed {
            info!("  - Nothing changed!");
        }

        // Orders tracked locally but gone upstream were filled or
        // canceled while the engine was not looking.
        for order in self.orderbook.all()? {
            if upstream_txids.contains(&order.txid) {
                continue;
            }
            let closed = self.order_required_with_retry(&order.txid)?;
            match closed.status {
                OrderStatus::Closed => {
                    info!("Handling executed order: {}", closed.txid);
                    self.notify_executed(&closed)?;
                    self.settle_filled_order(&closed)?;
                }
                OrderStatus::Canceled | OrderStatus::Expired => {
                    self.orderbook.remove(&order.txid)?;
                }
                // Still active (open or pending)
                _ => continue,
            }
        }

        info!("- Orderbook initialized!");
        Ok(())
    }

    /// Detect changed setup parameters; a changed amount or interval
    /// invalidates the buy ladder. Sells are left alone.
    pub(crate) fn check_configuration_changes(&mut self) -> Result<()> {
        info!("- Checking configuration changes...");
        let mut cancel_open_buys = false;
        let row = self.configuration.get()?;

        if self.config.amount_per_grid != row.amount_per_grid {
            info!(" - Amount per grid changed => cancelling open buy orders soon...");
            self.configuration
                .set_amount_per_grid(self.config.amount_per_grid)?;
            cancel_open_buys = true;
        }
        if self.config.interval != row.interval {
            info!(" - Interval changed => cancelling open buy orders soon...");
            self.configuration.set_interval(self.config.interval)?;
            cancel_open_buys = true;
        }

        if cancel_open_buys {
            self.cancel_all_open_buy_orders()?;
        }
        info!("- Configuration checked and up-to-date!");
        Ok(())
    }
}
