//! The two exchange ports the grid core consumes.

use crossbeam::channel::Sender;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::warn;

use crate::core::{AssetBalance, AssetPairInfo, Order, PairBalances, Result};
use crate::exchange::types::{
    AmountKind, CreateOrderResponse, OrderRequest, StreamMessage, Subscription,
};

/// Synchronous request/response port to the exchange. Calls block the
/// decision loop on purpose (see the concurrency model in the crate
/// docs).
pub trait ExchangeRest: Send + Sync {
    /// Current system status; "online" means trading is possible.
    fn system_status(&self) -> Result<String>;

    /// Static pair metadata (altname, precision, maker fee tiers).
    fn asset_pair_info(&self, base: &str, quote: &str) -> Result<AssetPairInfo>;

    /// All asset balances of the account.
    fn balances(&self) -> Result<Vec<AssetBalance>>;

    /// Overall and available balances of the traded pair.
    fn pair_balance(&self, pair: &AssetPairInfo) -> Result<PairBalances>;

    /// Place a limit order. Returns the transaction id assigned by the
    /// exchange.
    fn create_order(&self, request: &OrderRequest) -> Result<CreateOrderResponse>;

    /// Cancel an order. Returns [`crate::core::Error::UnknownOrder`] when
    /// the exchange no longer knows the txid; callers treat that as
    /// already-canceled.
    fn cancel_order(&self, txid: &str) -> Result<()>;

    /// Cancel every open order of the account, regardless of userref.
    fn cancel_all_orders(&self) -> Result<()>;

    /// Fetch a single order, or `None` when the REST view does not know
    /// it (yet).
    fn get_order(&self, txid: &str) -> Result<Option<Order>>;

    /// All open orders tagged with `userref`.
    fn open_orders(&self, userref: i64) -> Result<Vec<Order>>;

    /// Truncate (never round) an amount to the pair's price or volume
    /// precision.
    fn truncate(&self, amount: Decimal, kind: AmountKind, pair: &AssetPairInfo) -> Decimal;

    /// Verify the API key carries every permission the engine needs:
    /// balance query, open/closed order query, order creation, order
    /// cancellation and websocket token issuance.
    fn check_api_key_permissions(&self) -> Result<()>;

    /// Fetch an order, retrying while the REST view lags behind the
    /// stream. Waits `2 * n` seconds between attempts.
    fn order_with_retry(&self, txid: &str, max_tries: u32) -> Result<Option<Order>> {
        let mut tries = 0;
        loop {
            if let Some(order) = self.get_order(txid)? {
                return Ok(Some(order));
            }
            tries += 1;
            if tries >= max_tries {
                return Ok(None);
            }
            let wait = Duration::from_secs(2 * u64::from(tries));
            warn!(
                txid,
                tries, max_tries, "Could not find order, retrying after {wait:?}..."
            );
            std::thread::sleep(wait);
        }
    }
}

/// Streaming port. The adapter owns its own connection handling and
/// forwards parsed messages into the engine's channel.
pub trait ExchangeStream: Send {
    /// Register a channel subscription. Must be called before `start`.
    fn subscribe(&mut self, subscription: Subscription) -> Result<()>;

    /// Connect and start forwarding messages into `sender`.
    fn start(&mut self, sender: Sender<StreamMessage>) -> Result<()>;

    /// Disconnect and stop forwarding.
    fn close(&mut self) -> Result<()>;
}
