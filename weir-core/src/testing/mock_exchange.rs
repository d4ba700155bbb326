//! A simulated upstream exchange.

use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::core::{
    truncate_to_scale, unix_now, AssetBalance, AssetPairInfo, Error, Order, OrderStatus,
    PairBalances, Result, Side,
};
use crate::exchange::{AmountKind, CreateOrderResponse, ExchangeRest, OrderRequest};

struct MockState {
    orders: Vec<Order>,
    post_only: Vec<(String, bool)>,
    next_txid: u64,
    base_balance: Decimal,
    quote_balance: Decimal,
}

/// In-memory stand-in for the exchange REST API.
///
/// Orders are acknowledged instantly; fills and partial fills are
/// injected by the test. The traded pair is fixed to BTC/USD with
/// Kraken-style metadata (price precision 1, volume precision 8, top
/// maker fee tier 0.25 %).
pub struct MockExchange {
    state: Mutex<MockState>,
    pair: AssetPairInfo,
}

impl MockExchange {
    /// Balances default to 100 base / 1_000_000 quote.
    pub fn new() -> Self {
        Self::with_balances(Decimal::ONE_HUNDRED, Decimal::new(1_000_000, 0))
    }

    pub fn with_balances(base: Decimal, quote: Decimal) -> Self {
        Self {
            state: Mutex::new(MockState {
                orders: Vec::new(),
                post_only: Vec::new(),
                next_txid: 0,
                base_balance: base,
                quote_balance: quote,
            }),
            pair: AssetPairInfo {
                altname: "BTCUSD".into(),
                base: "XXBT".into(),
                quote: "ZUSD".into(),
                cost_decimals: 5,
                pair_decimals: 1,
                lot_decimals: 8,
                fees_maker: vec![
                    (Decimal::ZERO, Decimal::new(25, 2)),
                    (Decimal::new(10_000, 0), Decimal::new(2, 1)),
                    (Decimal::new(50_000, 0), Decimal::new(14, 2)),
                ],
            },
        }
    }

    /// Mark an order fully executed and move the balances.
    pub fn fill_order(&self, txid: &str) {
        let mut state = self.state.lock();
        if let Some(order) = state.orders.iter_mut().find(|o| o.txid == txid) {
            order.status = OrderStatus::Closed;
            order.volume_executed = order.volume;
            let volume = order.volume;
            let cost = order.price * order.volume;
            match order.side {
                Side::Buy => {
                    state.base_balance += volume;
                    state.quote_balance -= cost;
                }
                Side::Sell => {
                    state.base_balance -= volume;
                    state.quote_balance += cost;
                }
            }
        }
    }

    /// Execute only part of an order; it stays open.
    pub fn fill_order_partially(&self, txid: &str, volume: Decimal) {
        let mut state = self.state.lock();
        if let Some(order) = state.orders.iter_mut().find(|o| o.txid == txid) {
            order.volume_executed += volume;
        }
    }

    /// All orders the exchange has ever seen, in placement order.
    pub fn orders(&self) -> Vec<Order> {
        self.state.lock().orders.clone()
    }

    pub fn open_order_count(&self) -> usize {
        self.state
            .lock()
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Open)
            .count()
    }

    /// Whether the order was placed with the post-only flag.
    pub fn is_post_only(&self, txid: &str) -> Option<bool> {
        self.state
            .lock()
            .post_only
            .iter()
            .find(|(id, _)| id == txid)
            .map(|(_, flag)| *flag)
    }

    pub fn set_quote_balance(&self, quote: Decimal) {
        self.state.lock().quote_balance = quote;
    }

    pub fn set_base_balance(&self, base: Decimal) {
        self.state.lock().base_balance = base;
    }
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeRest for MockExchange {
    fn system_status(&self) -> Result<String> {
        Ok("online".into())
    }

    fn asset_pair_info(&self, _base: &str, _quote: &str) -> Result<AssetPairInfo> {
        Ok(self.pair.clone())
    }

    fn balances(&self) -> Result<Vec<AssetBalance>> {
        let state = self.state.lock();
        Ok(vec![
            AssetBalance {
                asset: "XXBT".into(),
                balance: state.base_balance,
                hold_trade: Decimal::ZERO,
            },
            AssetBalance {
                asset: "ZUSD".into(),
                balance: state.quote_balance,
                hold_trade: Decimal::ZERO,
            },
        ])
    }

    fn pair_balance(&self, pair: &AssetPairInfo) -> Result<PairBalances> {
        let mut balances = PairBalances::default();
        for balance in self.balances()? {
            if balance.asset == pair.base {
                balances.base_balance = balance.balance;
                balances.base_available = balance.balance - balance.hold_trade;
            } else if balance.asset == pair.quote {
                balances.quote_balance = balance.balance;
                balances.quote_available = balance.balance - balance.hold_trade;
            }
        }
        Ok(balances)
    }

    fn create_order(&self, request: &OrderRequest) -> Result<CreateOrderResponse> {
        let mut state = self.state.lock();
        state.next_txid += 1;
        let txid = format!("TX{:06}", state.next_txid);
        state.orders.push(Order {
            txid: txid.clone(),
            userref: request.userref,
            symbol: self.pair.altname.clone(),
            side: request.side,
            price: request.price,
            volume: request.volume,
            volume_executed: Decimal::ZERO,
            status: OrderStatus::Open,
            created_at: unix_now(),
        });
        state.post_only.push((txid.clone(), request.post_only));
        Ok(CreateOrderResponse { txid })
    }

    fn cancel_order(&self, txid: &str) -> Result<()> {
        let mut state = self.state.lock();
        match state.orders.iter_mut().find(|o| o.txid == txid) {
            Some(order) => {
                order.status = OrderStatus::Canceled;
                Ok(())
            }
            None => Err(Error::UnknownOrder(txid.into())),
        }
    }

    fn cancel_all_orders(&self) -> Result<()> {
        for order in &mut self.state.lock().orders {
            if order.status == OrderStatus::Open {
                order.status = OrderStatus::Canceled;
            }
        }
        Ok(())
    }

    fn get_order(&self, txid: &str) -> Result<Option<Order>> {
        Ok(self
            .state
            .lock()
            .orders
            .iter()
            .find(|o| o.txid == txid)
            .cloned())
    }

    fn open_orders(&self, userref: i64) -> Result<Vec<Order>> {
        Ok(self
            .state
            .lock()
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Open && o.userref == userref)
            .cloned()
            .collect())
    }

    fn truncate(&self, amount: Decimal, kind: AmountKind, pair: &AssetPairInfo) -> Decimal {
        let scale = match kind {
            AmountKind::Price => pair.pair_decimals,
            AmountKind::Volume => pair.lot_decimals,
        };
        truncate_to_scale(amount, scale)
    }

    fn check_api_key_permissions(&self) -> Result<()> {
        Ok(())
    }
}
