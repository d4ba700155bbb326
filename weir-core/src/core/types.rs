//! Domain types shared between the grid core, the persistence layer and
//! the exchange ports.
//!
//! Sides, statuses and execution types are sum types; the lowercase wire
//! representation of the exchange is converted at the adapter boundary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::errors::Error;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(Error::Validation(format!("unknown order side '{other}'"))),
        }
    }
}

/// Upstream order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
    Expired,
    Pending,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Closed => "closed",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Expired => "expired",
            OrderStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(OrderStatus::Open),
            "closed" => Ok(OrderStatus::Closed),
            "canceled" => Ok(OrderStatus::Canceled),
            "expired" => Ok(OrderStatus::Expired),
            "pending" => Ok(OrderStatus::Pending),
            other => Err(Error::Validation(format!("unknown order status '{other}'"))),
        }
    }
}

/// Execution type of a stream execution report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecType {
    New,
    Filled,
    Canceled,
    Expired,
    Pending,
    Trade,
    /// Anything the core does not act on (amendments, status echoes, ...).
    Other,
}

impl ExecType {
    /// Convert the lowercase wire representation; unknown values map to
    /// [`ExecType::Other`].
    pub fn from_wire(value: &str) -> Self {
        match value {
            "new" => ExecType::New,
            "filled" => ExecType::Filled,
            "canceled" => ExecType::Canceled,
            "expired" => ExecType::Expired,
            "pending" => ExecType::Pending,
            "trade" => ExecType::Trade,
            _ => ExecType::Other,
        }
    }
}

/// A single order as tracked in the local orderbook.
///
/// Invariants: `volume_executed <= volume`, `price > 0`, `volume > 0`,
/// `symbol` is the exchange altname (no separator).
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub txid: String,
    pub userref: i64,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub volume: Decimal,
    pub volume_executed: Decimal,
    pub status: OrderStatus,
    /// Unix seconds at creation time.
    pub created_at: i64,
}

impl Order {
    /// Quote notional of the full order volume.
    pub fn notional(&self) -> Decimal {
        self.price * self.volume
    }
}

/// Latest observed trade price for a symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub last: Decimal,
}

/// Static-for-a-session asset pair metadata fetched from the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetPairInfo {
    /// Pair name without separator, e.g. "BTCUSD".
    pub altname: String,
    /// Exchange-internal base asset name, e.g. "XXBT".
    pub base: String,
    /// Exchange-internal quote asset name, e.g. "ZUSD".
    pub quote: String,
    /// Decimals of the quote cost, e.g. 5.
    pub cost_decimals: u32,
    /// Decimals of the pair price.
    pub pair_decimals: u32,
    /// Decimals of the order volume (lot size).
    pub lot_decimals: u32,
    /// Maker fee tiers as `(volume_threshold, fee_percent)`, highest fee
    /// first.
    pub fees_maker: Vec<(Decimal, Decimal)>,
}

impl AssetPairInfo {
    /// Effective maker fee as a fraction (first tier / 100), e.g. 0.0025.
    pub fn top_maker_fee(&self) -> Option<Decimal> {
        self.fees_maker
            .first()
            .map(|(_, percent)| *percent / Decimal::ONE_HUNDRED)
    }
}

/// A single asset balance as reported by the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetBalance {
    pub asset: String,
    pub balance: Decimal,
    /// Amount currently held in open trades.
    pub hold_trade: Decimal,
}

/// Available and overall balances of the traded pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PairBalances {
    pub base_balance: Decimal,
    pub quote_balance: Decimal,
    pub base_available: Decimal,
    pub quote_available: Decimal,
}

/// Truncate (never round) a decimal to the given number of fractional
/// digits and drop trailing zeros.
pub fn truncate_to_scale(amount: Decimal, scale: u32) -> Decimal {
    amount.trunc_with_scale(scale).normalize()
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_round_trip() {
        assert_eq!("buy".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("sell".parse::<Side>().unwrap(), Side::Sell);
        assert_eq!(Side::Buy.to_string(), "buy");
        assert!("hold".parse::<Side>().is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            OrderStatus::Open,
            OrderStatus::Closed,
            OrderStatus::Canceled,
            OrderStatus::Expired,
            OrderStatus::Pending,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_exec_type_unknown_falls_through() {
        assert_eq!(ExecType::from_wire("amended"), ExecType::Other);
        assert_eq!(ExecType::from_wire("filled"), ExecType::Filled);
        assert_eq!(ExecType::from_wire("new"), ExecType::New);
        assert_eq!(ExecType::from_wire("canceled"), ExecType::Canceled);
    }

    #[test]
    fn test_truncate_never_rounds() {
        assert_eq!(truncate_to_scale(dec!(49504.95049), 1), dec!(49504.9));
        assert_eq!(truncate_to_scale(dec!(0.0021020278), 8), dec!(0.00210202));
        assert_eq!(truncate_to_scale(dec!(59999.959), 1), dec!(59999.9));
        // Already-exact values are untouched
        assert_eq!(truncate_to_scale(dec!(100), 8), dec!(100));
    }

    #[test]
    fn test_top_maker_fee() {
        let info = AssetPairInfo {
            altname: "BTCUSD".into(),
            base: "XXBT".into(),
            quote: "ZUSD".into(),
            cost_decimals: 5,
            pair_decimals: 1,
            lot_decimals: 8,
            fees_maker: vec![(dec!(0), dec!(0.25)), (dec!(10000), dec!(0.2))],
        };
        assert_eq!(info.top_maker_fee(), Some(dec!(0.0025)));
    }
}
