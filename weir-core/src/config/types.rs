//! Configuration structures for the bot, the database and notifications.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::{Error, Result};

/// The strategy variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    GridHodl,
    GridSell,
    Swing,
    Cdca,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::GridHodl => "GridHODL",
            StrategyKind::GridSell => "GridSell",
            StrategyKind::Swing => "SWING",
            StrategyKind::Cdca => "cDCA",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GridHODL" => Ok(StrategyKind::GridHodl),
            "GridSell" => Ok(StrategyKind::GridSell),
            "SWING" => Ok(StrategyKind::Swing),
            "cDCA" => Ok(StrategyKind::Cdca),
            other => Err(Error::Validation(format!(
                "strategy must be one of GridHODL, GridSell, SWING, cDCA (got '{other}')"
            ))),
        }
    }
}

/// Main bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub api_public_key: String,
    pub api_secret_key: String,

    /// Named exchange adapter, e.g. "Kraken".
    pub exchange: String,

    /// Non-negative integer tagging orders as belonging to this instance.
    pub userref: i64,

    pub strategy: StrategyKind,

    /// Human label used in notifications.
    pub name: String,

    pub base_currency: String,
    pub quote_currency: String,

    /// Fractional price step between grid levels, `0 < interval < 1`.
    pub interval: Decimal,

    /// Quote amount per grid level.
    pub amount_per_grid: Decimal,

    /// Quote cap on the total open notional.
    pub max_investment: Decimal,

    /// Target number of concurrently open buy orders.
    pub n_open_buy_orders: u32,

    /// Optional maker fee override; derived from the exchange tier when
    /// unset.
    #[serde(default)]
    pub fee: Option<Decimal>,

    /// Log placements and cancels instead of executing them.
    #[serde(default)]
    pub dry_run: bool,
}

impl BotConfig {
    /// The slash-separated pair symbol, e.g. "BTC/USD".
    pub fn symbol(&self) -> String {
        format!(
            "{}/{}",
            self.base_currency.to_uppercase(),
            self.quote_currency.to_uppercase()
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.userref < 0 {
            return Err(Error::Validation("userref must be non-negative".into()));
        }
        if self.interval <= Decimal::ZERO || self.interval >= Decimal::ONE {
            return Err(Error::Validation(
                "interval must be strictly between 0 and 1".into(),
            ));
        }
        if self.amount_per_grid <= Decimal::ZERO {
            return Err(Error::Validation("amount_per_grid must be positive".into()));
        }
        if self.max_investment <= Decimal::ZERO {
            return Err(Error::Validation("max_investment must be positive".into()));
        }
        if self.n_open_buy_orders < 1 {
            return Err(Error::Validation(
                "n_open_buy_orders must be at least 1".into(),
            ));
        }
        if let Some(fee) = self.fee {
            if fee < Decimal::ZERO || fee >= Decimal::ONE {
                return Err(Error::Validation("fee must be within [0, 1)".into()));
            }
        }
        if self.base_currency.is_empty() || self.quote_currency.is_empty() {
            return Err(Error::Validation("currencies must not be empty".into()));
        }
        Ok(())
    }
}

/// Database location: a SQLite file or an in-memory database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbConfig {
    pub sqlite_file: Option<PathBuf>,
    #[serde(default)]
    pub in_memory: bool,
}

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// Notification fan-out configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}
