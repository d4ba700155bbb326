//! SQLite-backed persistence.
//!
//! Four logical tables keyed by `userref`: the local orderbook, the
//! per-instance configuration, pending transaction ids and unsold-buy
//! transaction ids. Prices and volumes are stored as TEXT and parsed
//! back into `Decimal`; timestamps are unix seconds.
//!
//! The strategy exclusively owns writes to all four tables; the engine
//! only reads.

mod configuration;
mod orderbook;
mod txids;

pub use configuration::{ConfigurationRow, ConfigurationTable};
pub use orderbook::Orderbook;
pub use txids::{PendingTxids, UnsoldBuy, UnsoldBuyTxids};

use parking_lot::Mutex;
use rusqlite::Connection;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::config::DbConfig;
use crate::core::{unix_now, Result};
use rust_decimal::Decimal;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS orderbook (
    txid        TEXT PRIMARY KEY,
    userref     INTEGER NOT NULL,
    symbol      TEXT NOT NULL,
    side        TEXT NOT NULL,
    price       TEXT NOT NULL,
    volume      TEXT NOT NULL,
    vol_exec    TEXT NOT NULL,
    status      TEXT NOT NULL,
    created_at  INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS configuration (
    userref                             INTEGER PRIMARY KEY,
    amount_per_grid                     TEXT NOT NULL,
    interval                            TEXT NOT NULL,
    price_of_highest_buy                TEXT NOT NULL,
    vol_of_unfilled_remaining           TEXT NOT NULL,
    vol_of_unfilled_remaining_max_price TEXT NOT NULL,
    last_price_time                     INTEGER NOT NULL,
    last_notification_time              INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS pending_txids (
    txid    TEXT PRIMARY KEY,
    userref INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS unsold_buy_txids (
    txid    TEXT PRIMARY KEY,
    userref INTEGER NOT NULL,
    price   TEXT NOT NULL
);
";

/// Handle to the SQLite database shared by all tables.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open the configured database (file or in-memory).
    pub fn open(config: &DbConfig) -> Result<Self> {
        info!("Connecting to the database...");
        let conn = match (&config.sqlite_file, config.in_memory) {
            (Some(path), false) => Connection::open(path)?,
            _ => Connection::open_in_memory()?,
        };
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create tables if they do not exist and seed the configuration row
    /// for this `userref`.
    pub fn init(&self, userref: i64) -> Result<()> {
        info!("- Initializing tables...");
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)?;
            conn.execute(
                "INSERT OR IGNORE INTO configuration (
                     userref, amount_per_grid, interval, price_of_highest_buy,
                     vol_of_unfilled_remaining, vol_of_unfilled_remaining_max_price,
                     last_price_time, last_notification_time
                 ) VALUES (?1, '0', '0', '0', '0', '0', ?2, 0)",
                rusqlite::params![userref, unix_now()],
            )?;
            Ok(())
        })?;
        info!("- Database initialized.");
        Ok(())
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }
}

/// Parse a TEXT column back into a `Decimal`.
pub(crate) fn decimal_from_sql(value: String) -> rusqlite::Result<Decimal> {
    Decimal::from_str(&value).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}

/// Parse an enum-ish TEXT column through `FromStr`.
pub(crate) fn parsed_from_sql<T>(value: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse::<T>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}
