//! The local orderbook table.
//!
//! Tracks every order this instance has open (or believes to have open)
//! on the exchange. Rows keep their insertion order (rowid) so listings
//! reflect placement order.

use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::core::{Order, Result, Side};
use crate::db::{decimal_from_sql, parsed_from_sql, Database};

#[derive(Clone)]
pub struct Orderbook {
    db: Database,
    userref: i64,
}

fn row_to_order(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        txid: row.get(0)?,
        userref: row.get(1)?,
        symbol: row.get(2)?,
        side: parsed_from_sql(row.get::<_, String>(3)?)?,
        price: decimal_from_sql(row.get::<_, String>(4)?)?,
        volume: decimal_from_sql(row.get::<_, String>(5)?)?,
        volume_executed: decimal_from_sql(row.get::<_, String>(6)?)?,
        status: parsed_from_sql(row.get::<_, String>(7)?)?,
        created_at: row.get(8)?,
    })
}

const COLUMNS: &str = "txid, userref, symbol, side, price, volume, vol_exec, status, created_at";

impl Orderbook {
    pub fn new(db: Database, userref: i64) -> Self {
        Self { db, userref }
    }

    /// Insert an order, or refresh it in place when the txid is already
    /// tracked (keeps the original rowid).
    pub fn add(&self, order: &Order) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO orderbook (txid, userref, symbol, side, price, volume, vol_exec, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(txid) DO UPDATE SET
                     price = excluded.price,
                     volume = excluded.volume,
                     vol_exec = excluded.vol_exec,
                     status = excluded.status",
                params![
                    order.txid,
                    self.userref,
                    order.symbol,
                    order.side.as_str(),
                    order.price.to_string(),
                    order.volume.to_string(),
                    order.volume_executed.to_string(),
                    order.status.as_str(),
                    order.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Update the mutable fields of a tracked order.
    pub fn update(&self, order: &Order) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE orderbook SET price = ?1, volume = ?2, vol_exec = ?3, status = ?4
                 WHERE txid = ?5 AND userref = ?6",
                params![
                    order.price.to_string(),
                    order.volume.to_string(),
                    order.volume_executed.to_string(),
                    order.status.as_str(),
                    order.txid,
                    self.userref,
                ],
            )?;
            Ok(())
        })
    }

    pub fn remove(&self, txid: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM orderbook WHERE txid = ?1 AND userref = ?2",
                params![txid, self.userref],
            )?;
            Ok(())
        })
    }

    pub fn remove_side(&self, side: Side) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM orderbook WHERE side = ?1 AND userref = ?2",
                params![side.as_str(), self.userref],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, txid: &str) -> Result<Option<Order>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM orderbook WHERE txid = ?1 AND userref = ?2"),
                params![txid, self.userref],
                row_to_order,
            )
            .optional()
        })
    }

    /// All tracked orders in placement order.
    pub fn all(&self) -> Result<Vec<Order>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM orderbook WHERE userref = ?1 ORDER BY rowid"
            ))?;
            let rows = stmt.query_map(params![self.userref], row_to_order)?;
            rows.collect()
        })
    }

    pub fn by_side(&self, side: Side) -> Result<Vec<Order>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM orderbook WHERE userref = ?1 AND side = ?2 ORDER BY rowid"
            ))?;
            let rows = stmt.query_map(params![self.userref, side.as_str()], row_to_order)?;
            rows.collect()
        })
    }

    pub fn count(&self, side: Option<Side>) -> Result<i64> {
        self.db.with_conn(|conn| match side {
            Some(side) => conn.query_row(
                "SELECT COUNT(*) FROM orderbook WHERE userref = ?1 AND side = ?2",
                params![self.userref, side.as_str()],
                |row| row.get(0),
            ),
            None => conn.query_row(
                "SELECT COUNT(*) FROM orderbook WHERE userref = ?1",
                params![self.userref],
                |row| row.get(0),
            ),
        })
    }

    /// Count of orders on `side`, not counting `excluded_txid`.
    pub fn count_excluding(&self, side: Side, excluded_txid: &str) -> Result<i64> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM orderbook
                 WHERE userref = ?1 AND side = ?2 AND txid != ?3",
                params![self.userref, side.as_str(), excluded_txid],
                |row| row.get(0),
            )
        })
    }

    /// Prices of all open buy orders.
    pub fn buy_prices(&self) -> Result<Vec<Decimal>> {
        Ok(self.by_side(Side::Buy)?.iter().map(|o| o.price).collect())
    }

    /// The `limit` lowest-priced buy orders, ascending.
    pub fn lowest_buys(&self, limit: i64) -> Result<Vec<Order>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM orderbook
                 WHERE userref = ?1 AND side = 'buy'
                 ORDER BY CAST(price AS REAL) ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![self.userref, limit], row_to_order)?;
            rows.collect()
        })
    }

    /// The highest-priced open buy order, if any.
    pub fn highest_buy(&self) -> Result<Option<Order>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {COLUMNS} FROM orderbook
                     WHERE userref = ?1 AND side = 'buy'
                     ORDER BY CAST(price AS REAL) DESC LIMIT 1"
                ),
                params![self.userref],
                row_to_order,
            )
            .optional()
        })
    }
}
