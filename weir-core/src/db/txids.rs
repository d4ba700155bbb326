//! Pending and unsold-buy transaction id sets.
//!
//! A pending txid exists from the moment a placement call succeeded
//! until the order has been reconciled into the local orderbook. An
//! unsold-buy txid is written immediately before attempting the
//! counter-sell for a filled buy and removed only once that sell was
//! accepted - so a crash in between never loses the sell.

use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;

use crate::core::Result;
use crate::db::{decimal_from_sql, Database};

#[derive(Clone)]
pub struct PendingTxids {
    db: Database,
    userref: i64,
}

impl PendingTxids {
    pub fn new(db: Database, userref: i64) -> Self {
        Self { db, userref }
    }

    pub fn add(&self, txid: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO pending_txids (txid, userref) VALUES (?1, ?2)",
                params![txid, self.userref],
            )?;
            Ok(())
        })
    }

    pub fn remove(&self, txid: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM pending_txids WHERE txid = ?1 AND userref = ?2",
                params![txid, self.userref],
            )?;
            Ok(())
        })
    }

    pub fn contains(&self, txid: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM pending_txids WHERE txid = ?1 AND userref = ?2",
                    params![txid, self.userref],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
    }

    pub fn count(&self) -> Result<i64> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM pending_txids WHERE userref = ?1",
                params![self.userref],
                |row| row.get(0),
            )
        })
    }

    pub fn all(&self) -> Result<Vec<String>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT txid FROM pending_txids WHERE userref = ?1 ORDER BY rowid")?;
            let rows = stmt.query_map(params![self.userref], |row| row.get(0))?;
            rows.collect()
        })
    }
}

/// A filled buy whose counter-sell has not been accepted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsoldBuy {
    pub txid: String,
    /// The sell price computed when the buy filled.
    pub price: Decimal,
}

#[derive(Clone)]
pub struct UnsoldBuyTxids {
    db: Database,
    userref: i64,
}

impl UnsoldBuyTxids {
    pub fn new(db: Database, userref: i64) -> Self {
        Self { db, userref }
    }

    pub fn add(&self, txid: &str, price: Decimal) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO unsold_buy_txids (txid, userref, price) VALUES (?1, ?2, ?3)",
                params![txid, self.userref, price.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn remove(&self, txid: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM unsold_buy_txids WHERE txid = ?1 AND userref = ?2",
                params![txid, self.userref],
            )?;
            Ok(())
        })
    }

    pub fn contains(&self, txid: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM unsold_buy_txids WHERE txid = ?1 AND userref = ?2",
                    params![txid, self.userref],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
    }

    pub fn count(&self) -> Result<i64> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM unsold_buy_txids WHERE userref = ?1",
                params![self.userref],
                |row| row.get(0),
            )
        })
    }

    pub fn all(&self) -> Result<Vec<UnsoldBuy>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT txid, price FROM unsold_buy_txids WHERE userref = ?1 ORDER BY rowid",
            )?;
            let rows = stmt.query_map(params![self.userref], |row| {
                Ok(UnsoldBuy {
                    txid: row.get(0)?,
                    price: decimal_from_sql(row.get::<_, String>(1)?)?,
                })
            })?;
            rows.collect()
        })
    }
}
